use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Per-call information about the peer that sent a request.
///
/// Built by the manager from connection state and handed through the
/// protocol engine to the router and handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    /// Connection id of the caller, if the call arrived over a connection.
    pub peer_id: Option<String>,
    /// Whether the caller presented a valid token.
    pub authenticated: bool,
    /// Permissions granted to the caller.
    pub permissions: BTreeSet<String>,
    /// Free-form values attached by middleware or the embedding application.
    pub metadata: Map<String, Value>,
}

impl CallContext {
    /// Unauthenticated context for a peer.
    pub fn for_peer(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: Some(peer_id.into()),
            ..Self::default()
        }
    }

    /// Mark the context authenticated with the given permissions.
    pub fn authenticated<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authenticated = true;
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Required permissions this context lacks, in sorted order.
    pub fn missing_permissions<'a>(&self, required: &'a BTreeSet<String>) -> Vec<&'a str> {
        required
            .iter()
            .filter(|p| !self.permissions.contains(*p))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_permissions_sorted() {
        let ctx = CallContext::for_peer("p1").authenticated(["read"]);
        let required: BTreeSet<String> = ["write", "read", "admin"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ctx.missing_permissions(&required), vec!["admin", "write"]);
        assert!(ctx.has_permission("read"));
        assert!(ctx.authenticated);
    }
}
