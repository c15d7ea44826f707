use std::fmt;

use serde::Serialize;

/// Which side of the endpoint a manager is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Server,
    Client,
}

/// Lifecycle of an [`IpcManager`](crate::IpcManager).
///
/// `Idle -> Starting(role) -> Active -> ShuttingDown -> Closed`. A failed
/// start returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Starting(Role),
    Active(Role),
    ShuttingDown,
    Closed,
}

impl ManagerState {
    pub fn role(self) -> Option<Role> {
        match self {
            Self::Starting(role) | Self::Active(role) => Some(role),
            _ => None,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Active(_))
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Starting(Role::Server) => f.write_str("starting server"),
            Self::Starting(Role::Client) => f.write_str("connecting"),
            Self::Active(Role::Server) => f.write_str("serving"),
            Self::Active(Role::Client) => f.write_str("connected"),
            Self::ShuttingDown => f.write_str("shutting down"),
            Self::Closed => f.write_str("closed"),
        }
    }
}
