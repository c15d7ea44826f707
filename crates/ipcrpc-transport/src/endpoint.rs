//! Endpoint naming.
//!
//! Addresses carry a random suffix so a peer cannot guess or squat on an
//! endpoint before the server binds it.

use std::path::{Path, PathBuf};

use crate::error::{Result, TransportError};

/// Directory name (under the system temp dir) holding socket endpoints.
pub const ENDPOINT_DIR_NAME: &str = "pyelectron";

/// Prefix for named-pipe endpoints.
pub const PIPE_PREFIX: &str = r"\\.\pipe\pyelectron_";

const MAX_NAME_LEN: usize = 64;
const SUFFIX_LEN: usize = 8;

/// Check that an endpoint name is safe to embed in a path or pipe name.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidName(name.to_string()))
    }
}

/// Random lowercase-hex suffix from a v4 UUID.
pub fn random_suffix() -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(SUFFIX_LEN);
    hex
}

/// Default private directory for socket endpoints.
pub fn default_endpoint_dir() -> PathBuf {
    std::env::temp_dir().join(ENDPOINT_DIR_NAME)
}

/// Socket path `<dir>/<name>_<random8hex>.sock`.
pub fn socket_path(dir: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    Ok(dir.join(format!("{name}_{}.sock", random_suffix())))
}

/// Pipe name `\\.\pipe\pyelectron_<name>_<random8hex>`.
pub fn pipe_name(name: &str) -> Result<String> {
    validate_name(name)?;
    Ok(format!("{PIPE_PREFIX}{name}_{}", random_suffix()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_has_random_suffix() {
        let dir = Path::new("/tmp/pyelectron");
        let a = socket_path(dir, "main").unwrap();
        let b = socket_path(dir, "main").unwrap();
        assert_ne!(a, b);

        let file = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(file.starts_with("main_"));
        assert!(file.ends_with(".sock"));
        let suffix = &file["main_".len()..file.len() - ".sock".len()];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn pipe_name_format() {
        let name = pipe_name("renderer").unwrap();
        assert!(name.starts_with(r"\\.\pipe\pyelectron_renderer_"));
        assert_eq!(name.len(), PIPE_PREFIX.len() + "renderer_".len() + 8);
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(&"x".repeat(65)).is_err());
        assert!(validate_name("worker-1_main").is_ok());
    }
}
