use crate::constants::MAX_KEY_LEN;
use crate::error::KeyError;

/// Paths are opaque namespace keys carried as a single token on a command
/// line, so they must not contain whitespace or control bytes.
pub fn validate_path(path: &str) -> Result<(), KeyError> {
    if path.is_empty() || path.len() > MAX_KEY_LEN {
        return Err(KeyError::Length);
    }
    if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(KeyError::Forbidden);
    }
    Ok(())
}
