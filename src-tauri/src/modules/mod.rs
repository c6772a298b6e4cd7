//! Feature module domain.
//!
//! Tracks which dynamic feature modules are installed and the state of
//! in-flight install sessions. Module names follow Android dynamic feature
//! naming (`pro_features`).

use std::sync::OnceLock;

use regex::Regex;

use crate::api::types::ApiError;

pub mod registry;
pub mod session;

/// Maximum accepted module name length
pub const MODULE_NAME_MAX_LEN: usize = 64;

fn module_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("module name pattern is valid"))
}

/// Validate a module name before it reaches the platform or the filesystem.
///
/// Valid module names:
/// - Must be 1-64 characters
/// - Must start with a lowercase letter
/// - Can only contain lowercase letters, numbers, and underscores
pub fn validate_module_name(module_name: &str) -> Result<(), ApiError> {
    if module_name.is_empty() {
        return Err(ApiError::InvalidInput {
            message: "Module name cannot be empty".to_string(),
        });
    }

    if module_name.len() > MODULE_NAME_MAX_LEN {
        return Err(ApiError::InvalidInput {
            message: format!("Module name cannot exceed {MODULE_NAME_MAX_LEN} characters"),
        });
    }

    if !module_name_pattern().is_match(module_name) {
        return Err(ApiError::InvalidInput {
            message: "Module name must start with a lowercase letter and contain only lowercase letters, numbers, and underscores".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_module_name_valid() {
        assert!(validate_module_name("pro_features").is_ok());
        assert!(validate_module_name("maps").is_ok());
        assert!(validate_module_name("a1").is_ok());
        assert!(validate_module_name(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_module_name_empty() {
        match validate_module_name("") {
            Err(ApiError::InvalidInput { message }) => assert!(message.contains("empty")),
            other => panic!("Expected InvalidInput error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_module_name_too_long() {
        match validate_module_name(&"a".repeat(65)) {
            Err(ApiError::InvalidInput { message }) => assert!(message.contains("64 characters")),
            other => panic!("Expected InvalidInput error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_module_name_invalid_chars() {
        assert!(validate_module_name("../etc").is_err());
        assert!(validate_module_name("pro/features").is_err());
        assert!(validate_module_name("ProFeatures").is_err()); // uppercase
        assert!(validate_module_name("pro-features").is_err()); // hyphen
        assert!(validate_module_name("_pro").is_err());
        assert!(validate_module_name("1pro").is_err());
        assert!(validate_module_name("pro features").is_err());
    }
}
