//! Identifier validation for monikers, plugin ids, data-source ids and
//! settings family names. Every identifier that ends up in a storage path
//! goes through here first, so a document name can never escape the
//! storage tree.

use crate::errors::CoreError;

/// Maximum length of any identifier that becomes part of a file name.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Validate an identifier used in storage paths and registries.
///
/// Allowed: ASCII lowercase letters, digits, `-` and `_`. Must be non-empty,
/// must not start with `-`, and is capped at [`MAX_IDENTIFIER_LEN`].
pub fn validate_identifier(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::InvalidInput("identifier is empty".into()));
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::InvalidInput(format!(
            "identifier '{}…' exceeds {} characters",
            &id[..16],
            MAX_IDENTIFIER_LEN
        )));
    }
    if id.starts_with('-') {
        return Err(CoreError::InvalidInput(format!(
            "identifier '{id}' starts with '-'"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(CoreError::InvalidInput(format!(
            "identifier '{id}' contains characters outside [a-z0-9_-]"
        )));
    }
    Ok(())
}

/// Validate a bare JSON file name read from the schedule or schema folders.
///
/// Rejects anything with a path separator or leading dot so directory
/// traversal through a crafted file listing is impossible.
pub fn validate_json_filename(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.starts_with('.') {
        return Err(CoreError::InvalidInput(format!("bad file name '{name}'")));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(CoreError::InvalidInput(format!(
            "file name '{name}' contains path components"
        )));
    }
    if !name.ends_with(".json") {
        return Err(CoreError::InvalidInput(format!(
            "file name '{name}' is not a .json document"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_ids() {
        for id in ["system", "slide_show", "debug-plugin", "a1"] {
            assert!(validate_identifier(id).is_ok(), "{id}");
        }
    }

    #[test]
    fn rejects_path_like_ids() {
        for id in ["", "../etc", "UPPER", "a b", "-x", "with/slash"] {
            assert!(validate_identifier(id).is_err(), "{id}");
        }
    }

    #[test]
    fn rejects_traversal_filenames() {
        assert!(validate_json_filename("weekday.json").is_ok());
        assert!(validate_json_filename("../weekday.json").is_err());
        assert!(validate_json_filename(".hidden.json").is_err());
        assert!(validate_json_filename("weekday.txt").is_err());
    }
}
