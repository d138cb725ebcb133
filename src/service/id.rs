//! Identifier allocation for stored files and deletion tokens.

use uuid::Uuid;

/// Length of public identifiers and deletion tokens.
pub const ID_LENGTH: usize = 8;

/// Draw a fresh random identifier of `ID_LENGTH` lowercase hex characters.
///
/// Uniqueness against the store is not checked here: callers treat a
/// duplicate on insert as a collision and draw again.
pub fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LENGTH);
    id
}

/// Whether `name` has the shape of an identifier drawn by `new_id`.
pub fn is_valid_id(name: &str) -> bool {
    name.len() == ID_LENGTH && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id(&new_id()));
        assert!(is_valid_id("0a1b2c3d"));
        assert!(!is_valid_id("files"));
        assert!(!is_valid_id("0A1B2C3D"));
        assert!(!is_valid_id("0a1b2c3d4"));
        assert!(!is_valid_id("orphan01"));
    }

    #[test]
    fn test_new_id_shape() {
        let id = new_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_new_id_draws_are_independent() {
        let ids: HashSet<String> = (0..100).map(|_| new_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
