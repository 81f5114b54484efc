//! UUID utilities

use crate::{Error, Result};
use uuid::Uuid;

/// Parse UUID from string, mapping failures to `Error::InvalidInput`
pub fn parse(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|e| Error::InvalidInput(format!("Invalid id {:?}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let id = Uuid::new_v4();
        assert_eq!(parse(&id.to_string()).unwrap(), id);
        assert_eq!(parse(&format!(" {} ", id)).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse("not-a-uuid"), Err(Error::InvalidInput(_))));
    }
}
