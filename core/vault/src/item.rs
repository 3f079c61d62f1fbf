//! Decrypted vault item representation.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Free-form item fields: `title`, `category`, `group` plus whatever
/// the category defines.
pub type ItemFields = Map<String, Value>;

/// Field names owned by the record store, never part of the encrypted
/// payload.
const STORE_FIELDS: [&str; 2] = ["id", "created_at"];

/// One decrypted vault item.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultItem {
    /// Store-assigned id, unique per user.
    pub id: i64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// The decrypted fields.
    pub fields: ItemFields,
}

impl VaultItem {
    /// Convenience accessor for the item title.
    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    /// Convenience accessor for the item category.
    pub fn category(&self) -> Option<&str> {
        self.fields.get("category").and_then(Value::as_str)
    }
}

/// Remove record-store-only fields before encryption.
///
/// Ids and timestamps live in plaintext columns; carrying them inside
/// the envelope would let a restored row disagree with its own id.
pub fn strip_store_fields(fields: &mut ItemFields) {
    for key in STORE_FIELDS {
        fields.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_store_fields() {
        let mut fields = ItemFields::new();
        fields.insert("title".to_string(), json!("Bank"));
        fields.insert("id".to_string(), json!(17));
        fields.insert("created_at".to_string(), json!(123456));

        strip_store_fields(&mut fields);

        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("title"));
    }
}
