//! Aggregate-type keys and the collection names derived from them.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Normalized (lower-case, underscore-separated) form of an aggregate-type name.
///
/// Every per-type collection is named from this key, so `"OrderItem"`,
/// `"order-item"` and `"Order Item"` all share storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(String);

impl TypeKey {
    pub fn parse(aggregate_type: &str) -> StoreResult<Self> {
        let key = to_snake_case(aggregate_type);
        if key.is_empty() {
            return Err(StoreError::configuration(format!(
                "aggregate type '{aggregate_type}' has no usable characters"
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Event collection name.
    pub fn events_collection(&self) -> String {
        self.0.clone()
    }

    /// Snapshot collection name.
    pub fn snapshots_collection(&self) -> String {
        format!("{}_snap", self.0)
    }

    /// Authorization relation collection name.
    pub fn auth_collection(&self) -> String {
        format!("{}_auth", self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-case, underscore-separated form of an identifier.
///
/// Word boundaries are case changes (`orderItem`, `HTTPRequest`) and any
/// non-alphanumeric character. Runs of separators collapse to one underscore.
pub fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }

        out.extend(c.to_lowercase());
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_and_pascal_case() {
        assert_eq!(to_snake_case("OrderItem"), "order_item");
        assert_eq!(to_snake_case("orderItem"), "order_item");
        assert_eq!(to_snake_case("Person"), "person");
    }

    #[test]
    fn acronyms_split_before_next_word() {
        assert_eq!(to_snake_case("HTTPRequest"), "http_request");
        assert_eq!(to_snake_case("Version2Draft"), "version2_draft");
    }

    #[test]
    fn separators_collapse() {
        assert_eq!(to_snake_case("order-item"), "order_item");
        assert_eq!(to_snake_case("  Order  Item "), "order_item");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn spellings_share_a_key() {
        let a = TypeKey::parse("OrderItem").unwrap();
        let b = TypeKey::parse("order item").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.snapshots_collection(), "order_item_snap");
        assert_eq!(a.auth_collection(), "order_item_auth");
    }

    #[test]
    fn empty_type_is_rejected() {
        let err = TypeKey::parse(" -- ").unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }
}
