use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role name used in access rules.
///
/// Roles are opaque strings; each one becomes a relation field (`<role>s`) on
/// the authorization collection of an aggregate type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the relation field listing principals holding this role.
    pub fn relation_field(&self) -> String {
        format!("{}s", self.0)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
