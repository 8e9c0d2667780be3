//! Compiled per-collection access policy.

use serde::{Deserialize, Serialize};

use crate::rules::{AuthConfigError, AuthorizationBuilder};

/// Request verb guarded by a rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    List,
    View,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::List, Verb::View, Verb::Create, Verb::Update, Verb::Delete];
}

/// The five rule strings attached to a collection.
///
/// An empty string is the store's "always permit" rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicy {
    pub list: String,
    pub view: String,
    pub create: String,
    pub update: String,
    pub delete: String,
}

impl AuthPolicy {
    /// Compile every verb up front so a missing role fails here, not at request time.
    pub fn compile(builder: &AuthorizationBuilder) -> Result<Self, AuthConfigError> {
        Ok(Self {
            delete: builder.delete_rule()?,
            list: builder.list_rule(),
            view: builder.view_rule(),
            create: builder.create_rule(),
            update: builder.update_rule(),
        })
    }

    /// Policy for deployments with authorization switched off.
    pub fn permit_all() -> Self {
        Self::default()
    }

    /// Same rule for every verb.
    pub fn uniform(rule: impl Into<String>) -> Self {
        let rule = rule.into();
        Self {
            list: rule.clone(),
            view: rule.clone(),
            create: rule.clone(),
            update: rule.clone(),
            delete: rule,
        }
    }

    pub fn rule(&self, verb: Verb) -> &str {
        match verb {
            Verb::List => &self.list,
            Verb::View => &self.view,
            Verb::Create => &self.create,
            Verb::Update => &self.update,
            Verb::Delete => &self.delete,
        }
    }

    pub fn permits_everyone(&self) -> bool {
        Verb::ALL.iter().all(|v| self.rule(*v).is_empty())
    }
}
