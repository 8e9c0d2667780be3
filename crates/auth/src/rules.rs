//! Access-rule string builder.
//!
//! Produces the boolean expressions the document store evaluates per request.
//! The grammar belongs to the store's access-control evaluator; this module only
//! concatenates fixed building blocks and never parses what it emits.
//!
//! Rule shape for a role subset `S`:
//!
//! ```text
//! GlobalAdmin || ( LoggedIn && KeyMatch && ( HasRole(r1) || HasRole(r2) ... ))
//! ```
//!
//! and plain `GlobalAdmin` when `S` is empty.

use thiserror::Error;

use esdoc_core::StoreError;

use crate::Role;

/// Admin flag on the principal (users) collection.
pub const FIELD_ADMIN: &str = "admin";

/// Principal collection referenced by role relation fields.
pub const USERS_COLLECTION: &str = "users";

const LOGGED_IN: &str = "@request.auth.id != \"\"";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthConfigError {
    #[error("collection '{0}' has no roles; the delete rule needs at least one")]
    NoRoles(String),
}

impl From<AuthConfigError> for StoreError {
    fn from(err: AuthConfigError) -> Self {
        StoreError::configuration(err.to_string())
    }
}

/// Builds per-verb rules for one authorization collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationBuilder {
    collection_name: String,
    key_field: String,
    roles: Vec<Role>,

    global_admin: String,
    key_match: String,
}

impl AuthorizationBuilder {
    /// `collection_name` is the authorization relation collection (e.g. `order_auth`),
    /// `key_field` the field linking its rows to the guarded records.
    pub fn new(
        collection_name: impl Into<String>,
        key_field: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        let collection_name = collection_name.into();
        let key_field = key_field.into();
        let key_match = format!("{key_field} ?= @collection.{collection_name}.{key_field}");

        Self {
            global_admin: global_admin(FIELD_ADMIN),
            key_match,
            roles: roles.into_iter().collect(),
            collection_name,
            key_field,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn global_admin(&self) -> &str {
        &self.global_admin
    }

    pub fn logged_in(&self) -> &str {
        LOGGED_IN
    }

    pub fn key_match(&self) -> &str {
        &self.key_match
    }

    /// Relation field holding the principals granted `role`.
    pub fn relation_field(&self, role: &Role) -> String {
        role.relation_field()
    }

    /// Principal id appears in this collection's relation field for `role`.
    pub fn has_role(&self, role: &Role) -> String {
        format!(
            "@request.auth.id ?= @collection.{}.{}.id",
            self.collection_name,
            self.relation_field(role)
        )
    }

    pub fn rule_for_roles(&self, roles: &[Role]) -> String {
        if roles.is_empty() {
            return self.global_admin.clone();
        }

        let any_role = roles
            .iter()
            .map(|r| self.has_role(r))
            .collect::<Vec<_>>()
            .join(" || ");

        format!(
            "{} || ( {} && {} && ( {} ))",
            self.global_admin, LOGGED_IN, self.key_match, any_role
        )
    }

    pub fn list_rule(&self) -> String {
        self.rule_for_roles(&self.roles)
    }

    pub fn view_rule(&self) -> String {
        self.rule_for_roles(&self.roles)
    }

    /// Only global admins create.
    pub fn create_rule(&self) -> String {
        self.global_admin.clone()
    }

    /// The first two roles, or fewer when fewer are configured.
    pub fn update_rule(&self) -> String {
        let n = self.roles.len().min(2);
        self.rule_for_roles(&self.roles[..n])
    }

    /// The first role only.
    pub fn delete_rule(&self) -> Result<String, AuthConfigError> {
        match self.roles.first() {
            Some(first) => Ok(self.rule_for_roles(std::slice::from_ref(first))),
            None => Err(AuthConfigError::NoRoles(self.collection_name.clone())),
        }
    }
}

pub fn global_admin(field_admin: &str) -> String {
    format!("@request.auth.{field_admin} = true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn builder(roles: &[&str]) -> AuthorizationBuilder {
        AuthorizationBuilder::new(
            "order_auth",
            "agg_id",
            roles.iter().map(|r| Role::from(*r)),
        )
    }

    fn mentions(rule: &str, role: &str) -> bool {
        rule.contains(&format!("@collection.order_auth.{role}s.id"))
    }

    #[test]
    fn single_role_rule_has_exact_shape() {
        let b = builder(&["admin"]);
        assert_eq!(
            b.list_rule(),
            "@request.auth.admin = true || ( @request.auth.id != \"\" && \
             agg_id ?= @collection.order_auth.agg_id && \
             ( @request.auth.id ?= @collection.order_auth.admins.id ))"
        );
    }

    #[test]
    fn roles_are_distributed_across_verbs() {
        let b = builder(&["admin", "maintainer", "user"]);

        let delete = b.delete_rule().unwrap();
        assert!(mentions(&delete, "admin"));
        assert!(!mentions(&delete, "maintainer"));
        assert!(!mentions(&delete, "user"));

        let update = b.update_rule();
        assert!(mentions(&update, "admin"));
        assert!(mentions(&update, "maintainer"));
        assert!(!mentions(&update, "user"));

        for rule in [b.list_rule(), b.view_rule()] {
            assert!(mentions(&rule, "admin"));
            assert!(mentions(&rule, "maintainer"));
            assert!(mentions(&rule, "user"));
        }

        let create = b.create_rule();
        assert_eq!(create, "@request.auth.admin = true");
        for role in ["admin", "maintainer", "user"] {
            assert!(!mentions(&create, role));
        }
    }

    #[test]
    fn roles_are_or_joined_in_order() {
        let rule = builder(&["owner", "editor"]).list_rule();
        let owner = rule.find("owners.id").unwrap();
        let editor = rule.find("editors.id").unwrap();
        assert!(owner < editor);
        assert!(rule.contains(".owners.id || @request.auth.id ?="));
    }

    #[test]
    fn no_roles_degrades_to_global_admin() {
        let b = builder(&[]);
        assert_eq!(b.list_rule(), "@request.auth.admin = true");
        assert_eq!(b.update_rule(), "@request.auth.admin = true");
        assert_eq!(b.delete_rule(), Err(AuthConfigError::NoRoles("order_auth".into())));
    }

    #[test]
    fn single_role_update_uses_that_role() {
        let b = builder(&["owner"]);
        assert_eq!(b.update_rule(), b.delete_rule().unwrap());
    }

    #[test]
    fn no_roles_maps_to_configuration_error() {
        let err: StoreError = builder(&[]).delete_rule().unwrap_err().into();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: every verb rule starts with the global-admin escape hatch and
        /// mentions exactly the roles its verb is entitled to.
        #[test]
        fn verb_rules_reference_their_role_prefix(
            roles in prop::collection::btree_set("[a-z]{3,8}", 1..6)
        ) {
            let roles: Vec<String> = roles.into_iter().collect();
            let b = AuthorizationBuilder::new(
                "order_auth",
                "agg_id",
                roles.iter().cloned().map(Role::from),
            );

            let update = b.update_rule();
            let delete = b.delete_rule().unwrap();
            let list = b.list_rule();

            for (i, role) in roles.iter().enumerate() {
                prop_assert!(mentions(&list, role));
                prop_assert_eq!(mentions(&update, role), i < 2);
                prop_assert_eq!(mentions(&delete, role), i == 0);
            }
            for rule in [&update, &delete, &list] {
                prop_assert!(rule.starts_with("@request.auth.admin = true"));
            }
        }
    }
}
