//! Permission checks applied by the transaction and the queries.

use std::fmt;

use crate::oid::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Update,
    Delete,
    Create,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Create => "create",
        };
        f.write_str(name)
    }
}

/// Decides whether the current context may perform an action on an object.
///
/// `context` identifies the caller, e.g. a user or role name.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, oid: &ObjectId, context: &str, action: Action) -> bool;
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _oid: &ObjectId, _context: &str, _action: Action) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleTarget {
    Type(String),
    Object(ObjectId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DenyRule {
    target: RuleTarget,
    action: Action,
    context: Option<String>,
}

/// Denies actions by type or object, optionally only for one context.
#[derive(Debug, Clone, Default)]
pub struct RuleAuthorizer {
    rules: Vec<DenyRule>,
}

impl RuleAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn deny_type(mut self, type_name: &str, action: Action) -> Self {
        self.rules.push(DenyRule {
            target: RuleTarget::Type(type_name.to_string()),
            action,
            context: None,
        });
        self
    }

    #[must_use]
    pub fn deny_object(mut self, oid: &ObjectId, action: Action) -> Self {
        self.rules.push(DenyRule {
            target: RuleTarget::Object(oid.clone()),
            action,
            context: None,
        });
        self
    }

    /// Deny `action` on `oid` for `context` only.
    #[must_use]
    pub fn deny_object_for(mut self, oid: &ObjectId, context: &str, action: Action) -> Self {
        self.rules.push(DenyRule {
            target: RuleTarget::Object(oid.clone()),
            action,
            context: Some(context.to_string()),
        });
        self
    }
}

impl Authorizer for RuleAuthorizer {
    fn authorize(&self, oid: &ObjectId, context: &str, action: Action) -> bool {
        !self.rules.iter().any(|rule| {
            let target_matches = match &rule.target {
                RuleTarget::Type(t) => t == oid.type_name(),
                RuleTarget::Object(o) => o == oid,
            };
            let context_matches = rule.context.as_deref().map_or(true, |c| c == context);
            rule.action == action && target_matches && context_matches
        })
    }
}
