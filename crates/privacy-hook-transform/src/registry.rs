//! Redirection registry shared between the two passes.
//!
//! The collector fills a [`RedirectionRegistry`]; freezing it yields a
//! [`RuleSet`], the only form the rewriter accepts. Pass 2 therefore cannot
//! begin until pass 1 has released the registry.

use parking_lot::Mutex;
use std::collections::BTreeSet;

use crate::rule::{CallSite, RedirectionRule, RuleIdentity, WILDCARD_OWNER};

#[derive(Debug, Default)]
struct RegistryInner {
    rules: Vec<RedirectionRule>,
    wrapper_classes: BTreeSet<String>,
}

/// Mutable, insertion-ordered rule store populated during collection.
#[derive(Debug)]
pub struct RedirectionRegistry {
    identity: RuleIdentity,
    wildcard_owner: String,
    inner: Mutex<RegistryInner>,
}

impl Default for RedirectionRegistry {
    fn default() -> Self {
        Self::new(RuleIdentity::default())
    }
}

impl RedirectionRegistry {
    pub fn new(identity: RuleIdentity) -> Self {
        Self {
            identity,
            wildcard_owner: WILDCARD_OWNER.to_string(),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn with_wildcard_owner(mut self, owner: impl Into<String>) -> Self {
        self.wildcard_owner = owner.into();
        self
    }

    pub fn identity(&self) -> RuleIdentity {
        self.identity
    }

    /// Append `rule` unless an equal rule (under the configured identity) is
    /// already present. Returns whether it was inserted.
    pub fn insert_if_absent(&self, rule: RedirectionRule) -> bool {
        let mut inner = self.inner.lock();
        if inner
            .rules
            .iter()
            .any(|existing| self.identity.same_rule(existing, &rule))
        {
            return false;
        }
        inner.rules.push(rule);
        true
    }

    /// Record a class that declares wrapper methods.
    pub fn mark_wrapper_class(&self, class_name: impl Into<String>) {
        self.inner.lock().wrapper_classes.insert(class_name.into());
    }

    pub fn all_rules(&self) -> Vec<RedirectionRule> {
        self.inner.lock().rules.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// End collection and hand the rules over for rewriting.
    pub fn freeze(self) -> RuleSet {
        let inner = self.inner.into_inner();
        RuleSet {
            rules: inner.rules,
            wrapper_classes: inner.wrapper_classes,
            wildcard_owner: self.wildcard_owner,
        }
    }
}

/// Immutable rule set consulted by the rewriter. Safe to share across threads.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<RedirectionRule>,
    wrapper_classes: BTreeSet<String>,
    wildcard_owner: String,
}

impl RuleSet {
    /// First rule, in insertion order, that matches `site`.
    pub fn find_match(&self, site: &CallSite) -> Option<&RedirectionRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(site, &self.wildcard_owner))
    }

    pub fn is_wrapper_class(&self, class_name: &str) -> bool {
        self.wrapper_classes.contains(class_name)
    }

    pub fn rules(&self) -> &[RedirectionRule] {
        &self.rules
    }

    pub fn wrapper_classes(&self) -> impl Iterator<Item = &str> {
        self.wrapper_classes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
