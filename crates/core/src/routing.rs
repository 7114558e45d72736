//! Key routing: ordered prefix rules mapping object keys to buckets
//!
//! Rules are evaluated in declaration order and the first prefix that
//! matches wins. This is not longest-prefix matching: a more specific
//! prefix must be declared before a more general prefix that also covers
//! it, otherwise the general one shadows it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key of the fallback entry when a mapping is given as prefix/bucket pairs
pub const DEFAULT_KEY: &str = "DEFAULT";

/// A single prefix rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    pub bucket: String,
}

/// Ordered prefix table plus the required default destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketMapping {
    rules: Vec<RouteRule>,
    default: String,
}

impl BucketMapping {
    /// A mapping that sends every key to `default`
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default: default.into(),
        }
    }

    /// Append a rule after all existing ones
    pub fn with_rule(mut self, prefix: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.rules.push(RouteRule {
            prefix: prefix.into(),
            bucket: bucket.into(),
        });
        self
    }

    /// Build from ordered `(prefix, bucket)` pairs, one of which must be `DEFAULT`
    pub fn from_pairs<I, P, B>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, B)>,
        P: Into<String>,
        B: Into<String>,
    {
        let mut rules = Vec::new();
        let mut default = None;

        for (prefix, bucket) in pairs {
            let prefix = prefix.into();
            let bucket = bucket.into();
            if prefix == DEFAULT_KEY {
                if default.replace(bucket).is_some() {
                    return Err(Error::Config("mapping declares DEFAULT twice".to_string()));
                }
            } else {
                rules.push(RouteRule { prefix, bucket });
            }
        }

        let default =
            default.ok_or_else(|| Error::Config("mapping has no DEFAULT entry".to_string()))?;
        let mapping = Self { rules, default };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Reject empty bucket names and empty prefixes
    pub fn validate(&self) -> Result<()> {
        if self.default.trim().is_empty() {
            return Err(Error::Config("default bucket is empty".to_string()));
        }
        for rule in &self.rules {
            if rule.prefix.is_empty() {
                return Err(Error::Config(format!(
                    "empty prefix routes to '{}'; use the default bucket instead",
                    rule.bucket
                )));
            }
            if rule.bucket.trim().is_empty() {
                return Err(Error::Config(format!(
                    "prefix '{}' has an empty bucket",
                    rule.prefix
                )));
            }
        }
        Ok(())
    }

    /// Destination for `key`: first matching prefix in order, else the default
    pub fn resolve(&self, key: &str) -> &str {
        self.matching_rule(key)
            .map_or(self.default.as_str(), |rule| rule.bucket.as_str())
    }

    /// The rule that decides `key`, or `None` when the default applies
    pub fn matching_rule(&self, key: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| key.starts_with(&rule.prefix))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn default_bucket(&self) -> &str {
        &self.default
    }

    /// Every bucket this mapping can route to
    pub fn destinations(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .map(|r| r.bucket.as_str())
            .chain(std::iter::once(self.default.as_str()))
            .collect()
    }

    /// Rules that can never match because an earlier prefix covers them
    pub fn shadowed_rules(&self) -> Vec<&RouteRule> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(i, rule)| {
                self.rules[..*i]
                    .iter()
                    .any(|earlier| rule.prefix.starts_with(&earlier.prefix))
            })
            .map(|(_, rule)| rule)
            .collect()
    }
}

/// Resolve the destination bucket for `key`
pub fn resolve_bucket<'a>(mapping: &'a BucketMapping, key: &str) -> &'a str {
    mapping.resolve(key)
}
