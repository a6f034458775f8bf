//! Declarative description of a binary provider chain.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

/// Configuration node describing one provider instance.
///
/// Forms a tree: `next` is the primary chain, `subs` are independent paths
/// for providers that fan out (for example a double-storage provider).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Unique provider id within the tree.
    pub id: String,
    /// Provider type name (e.g. "file-system", "cache-fs").
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form provider parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Next provider in the primary chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<ProviderSpec>>,
    /// Sub-providers, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subs: Vec<ProviderSpec>,
}

impl ProviderSpec {
    /// Create a spec without params or children.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            params: BTreeMap::new(),
            next: None,
            subs: Vec::new(),
        }
    }

    /// Set a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set the next provider.
    pub fn with_next(mut self, next: ProviderSpec) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    /// Append a sub-provider.
    pub fn with_sub(mut self, sub: ProviderSpec) -> Self {
        self.subs.push(sub);
        self
    }

    /// Get a parameter value.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Get a required parameter value.
    pub fn required_param(&self, key: &str) -> crate::Result<&str> {
        self.param(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "provider '{}' ({}) requires parameter '{key}'",
                    self.id, self.kind
                ))
            })
    }

    /// Parse a parameter, falling back to `default` when absent.
    pub fn parse_param<T>(&self, key: &str, default: T) -> crate::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.param(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| {
                crate::Error::Config(format!(
                    "provider '{}' parameter '{key}' has invalid value '{raw}': {e}",
                    self.id
                ))
            }),
        }
    }

    /// Parse a boolean parameter ("true"/"false"/"1"/"0"/"yes"/"no").
    pub fn bool_param(&self, key: &str, default: bool) -> crate::Result<bool> {
        match self.param(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(crate::Error::Config(format!(
                    "provider '{}' parameter '{key}' is not a boolean: '{v}'",
                    self.id
                ))),
            },
        }
    }

    /// Iterate over this node and all descendants, pre-order
    /// (self, subs, then next).
    pub fn walk(&self) -> Vec<&ProviderSpec> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(next) = &node.next {
                stack.push(next);
            }
            for sub in node.subs.iter().rev() {
                stack.push(sub);
            }
        }
        out
    }

    /// Find a node by id.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut ProviderSpec> {
        if self.id == id {
            return Some(self);
        }
        for sub in &mut self.subs {
            if let Some(found) = sub.find_mut(id) {
                return Some(found);
            }
        }
        match &mut self.next {
            Some(next) => next.find_mut(id),
            None => None,
        }
    }

    /// Validate tree invariants: non-empty, unique ids and non-empty types.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for node in self.walk() {
            if node.id.trim().is_empty() {
                return Err(crate::Error::Config(format!(
                    "provider of type '{}' has an empty id",
                    node.kind
                )));
            }
            if node.kind.trim().is_empty() {
                return Err(crate::Error::Config(format!(
                    "provider '{}' has an empty type",
                    node.id
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(crate::Error::Config(format!(
                    "duplicate provider id '{}'",
                    node.id
                )));
            }
        }
        Ok(())
    }
}
