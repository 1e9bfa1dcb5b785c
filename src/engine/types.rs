use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::error::StoreError;

/// One namespace of the parameter document: key → JSON value.
pub type Group = BTreeMap<String, Value>;

/// The whole persisted state of one engine instance: group name → group.
///
/// Backed by ordered maps so serialization is stable across writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterDocument {
    groups: BTreeMap<String, Group>,
}

impl ParameterDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    pub fn group(&self, group: &str) -> Option<&Group> {
        self.groups.get(group)
    }

    pub fn take_group(&mut self, group: &str) -> Option<Group> {
        self.groups.remove(group)
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&Value> {
        self.groups.get(group).and_then(|g| g.get(key))
    }

    /// Like [`get`](Self::get), but absence is an error.
    pub fn require(&self, group: &str, key: &str) -> Result<&Value, StoreError> {
        self.get(group, key)
            .ok_or_else(|| StoreError::MissingGroupOrKey {
                group: group.to_string(),
                key: Some(key.to_string()),
            })
    }

    pub fn require_group(&self, group: &str) -> Result<&Group, StoreError> {
        self.group(group).ok_or_else(|| StoreError::MissingGroupOrKey {
            group: group.to_string(),
            key: None,
        })
    }

    /// Set `group.key`, creating the group if needed.
    pub fn set(&mut self, group: &str, key: &str, value: Value) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Builder form of [`set`](Self::set), handy for compiled-in defaults.
    pub fn with(mut self, group: &str, key: &str, value: impl Into<Value>) -> Self {
        self.set(group, key, value.into());
        self
    }

    /// Add every group/key of `defaults` that is missing here.
    ///
    /// Existing values are never overwritten. Returns the number of groups
    /// and keys that were added.
    pub fn merge_defaults(&mut self, defaults: &ParameterDocument) -> usize {
        let mut added = 0;
        for (name, default_group) in &defaults.groups {
            let group = self.groups.entry(name.clone()).or_insert_with(|| {
                added += 1;
                Group::new()
            });
            for (key, value) in default_group {
                if !group.contains_key(key) {
                    group.insert(key.clone(), value.clone());
                    added += 1;
                }
            }
        }
        added
    }

    /// Apply a single mutation in place.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::Set { group, key, value } => {
                self.set(group, key, value.clone());
                Ok(())
            }
            Mutation::Adjust { group, key, op } => {
                let next = adjust_counter(self.get(group, key), *op).map_err(|e| match e {
                    CounterError::NotANumber(found) => StoreError::NotANumber {
                        group: group.clone(),
                        key: key.clone(),
                        found,
                        op: op.as_str(),
                    },
                    CounterError::Overflow => StoreError::CounterOverflow {
                        group: group.clone(),
                        key: key.clone(),
                    },
                })?;
                self.set(group, key, next);
                Ok(())
            }
        }
    }
}

impl From<BTreeMap<String, Group>> for ParameterDocument {
    fn from(groups: BTreeMap<String, Group>) -> Self {
        Self { groups }
    }
}

/// Direction of a counter adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterOp {
    Increment,
    Decrement,
}

impl CounterOp {
    /// Map the legacy `positive` flag onto an operation.
    pub fn from_positive(positive: bool) -> Self {
        if positive {
            CounterOp::Increment
        } else {
            CounterOp::Decrement
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CounterOp::Increment => "increment",
            CounterOp::Decrement => "decrement",
        }
    }

    fn delta(self) -> i64 {
        match self {
            CounterOp::Increment => 1,
            CounterOp::Decrement => -1,
        }
    }
}

impl std::fmt::Display for CounterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change to the document. Every mutating store call carries exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set {
        group: String,
        key: String,
        value: Value,
    },
    Adjust {
        group: String,
        key: String,
        op: CounterOp,
    },
}

impl Mutation {
    pub fn set(group: &str, key: &str, value: impl Into<Value>) -> Self {
        Mutation::Set {
            group: group.to_string(),
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn adjust(group: &str, key: &str, op: CounterOp) -> Self {
        Mutation::Adjust {
            group: group.to_string(),
            key: key.to_string(),
            op,
        }
    }

    pub fn group(&self) -> &str {
        match self {
            Mutation::Set { group, .. } | Mutation::Adjust { group, .. } => group,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. } | Mutation::Adjust { key, .. } => key,
        }
    }
}

/// Short type name of a JSON value, used in error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

enum CounterError {
    NotANumber(&'static str),
    Overflow,
}

fn adjust_counter(current: Option<&Value>, op: CounterOp) -> Result<Value, CounterError> {
    let delta = op.delta();
    match current {
        None => Ok(Value::from(delta)),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.checked_add(delta)
                    .map(Value::from)
                    .ok_or(CounterError::Overflow)
            } else if let Some(u) = n.as_u64() {
                // values above i64::MAX only come back as u64
                match op {
                    CounterOp::Increment => u.checked_add(1),
                    CounterOp::Decrement => u.checked_sub(1),
                }
                .map(Value::from)
                .ok_or(CounterError::Overflow)
            } else {
                let f = n.as_f64().ok_or(CounterError::NotANumber("number"))?;
                serde_json::Number::from_f64(f + delta as f64)
                    .map(Value::Number)
                    .ok_or(CounterError::Overflow)
            }
        }
        Some(other) => Err(CounterError::NotANumber(value_kind(other))),
    }
}
