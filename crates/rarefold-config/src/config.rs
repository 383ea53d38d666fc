//! Immutable configuration trees.
//!
//! A [`Config`] has no setters. Every change goes through a [`ConfigEdit`]
//! transaction which validates paths as they are staged and, on
//! [`ConfigEdit::commit`], rebuilds a new tree. The source config is never
//! touched, so a shared base template can be handed out freely.
use crate::error::{ConfigError, Result};
use crate::shape::FeatureShape;
use crate::value::{Value, ValueKind};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Config {
    root: BTreeMap<String, Value>,
}

impl Config {
    pub fn new(root: BTreeMap<String, Value>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &BTreeMap<String, Value> {
        &self.root
    }

    pub fn get(&self, path: &str) -> Result<&Value> {
        let mut segments = path.split('.');
        let first = segments
            .next()
            .ok_or_else(|| ConfigError::invalid(path, "empty path"))?;
        let mut current = self
            .root
            .get(first)
            .ok_or_else(|| ConfigError::invalid(path, "no such field"))?;
        for segment in segments {
            current = match current {
                Value::Tree(children) => children
                    .get(segment)
                    .ok_or_else(|| ConfigError::invalid(path, "no such field"))?,
                other => {
                    return Err(ConfigError::invalid(
                        path,
                        format!("`{segment}` is below a {} value", other.kind()),
                    ))
                }
            };
        }
        Ok(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    pub fn bool(&self, path: &str) -> Result<bool> {
        match self.get(path)? {
            Value::Bool(v) => Ok(*v),
            other => Err(wrong_kind(path, ValueKind::Bool, other)),
        }
    }

    pub fn int(&self, path: &str) -> Result<i64> {
        match self.get(path)? {
            Value::Int(v) => Ok(*v),
            other => Err(wrong_kind(path, ValueKind::Int, other)),
        }
    }

    pub fn usize(&self, path: &str) -> Result<usize> {
        let v = self.int(path)?;
        usize::try_from(v).map_err(|_| ConfigError::invalid(path, format!("{v} is negative")))
    }

    pub fn float(&self, path: &str) -> Result<f64> {
        match self.get(path)? {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(wrong_kind(path, ValueKind::Float, other)),
        }
    }

    pub fn str(&self, path: &str) -> Result<&str> {
        match self.get(path)? {
            Value::Str(v) => Ok(v),
            other => Err(wrong_kind(path, ValueKind::Str, other)),
        }
    }

    pub fn str_list(&self, path: &str) -> Result<Vec<String>> {
        match self.get(path)? {
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Str(s) => Ok(s.clone()),
                    other => Err(wrong_kind(path, ValueKind::Str, other)),
                })
                .collect(),
            other => Err(wrong_kind(path, ValueKind::List, other)),
        }
    }

    pub fn shape(&self, path: &str) -> Result<&FeatureShape> {
        match self.get(path)? {
            Value::Shape(s) => Ok(s),
            other => Err(wrong_kind(path, ValueKind::Shape, other)),
        }
    }

    pub fn tree(&self, path: &str) -> Result<&BTreeMap<String, Value>> {
        match self.get(path)? {
            Value::Tree(t) => Ok(t),
            other => Err(wrong_kind(path, ValueKind::Tree, other)),
        }
    }

    /// Deep copy of the tree rooted at `path`.
    pub fn subtree(&self, path: &str) -> Result<Config> {
        Ok(Config::new(self.tree(path)?.clone()))
    }

    /// Flattened index of every dotted path (interior and leaf) and its kind.
    pub fn paths(&self) -> BTreeMap<String, ValueKind> {
        let mut index = BTreeMap::new();
        flatten_into(&self.root, "", &mut index);
        index
    }

    /// Open an edit transaction against this config.
    pub fn edit(&self) -> ConfigEdit<'_> {
        ConfigEdit {
            base: self,
            index: self.paths(),
            staged: Vec::new(),
        }
    }

    /// Apply a sparse set of dotted-path overrides, returning a new config.
    ///
    /// Every path is validated before anything is rebuilt, so a bad entry
    /// yields an error and no partially overridden config.
    pub fn apply_overrides<'p, I>(&self, overrides: I) -> Result<Config>
    where
        I: IntoIterator<Item = (&'p str, Value)>,
    {
        let mut edit = self.edit();
        for (path, value) in overrides {
            edit.set(path, value)?;
        }
        Ok(edit.commit())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn wrong_kind(path: &str, expected: ValueKind, found: &Value) -> ConfigError {
    ConfigError::invalid(path, format!("expected {expected}, found {}", found.kind()))
}

fn flatten_into(node: &BTreeMap<String, Value>, prefix: &str, index: &mut BTreeMap<String, ValueKind>) {
    for (key, value) in node {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Value::Tree(children) = value {
            flatten_into(children, &path, index);
        }
        index.insert(path, value.kind());
    }
}

/// A staged set of writes against a [`Config`].
///
/// Nothing is visible until [`commit`](ConfigEdit::commit); dropping the
/// edit discards it.
#[derive(Debug)]
pub struct ConfigEdit<'a> {
    base: &'a Config,
    index: BTreeMap<String, ValueKind>,
    staged: Vec<(String, Value)>,
}

impl ConfigEdit<'_> {
    /// Rebind an existing path. The path must exist and the value must be of
    /// a compatible kind.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        let expected = *self
            .index
            .get(path)
            .ok_or_else(|| ConfigError::InvalidOverridePath(path.to_string()))?;
        let found = value.kind();
        let value = value
            .coerce_to(expected)
            .ok_or_else(|| ConfigError::OverrideTypeMismatch {
                path: path.to_string(),
                expected,
                found,
            })?;
        self.staged.push((path.to_string(), value));
        Ok(self)
    }

    /// Rebind a path, creating the leaf if its parent tree exists but the
    /// leaf does not.
    pub fn define(&mut self, path: &str, value: impl Into<Value>) -> Result<&mut Self> {
        if self.index.contains_key(path) {
            return self.set(path, value);
        }
        let value = value.into();
        if let Some((parent, _)) = path.rsplit_once('.') {
            match self.index.get(parent) {
                Some(ValueKind::Tree) => {}
                Some(_) | None => return Err(ConfigError::InvalidOverridePath(path.to_string())),
            }
        }
        if let Value::Tree(children) = &value {
            flatten_into(children, path, &mut self.index);
        }
        self.index.insert(path.to_string(), value.kind());
        self.staged.push((path.to_string(), value));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Rebuild the tree with every staged write applied in order.
    pub fn commit(self) -> Config {
        let mut root = self.base.root.clone();
        for (path, value) in self.staged {
            let segments: Vec<&str> = path.split('.').collect();
            insert_at(&mut root, &segments, value);
        }
        Config { root }
    }
}

// Paths are validated when staged, so every interior segment is a tree.
fn insert_at(node: &mut BTreeMap<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            node.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            if let Some(Value::Tree(child)) = node.get_mut(*head) {
                insert_at(child, rest, value);
            }
        }
    }
}
