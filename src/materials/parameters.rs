// src/materials/parameters.rs
//! Active and persisted parameter sets.
//!
//! - [`ActiveParameterSet`]: uniforms declared by the live shader source,
//!   recomputed after every recompile.
//! - [`PersistedParameterSet`]: last-known value for every uniform ever
//!   written, kept across recompiles and never pruned, so a feature that comes
//!   back gets its values back.

use std::collections::{BTreeMap, HashMap};

use crate::materials::preprocess::{scan_uniforms, UniformDecl};
use crate::value::PropertyValue;

#[derive(Debug, Clone, Default)]
pub struct ActiveParameterSet {
    decls: Vec<UniformDecl>,
    index: HashMap<String, usize>,
}

impl ActiveParameterSet {
    pub fn from_source(source: &str) -> Self {
        let decls = scan_uniforms(source);
        let index = decls
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        Self { decls, index }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&UniformDecl> {
        self.index.get(name).map(|&i| &self.decls[i])
    }

    /// Declarations in source order.
    pub fn iter(&self) -> impl Iterator<Item = &UniformDecl> {
        self.decls.iter()
    }

    /// Declarations an inspector should show (no private uniforms).
    pub fn public(&self) -> impl Iterator<Item = &UniformDecl> {
        self.decls.iter().filter(|d| !d.is_private())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decls.iter().map(|d| d.name.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedParameterSet {
    values: BTreeMap<String, PropertyValue>,
}

impl PersistedParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, value: PropertyValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Every recorded entry, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries whose uniform is declared in `active`, in declaration order.
    pub fn replay<'a>(
        &'a self,
        active: &'a ActiveParameterSet,
    ) -> impl Iterator<Item = (&'a str, &'a PropertyValue)> + 'a {
        active
            .iter()
            .filter_map(move |decl| self.values.get(&decl.name).map(|v| (decl.name.as_str(), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
uniform float _private;
#ifdef ON
uniform float gated;
#endif
uniform float open;
";

    #[test]
    fn test_active_set() {
        let active = ActiveParameterSet::from_source(SOURCE);
        assert_eq!(active.names().collect::<Vec<_>>(), vec!["_private", "open"]);
        assert_eq!(active.public().count(), 1);
        assert!(!active.contains("gated"));
    }

    #[test]
    fn test_replay_only_active_in_order() {
        let mut persisted = PersistedParameterSet::new();
        persisted.record("open", PropertyValue::Float(2.0));
        persisted.record("gated", PropertyValue::Float(3.0));
        persisted.record("_private", PropertyValue::Float(1.0));

        let active = ActiveParameterSet::from_source(SOURCE);
        let replayed: Vec<_> = persisted.replay(&active).collect();
        assert_eq!(
            replayed,
            vec![
                ("_private", &PropertyValue::Float(1.0)),
                ("open", &PropertyValue::Float(2.0)),
            ]
        );

        // stale entries stay around for when the feature comes back
        let active = ActiveParameterSet::from_source(&format!("#define ON\n{SOURCE}"));
        assert_eq!(persisted.replay(&active).count(), 3);
    }
}
