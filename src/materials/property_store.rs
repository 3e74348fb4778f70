// src/materials/property_store.rs
//! Property store: typed values for every catalog field.
//!
//! The store is pure state. It validates and applies writes but never talks to
//! a backend; routing a write to a rebuild or a uniform push is the composer's
//! job. Values live in a flat vector in catalog order, resolved once through a
//! name index.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::materials::catalog::{
    global_name, Catalog, FieldDescriptor, GroupDescriptor, GroupGate, Hint, UpdateKind,
};
use crate::value::{PropertyValue, ValueKind};

/// One row of `PropertyStore::list`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub group: &'static str,
    pub label: &'static str,
    pub kind: ValueKind,
    pub value: PropertyValue,
    pub default: PropertyValue,
    pub update: UpdateKind,
    pub hint: Hint,
    pub can_revert: bool,
}

/// Summary of a group for inspector headers.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupInfo {
    pub name: &'static str,
    pub title: &'static str,
    pub enabled: bool,
    pub help: String,
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub previous: PropertyValue,
    pub changed: bool,
}

struct Slot {
    name: String,
    group: &'static GroupDescriptor,
    field: &'static FieldDescriptor,
}

pub struct PropertyStore {
    catalog: &'static Catalog,
    slots: Vec<Slot>,
    values: Vec<PropertyValue>,
    index: HashMap<String, usize>,
}

impl PropertyStore {
    /// Builds a store holding every field's default.
    pub fn new(catalog: &'static Catalog) -> Result<Self> {
        catalog.validate()?;

        let mut slots = Vec::new();
        let mut values = Vec::new();
        let mut index = HashMap::new();
        for (name, group, field) in catalog.fields() {
            index.insert(name.clone(), slots.len());
            values.push(field.default.clone());
            slots.push(Slot { name, group, field });
        }

        Ok(Self {
            catalog,
            slots,
            values,
            index,
        })
    }

    #[inline]
    pub fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&PropertyValue> {
        let i = self.slot(name)?;
        Ok(&self.values[i])
    }

    pub fn descriptor(&self, name: &str) -> Result<(&'static GroupDescriptor, &'static FieldDescriptor)> {
        let i = self.slot(name)?;
        Ok((self.slots[i].group, self.slots[i].field))
    }

    /// Checks that `value` fits the field without applying it.
    pub fn validate(&self, name: &str, value: &PropertyValue) -> Result<()> {
        let i = self.slot(name)?;
        let field = self.slots[i].field;
        let expected = field.default.kind();
        if value.kind() != expected {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected,
                got: value.kind(),
            });
        }
        if let (Hint::Variants(variants), PropertyValue::Int(v)) = (field.hint, value) {
            if *v < 0 || *v as usize >= variants.len() {
                return Err(Error::InvalidVariant {
                    name: name.to_string(),
                    value: *v,
                    count: variants.len(),
                });
            }
        }
        Ok(())
    }

    /// Validates and stores a value. Identical writes are applied too.
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<Applied> {
        self.validate(name, &value)?;
        let i = self.slot(name)?;
        let changed = self.values[i] != value;
        let previous = std::mem::replace(&mut self.values[i], value);
        Ok(Applied { previous, changed })
    }

    /// Resets a field to its default and returns the previous value.
    pub fn revert(&mut self, name: &str) -> Result<PropertyValue> {
        let i = self.slot(name)?;
        let default = self.slots[i].field.default.clone();
        Ok(std::mem::replace(&mut self.values[i], default))
    }

    /// True iff the current value differs from the default.
    pub fn can_revert(&self, name: &str) -> Result<bool> {
        let i = self.slot(name)?;
        Ok(self.values[i] != self.slots[i].field.default)
    }

    /// Fields in declaration order, optionally limited to one group.
    pub fn list(&self, group: Option<&str>) -> Result<Vec<PropertyInfo>> {
        if let Some(g) = group {
            if self.catalog.group(g).is_none() {
                return Err(Error::UnknownGroup(g.to_string()));
            }
        }
        Ok(self
            .slots
            .iter()
            .zip(&self.values)
            .filter(|(slot, _)| group.map_or(true, |g| slot.group.name == g))
            .map(|(slot, value)| PropertyInfo {
                name: slot.name.clone(),
                group: slot.group.name,
                label: slot.field.label,
                kind: slot.field.default.kind(),
                value: value.clone(),
                default: slot.field.default.clone(),
                update: slot.field.update,
                hint: slot.field.hint,
                can_revert: *value != slot.field.default,
            })
            .collect())
    }

    /// Resolves the group's gate against current values.
    pub fn group_enabled(&self, group: &str) -> Result<bool> {
        let desc = self
            .catalog
            .group(group)
            .ok_or_else(|| Error::UnknownGroup(group.to_string()))?;
        Ok(match desc.gate {
            GroupGate::Always => true,
            GroupGate::Flag(field) => self.bool_value(&global_name(group, field)),
            GroupGate::EnumNot { field, off } => {
                self.int_value(&global_name(group, field)) != Some(off)
            }
        })
    }

    pub fn groups(&self) -> Vec<GroupInfo> {
        self.catalog
            .groups
            .iter()
            .map(|g| GroupInfo {
                name: g.name,
                title: g.title,
                enabled: self.group_enabled(g.name).unwrap_or(false),
                help: format_inline_help(g.help),
            })
            .collect()
    }

    /// Bool value of a field, `false` if missing or not a bool.
    pub fn bool_value(&self, name: &str) -> bool {
        self.get(name).ok().and_then(PropertyValue::as_bool).unwrap_or(false)
    }

    pub fn int_value(&self, name: &str) -> Option<i32> {
        self.get(name).ok().and_then(PropertyValue::as_int)
    }

    pub fn float_value(&self, name: &str) -> Option<f32> {
        self.get(name).ok().and_then(PropertyValue::as_float)
    }

    /// `(name, value)` pairs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.slots.iter().map(|s| s.name.as_str()).zip(&self.values)
    }

    /// `(uniform name, value)` for every field that declares a uniform.
    pub fn uniform_values(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.slots
            .iter()
            .zip(&self.values)
            .filter(|(slot, _)| slot.field.uniform)
            .map(|(slot, value)| (slot.name.as_str(), value))
    }
}

/// Reflows help text for an inline text box: paragraphs separated by blank
/// lines are kept, line breaks inside a paragraph become single spaces.
pub fn format_inline_help(text: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}
