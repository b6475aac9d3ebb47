//! Structured Type Registry
//!
//! This module provides the table of registered structured (record) types that
//! signals may declare as their `Type`. Definitions are kept in registration order
//! with a name index beside them. The builder receives a `&TypeRegistry`
//! explicitly.
//!
//! A member is either primitive (its type name parses as a [`TypeDescriptor`]) or a
//! reference to another registered struct. Member order is declaration order and
//! is the order in which signals are flattened.

use crate::error::{BuildError, ErrorKind, Result};
use crate::store::{ConfigurationStore, NodeId};
use crate::types::TypeDescriptor;
use std::collections::HashMap;

/// A member of a registered struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDef {
    pub name: String,
    pub type_name: String,
    pub number_of_dimensions: u8,
    pub number_of_elements: u32,
}

impl MemberDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            number_of_dimensions: 0,
            number_of_elements: 1,
        }
    }

    /// Make this member a vector of `count` elements
    pub fn with_elements(mut self, count: u32) -> Self {
        self.number_of_elements = count;
        if self.number_of_dimensions == 0 && count > 1 {
            self.number_of_dimensions = 1;
        }
        self
    }

    pub fn with_dimensions(mut self, dimensions: u8) -> Self {
        self.number_of_dimensions = dimensions;
        self
    }

    /// Check if this member is an array
    pub fn is_array(&self) -> bool {
        self.number_of_elements > 1 || self.number_of_dimensions > 0
    }
}

/// A registered structured type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<MemberDef>,
}

impl StructDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: MemberDef) -> Self {
        self.members.push(member);
        self
    }
}

/// Result of looking a type name up
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeRef<'a> {
    Primitive(TypeDescriptor),
    Struct(&'a StructDef),
}

/// Registry of structured types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    structs: Vec<StructDef>,
    name_index: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered structs
    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Register a struct. Registering a name twice replaces the earlier definition.
    pub fn insert(&mut self, def: StructDef) {
        match self.name_index.get(&def.name) {
            Some(&index) => {
                tracing::warn!("Type {} registered twice, replacing definition", def.name);
                self.structs[index] = def;
            }
            None => {
                self.name_index.insert(def.name.clone(), self.structs.len());
                self.structs.push(def);
            }
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&StructDef> {
        self.name_index.get(name).and_then(|&index| self.structs.get(index))
    }

    /// Resolve a type name to a primitive or a registered struct
    pub fn lookup(&self, name: &str) -> Option<TypeRef<'_>> {
        if let Some(def) = self.find_by_name(name) {
            return Some(TypeRef::Struct(def));
        }
        TypeDescriptor::from_name(name).map(TypeRef::Primitive)
    }

    /// Load struct definitions from a store node laid out as
    /// `<Struct>.<member> = { Type, NumberOfElements?, NumberOfDimensions? }`.
    pub fn from_store(store: &ConfigurationStore, node: NodeId) -> Result<Self> {
        let mut registry = Self::new();
        for type_node in store.children(node) {
            let type_name = store.name(type_node).unwrap_or("").to_string();
            let mut def = StructDef::new(type_name.clone());
            for member_node in store.children(type_node) {
                let member_name = store.name(member_node).unwrap_or("");
                let qualified = format!("{}.{}", type_name, member_name);
                let member_type = store
                    .read(member_node, "Type")
                    .and_then(|v| v.as_text())
                    .ok_or_else(|| {
                        BuildError::new(
                            ErrorKind::MissingRequiredAttribute,
                            &qualified,
                            "struct member has no Type",
                        )
                    })?;
                let mut member = MemberDef::new(member_name, member_type);
                if let Some(value) = store.read(member_node, "NumberOfElements") {
                    let count = value.as_u32().ok_or_else(|| {
                        BuildError::new(
                            ErrorKind::InvalidAttribute,
                            &qualified,
                            format!("NumberOfElements {} is not a count", value),
                        )
                    })?;
                    member = member.with_elements(count);
                }
                if let Some(value) = store.read(member_node, "NumberOfDimensions") {
                    let dimensions = value
                        .as_u32()
                        .and_then(|d| u8::try_from(d).ok())
                        .ok_or_else(|| {
                            BuildError::new(
                                ErrorKind::InvalidAttribute,
                                &qualified,
                                format!("NumberOfDimensions {} is not valid", value),
                            )
                        })?;
                    member = member.with_dimensions(dimensions);
                }
                def.members.push(member);
            }
            registry.insert(def);
        }
        Ok(registry)
    }
}
