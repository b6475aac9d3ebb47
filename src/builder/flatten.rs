//! Signal flattening.
//!
//! [`flatten_signal`] is a pure function from one declaration to the list of
//! primitive leaf signals it stands for. It never touches the databases; the
//! flattening stage merges the returned lists into them.
//!
//! Two kinds of nesting are expanded:
//!
//! - **Namespaces**: an interior declaration without `Type`. Its children are
//!   signals named `<namespace>.<child>` and inherit `DataSource`, `Samples`,
//!   `Ranges`, `Frequency` and `Trigger` from it.
//! - **Structs**: a declaration whose `Type` names a registered struct. It becomes
//!   one leaf per primitive member, `<signal>.<member>.<member>`, with a full-type
//!   breadcrumb `<Struct>.<Nested>.<primitive>`.
//!
//! Member keys used by `MemberAliases`, `Defaults` and `SyncSignal` may be written
//! as the full qualified name (`ADCs.Signal3.c1`), relative to the signal
//! (`Signal3.c1`), or as the bare member path (`c1`).

use crate::error::{BuildError, ErrorKind, Result};
use crate::registry::{StructDef, TypeRef, TypeRegistry};
use crate::signal::{attr, Signal, SignalDeclaration};
use crate::store::join_path;
use crate::types::{TypeDescriptor, Value};
use std::collections::HashSet;

/// Attributes a namespace passes down to every signal below it
const INHERITED: [&str; 5] = [
    attr::DATA_SOURCE,
    attr::SAMPLES,
    attr::RANGES,
    attr::FREQUENCY,
    attr::TRIGGER,
];

/// Attributes that may be given only once along a declaration path
const ONCE_ONLY: [&str; 3] = [attr::RANGES, attr::SAMPLES, attr::SYNC_SIGNAL];

/// Attributes that only make sense on a signal, never on a namespace
const SIGNAL_ONLY: [&str; 5] = [
    attr::ALIAS,
    attr::DEFAULT,
    attr::SYNC_SIGNAL,
    attr::NUMBER_OF_ELEMENTS,
    attr::NUMBER_OF_DIMENSIONS,
];

/// A primitive member reached while walking a struct
#[derive(Debug, Clone)]
struct MemberLeaf {
    /// Dotted member path relative to the struct (`a1.b1`)
    path: String,
    ty: TypeDescriptor,
    full_type: String,
    dimensions: u8,
    elements: u32,
}

/// Flatten every declaration of a signal list, rejecting duplicate leaf names.
pub fn flatten_signals(
    declarations: &[SignalDeclaration],
    registry: &TypeRegistry,
    max_depth: usize,
) -> Result<Vec<Signal>> {
    let mut signals = Vec::new();
    let mut seen = HashSet::new();
    for decl in declarations {
        for signal in flatten_signal(decl, registry, max_depth)? {
            if !seen.insert(signal.qualified_name.clone()) {
                return Err(BuildError::new(
                    ErrorKind::DuplicateName,
                    &signal.qualified_name,
                    "more than one signal flattens to this name",
                ));
            }
            signals.push(signal);
        }
    }
    Ok(signals)
}

/// Expand one declaration into its primitive leaves.
///
/// # Arguments
/// * `decl` - The declaration as harvested from the store
/// * `registry` - Registered struct types
/// * `max_depth` - Maximum namespace/struct nesting followed
///
/// # Returns
/// The leaves in declaration and member order
pub fn flatten_signal(
    decl: &SignalDeclaration,
    registry: &TypeRegistry,
    max_depth: usize,
) -> Result<Vec<Signal>> {
    let mut leaves = Vec::new();
    flatten_into(decl, "", &[], registry, max_depth, 0, &mut leaves)?;
    Ok(leaves)
}

fn invalid(name: &str, message: impl Into<String>) -> BuildError {
    BuildError::new(ErrorKind::InvalidAttribute, name, message)
}

fn find<'a>(attributes: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

#[allow(clippy::too_many_arguments)]
fn flatten_into(
    decl: &SignalDeclaration,
    prefix: &str,
    inherited: &[(String, Value)],
    registry: &TypeRegistry,
    max_depth: usize,
    depth: usize,
    out: &mut Vec<Signal>,
) -> Result<()> {
    let name = join_path(prefix, &decl.name);
    if depth > max_depth {
        return Err(invalid(
            &name,
            format!("signal nesting exceeds {} levels", max_depth),
        ));
    }

    for key in ONCE_ONLY {
        if decl.has_attribute(key) && find(inherited, key).is_some() {
            return Err(invalid(
                &name,
                format!("{} is already given by an enclosing namespace", key),
            ));
        }
    }

    let type_value = decl.attribute(attr::TYPE);
    if let Some(value) = type_value {
        if value.as_text().is_none() {
            return Err(invalid(&name, format!("Type {} is not a type name", value)));
        }
    }

    if type_value.is_none() && !decl.children.is_empty() {
        return flatten_namespace(decl, &name, inherited, registry, max_depth, depth, out);
    }

    if !decl.children.is_empty() {
        return Err(invalid(
            &name,
            format!(
                "typed signal cannot contain nested signal {}",
                decl.children[0].name
            ),
        ));
    }

    // Own attributes win over inherited ones
    let mut attributes = decl.attributes.clone();
    for (key, value) in inherited {
        if find(&attributes, key).is_none() {
            attributes.push((key.clone(), value.clone()));
        }
    }

    match decl.type_name() {
        Some(type_name) => match registry.lookup(type_name) {
            Some(TypeRef::Struct(def)) => {
                expand_struct(&name, decl, def, &attributes, registry, max_depth, out)
            }
            Some(TypeRef::Primitive(_)) => push_primitive(&name, decl, &attributes, out),
            None => Err(BuildError::new(
                ErrorKind::UnresolvedName,
                &name,
                format!("unknown type {}", type_name),
            )),
        },
        // Untyped: the type is inferred from the data source later on
        None => push_primitive(&name, decl, &attributes, out),
    }
}

#[allow(clippy::too_many_arguments)]
fn flatten_namespace(
    decl: &SignalDeclaration,
    name: &str,
    inherited: &[(String, Value)],
    registry: &TypeRegistry,
    max_depth: usize,
    depth: usize,
    out: &mut Vec<Signal>,
) -> Result<()> {
    if let Some(key) = SIGNAL_ONLY.iter().find(|k| decl.has_attribute(k)) {
        return Err(invalid(
            name,
            format!("{} is not valid on a signal namespace", key),
        ));
    }
    if !decl.member_aliases.is_empty() || !decl.defaults.is_empty() {
        return Err(invalid(
            name,
            "MemberAliases and Defaults are not valid on a signal namespace",
        ));
    }

    let mut scope = inherited.to_vec();
    for (key, value) in &decl.attributes {
        if !INHERITED.contains(&key.as_str()) {
            tracing::warn!("Ignoring {} on signal namespace {}", key, name);
            continue;
        }
        match scope.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.clone(),
            None => scope.push((key.clone(), value.clone())),
        }
    }

    let first = out.len();
    for child in &decl.children {
        flatten_into(child, name, &scope, registry, max_depth, depth + 1, out)?;
    }

    // A namespace Frequency must land on exactly one leaf below it
    if decl.has_attribute(attr::FREQUENCY) {
        let synchronised = out[first..].iter().filter(|s| s.frequency.is_some()).count();
        if synchronised > 1 {
            return Err(BuildError::new(
                ErrorKind::MissingRequiredAttribute,
                name,
                format!(
                    "Frequency on namespace {} reaches {} signals; \
                     declare it on the signal that synchronises",
                    name, synchronised
                ),
            ));
        }
    }
    Ok(())
}

fn push_primitive(
    name: &str,
    decl: &SignalDeclaration,
    attributes: &[(String, Value)],
    out: &mut Vec<Signal>,
) -> Result<()> {
    if !decl.member_aliases.is_empty() || !decl.defaults.is_empty() {
        return Err(invalid(
            name,
            "MemberAliases and Defaults are only valid on struct signals",
        ));
    }
    out.push(Signal::from_attributes(name, attributes)?);
    Ok(())
}

/// Walk the members of `def`, collecting one entry per primitive member.
#[allow(clippy::too_many_arguments)]
fn collect_members(
    def: &StructDef,
    path: &str,
    breadcrumb: &str,
    registry: &TypeRegistry,
    max_depth: usize,
    depth: usize,
    signal: &str,
    leaves: &mut Vec<MemberLeaf>,
) -> Result<()> {
    if depth > max_depth {
        return Err(invalid(
            signal,
            format!("struct nesting exceeds {} levels", max_depth),
        ));
    }
    for member in &def.members {
        let member_path = join_path(path, &member.name);
        match registry.lookup(&member.type_name) {
            Some(TypeRef::Primitive(ty)) => leaves.push(MemberLeaf {
                full_type: format!("{}.{}", breadcrumb, ty.name()),
                path: member_path,
                ty,
                dimensions: member.number_of_dimensions,
                elements: member.number_of_elements,
            }),
            Some(TypeRef::Struct(nested)) => {
                if member.is_array() {
                    return Err(BuildError::new(
                        ErrorKind::DimensionMismatch,
                        join_path(signal, &member_path),
                        format!("arrays of struct {} are not supported", nested.name),
                    ));
                }
                collect_members(
                    nested,
                    &member_path,
                    &format!("{}.{}", breadcrumb, nested.name),
                    registry,
                    max_depth,
                    depth + 1,
                    signal,
                    leaves,
                )?;
            }
            None => {
                return Err(BuildError::new(
                    ErrorKind::UnresolvedName,
                    join_path(signal, &member_path),
                    format!("unknown member type {}", member.type_name),
                ))
            }
        }
    }
    Ok(())
}

/// Turn a member key into a member path relative to the struct signal.
fn member_key<'a>(key: &'a str, qualified: &str, own: &str) -> &'a str {
    for base in [qualified, own] {
        if key == base {
            return "";
        }
        if let Some(rest) = key.strip_prefix(base).and_then(|r| r.strip_prefix('.')) {
            return rest;
        }
    }
    key
}

/// True if member path `prefix` covers `path` (empty covers everything)
fn covers(prefix: &str, path: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'.'))
}

fn expand_struct(
    name: &str,
    decl: &SignalDeclaration,
    def: &StructDef,
    attributes: &[(String, Value)],
    registry: &TypeRegistry,
    max_depth: usize,
    out: &mut Vec<Signal>,
) -> Result<()> {
    let mut leaves = Vec::new();
    collect_members(def, "", &def.name, registry, max_depth, 0, name, &mut leaves)?;
    if leaves.is_empty() {
        return Err(invalid(name, format!("struct {} has no members", def.name)));
    }

    if let Some(default) = find(attributes, attr::DEFAULT) {
        return Err(BuildError::new(
            ErrorKind::AmbiguousStructDefault,
            name,
            format!(
                "Default {} given for struct {}; use Defaults per member",
                default, def.name
            ),
        ));
    }

    let shape = match (
        find(attributes, attr::NUMBER_OF_ELEMENTS),
        find(attributes, attr::NUMBER_OF_DIMENSIONS),
    ) {
        (None, None) => None,
        (Some(_), None) | (None, Some(_)) => {
            return Err(BuildError::new(
                ErrorKind::MissingRequiredAttribute,
                name,
                "struct signals need both NumberOfElements and NumberOfDimensions",
            ))
        }
        (Some(e), Some(d)) => {
            let elements = e
                .as_u32()
                .ok_or_else(|| invalid(name, format!("NumberOfElements {} is not a count", e)))?;
            let dimensions = d
                .as_u32()
                .and_then(|d| u8::try_from(d).ok())
                .ok_or_else(|| invalid(name, format!("NumberOfDimensions {} is not valid", d)))?;
            if leaves.len() == 1 {
                Some((dimensions, elements))
            } else if elements <= 1 && dimensions <= 1 {
                None
            } else {
                return Err(BuildError::new(
                    ErrorKind::DimensionMismatch,
                    name,
                    format!(
                        "struct {} has {} members and cannot be an array \
                         ({} dimension(s), {} element(s))",
                        def.name,
                        leaves.len(),
                        dimensions,
                        elements
                    ),
                ));
            }
        }
    };

    let sync_leaf = match find(attributes, attr::SYNC_SIGNAL) {
        None => None,
        Some(value) => {
            let target = value
                .as_text()
                .ok_or_else(|| invalid(name, format!("SyncSignal {} is not a name", value)))?;
            let path = member_key(target, name, &decl.name);
            let position = leaves.iter().position(|l| l.path == path).ok_or_else(|| {
                BuildError::new(
                    ErrorKind::UnresolvedName,
                    name,
                    format!("SyncSignal {} is not a member of {}", target, def.name),
                )
            })?;
            Some(position)
        }
    };

    let frequency_leaf = match find(attributes, attr::FREQUENCY) {
        None => None,
        Some(_) => match sync_leaf {
            Some(position) => Some(position),
            None if leaves.len() == 1 => Some(0),
            None => {
                return Err(BuildError::new(
                    ErrorKind::MissingRequiredAttribute,
                    name,
                    format!(
                        "Frequency on struct {} with {} members needs a SyncSignal",
                        def.name,
                        leaves.len()
                    ),
                ))
            }
        },
    };

    let alias = match find(attributes, attr::ALIAS) {
        Some(value) => Some(
            value
                .as_text()
                .ok_or_else(|| invalid(name, format!("Alias {} is not a name", value)))?,
        ),
        None => None,
    };

    let mut member_aliases = Vec::with_capacity(decl.member_aliases.len());
    for (key, member_alias) in &decl.member_aliases {
        let path = member_key(key, name, &decl.name);
        if !leaves.iter().any(|l| covers(path, &l.path)) {
            return Err(BuildError::new(
                ErrorKind::UnresolvedName,
                name,
                format!("MemberAliases key {} matches no member of {}", key, def.name),
            ));
        }
        member_aliases.push((path, member_alias.as_str()));
    }

    let mut defaults: Vec<Option<Value>> = vec![None; leaves.len()];
    for (key, value) in &decl.defaults {
        let path = member_key(key, name, &decl.name);
        let position = leaves.iter().position(|l| l.path == path).ok_or_else(|| {
            BuildError::new(
                ErrorKind::UnresolvedName,
                name,
                format!("Defaults key {} matches no primitive member of {}", key, def.name),
            )
        })?;
        defaults[position] = Some(value.clone());
    }

    // Everything else is shared by all leaves
    let shared: Vec<(String, Value)> = attributes
        .iter()
        .filter(|(k, _)| {
            !matches!(
                k.as_str(),
                attr::TYPE
                    | attr::NUMBER_OF_ELEMENTS
                    | attr::NUMBER_OF_DIMENSIONS
                    | attr::ALIAS
                    | attr::SYNC_SIGNAL
            )
        })
        .cloned()
        .collect();
    let mut template = Signal::from_attributes(name, &shared)?;
    let frequency = template.frequency.take();

    for (position, (leaf, default)) in leaves.iter().zip(defaults).enumerate() {
        let mut signal = template.clone();
        signal.qualified_name = join_path(name, &leaf.path);
        signal.type_name = Some(leaf.ty.name());
        signal.resolved_type = Some(leaf.ty);
        signal.full_type = Some(leaf.full_type.clone());
        let (dimensions, elements) = shape.unwrap_or((leaf.dimensions, leaf.elements));
        signal.number_of_dimensions = Some(dimensions);
        signal.number_of_elements = Some(elements);
        if frequency_leaf == Some(position) {
            signal.frequency = frequency;
        }
        // Longest member-alias prefix wins, replaced verbatim
        let member_alias = member_aliases
            .iter()
            .filter(|(prefix, _)| covers(prefix, &leaf.path))
            .max_by_key(|(prefix, _)| prefix.len());
        signal.alias = match member_alias {
            Some(("", replacement)) => Some(join_path(replacement, &leaf.path)),
            Some((prefix, replacement)) => {
                Some(format!("{}{}", replacement, &leaf.path[prefix.len()..]))
            }
            None => alias.map(|a| join_path(a, &leaf.path)),
        };
        signal.default = default;
        out.push(signal);
    }
    Ok(())
}
