//! Signal declarations and resolved signal records.
//!
//! A [`SignalDeclaration`] is the raw, possibly nested, signal tree harvested from
//! a Functions or Data store. Flattening turns declarations into [`Signal`]
//! records, one per primitive leaf, which the later stages complete and verify.
//!
//! # Attributes
//!
//! | Attribute            | Meaning                                              |
//! |----------------------|------------------------------------------------------|
//! | `Type`               | primitive or registered struct type name             |
//! | `NumberOfDimensions` | 0 scalar, 1 vector, 2 matrix                         |
//! | `NumberOfElements`   | total element count                                  |
//! | `DataSource`         | data source the signal is bound to                   |
//! | `Alias`              | name used in the data source instead of the own name |
//! | `MemberAliases`      | per-member alias overrides (struct signals)          |
//! | `Default`            | default value                                        |
//! | `Defaults`           | per-member defaults (struct signals)                 |
//! | `Ranges`             | inclusive `{min max}` element index pairs            |
//! | `Samples`            | number of samples copied per cycle                   |
//! | `Frequency`          | execution frequency (marks a synchronising signal)   |
//! | `Trigger`            | output signal that triggers the data source          |
//! | `SyncSignal`         | member carrying `Frequency` in a struct signal       |
//!
//! `QualifiedName`, `ByteSize`, `ByteOffset`, `RangeWindows` and `Broker` are
//! computed by the builder and rejected on input. Any other leaf attribute is
//! preserved verbatim in [`Signal::properties`].

use crate::error::{BuildError, ErrorKind, Result};
use crate::store::{ConfigurationStore, NodeId, StoreResult};
use crate::types::{Scalar, TypeDescriptor, Value};

/// Attribute names understood by the builder.
pub mod attr {
    pub const TYPE: &str = "Type";
    pub const NUMBER_OF_DIMENSIONS: &str = "NumberOfDimensions";
    pub const NUMBER_OF_ELEMENTS: &str = "NumberOfElements";
    pub const DATA_SOURCE: &str = "DataSource";
    pub const ALIAS: &str = "Alias";
    pub const MEMBER_ALIASES: &str = "MemberAliases";
    pub const DEFAULT: &str = "Default";
    pub const DEFAULTS: &str = "Defaults";
    pub const RANGES: &str = "Ranges";
    pub const SAMPLES: &str = "Samples";
    pub const FREQUENCY: &str = "Frequency";
    pub const TRIGGER: &str = "Trigger";
    pub const SYNC_SIGNAL: &str = "SyncSignal";
    pub const QUALIFIED_NAME: &str = "QualifiedName";
    pub const FULL_TYPE: &str = "FullType";
    pub const BYTE_SIZE: &str = "ByteSize";
    pub const BYTE_OFFSET: &str = "ByteOffset";
    pub const RANGE_WINDOWS: &str = "RangeWindows";
    pub const BROKER: &str = "Broker";

    /// Written by the builder on export, never accepted as input
    pub const COMPUTED: [&str; 5] = [QUALIFIED_NAME, BYTE_SIZE, BYTE_OFFSET, RANGE_WINDOWS, BROKER];
}

/// An inclusive element index range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

impl Range {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Number of elements covered (only meaningful once validated)
    pub fn len(&self) -> u32 {
        self.max.saturating_sub(self.min).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Check `min <= max < total`.
    pub fn validate(&self, total: u32) -> std::result::Result<(), String> {
        if self.min > self.max {
            return Err(format!("range {{{} {}}} has min > max", self.min, self.max));
        }
        if self.max >= total {
            return Err(format!(
                "range {{{} {}}} exceeds the {} element(s) of the signal",
                self.min, self.max, total
            ));
        }
        Ok(())
    }
}

/// Parse a `Ranges` value: a matrix of `{min max}` rows, or a single 2-element vector.
pub fn parse_ranges(value: &Value) -> std::result::Result<Vec<Range>, String> {
    let bound = |s: &Scalar| {
        s.as_u32()
            .ok_or_else(|| format!("range bound {} is not a non-negative index", s))
    };
    let pair = |row: &[Scalar]| -> std::result::Result<Range, String> {
        match row {
            [min, max] => Ok(Range::new(bound(min)?, bound(max)?)),
            _ => Err(format!("range rows need exactly 2 bounds, found {}", row.len())),
        }
    };
    match value {
        Value::Matrix(rows) => rows.iter().map(|row| pair(row)).collect(),
        Value::Vector(row) => Ok(vec![pair(row)?]),
        Value::Scalar(_) => Err(format!("Ranges {} is not a list of index pairs", value)),
    }
}

/// True if any range of `a` intersects any range of `b`.
pub fn ranges_intersect(a: &[Range], b: &[Range]) -> bool {
    a.iter().any(|ra| b.iter().any(|rb| ra.intersects(rb)))
}

/// A raw signal declaration as found in a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalDeclaration {
    pub name: String,
    /// Leaf attributes in declaration order
    pub attributes: Vec<(String, Value)>,
    /// `MemberAliases` entries: qualified-name prefix to alias
    pub member_aliases: Vec<(String, String)>,
    /// `Defaults` entries: qualified member name to default
    pub defaults: Vec<(String, Value)>,
    /// Nested signal declarations (namespaces)
    pub children: Vec<SignalDeclaration>,
}

impl SignalDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_attribute(key, value.into());
        self
    }

    pub fn with_member_alias(mut self, prefix: &str, alias: &str) -> Self {
        self.member_aliases
            .push((prefix.to_string(), alias.to_string()));
        self
    }

    pub fn with_default_for(mut self, member: &str, value: impl Into<Value>) -> Self {
        self.defaults.push((member.to_string(), value.into()));
        self
    }

    pub fn with_child(mut self, child: SignalDeclaration) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some()
    }

    pub fn set_attribute(&mut self, key: &str, value: Value) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        let position = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(position).1)
    }

    /// Type name, if declared as text
    pub fn type_name(&self) -> Option<&str> {
        self.attribute(attr::TYPE).and_then(Value::as_text)
    }

    /// Read a declaration from a store node. Leaf children become attributes,
    /// `MemberAliases`/`Defaults` become the member maps, any other interior
    /// child is a nested signal.
    pub fn from_store(store: &ConfigurationStore, node: NodeId) -> StoreResult<Self> {
        let mut decl = SignalDeclaration::new(store.name(node).unwrap_or(""));
        for child in store.children(node) {
            let name = store.name(child).unwrap_or("");
            if store.is_leaf(child) {
                if let Some(value) = store.value(child) {
                    decl.attributes.push((name.to_string(), value.clone()));
                }
                continue;
            }
            match name {
                attr::MEMBER_ALIASES => {
                    for entry in store.children(child) {
                        let key = store.name(entry).unwrap_or("").to_string();
                        if let Some(alias) = store.value(entry).and_then(Value::as_text) {
                            decl.member_aliases.push((key, alias.to_string()));
                        }
                    }
                }
                attr::DEFAULTS => {
                    for entry in store.children(child) {
                        let key = store.name(entry).unwrap_or("").to_string();
                        if let Some(value) = store.value(entry) {
                            decl.defaults.push((key, value.clone()));
                        }
                    }
                }
                _ => decl.children.push(SignalDeclaration::from_store(store, child)?),
            }
        }
        Ok(decl)
    }

    /// Read every declaration below a signal-list node (`InputSignals`, `Signals`).
    pub fn list_from_store(store: &ConfigurationStore, node: NodeId) -> StoreResult<Vec<Self>> {
        store
            .children(node)
            .filter(|&c| store.is_interior(c))
            .map(|c| SignalDeclaration::from_store(store, c))
            .collect()
    }
}

/// A flattened, primitive signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    pub qualified_name: String,
    /// Declared type name (primitive name after flattening)
    pub type_name: Option<String>,
    pub resolved_type: Option<TypeDescriptor>,
    /// `<Struct>.<Nested>.<primitive>` breadcrumb for struct members
    pub full_type: Option<String>,
    pub number_of_dimensions: Option<u8>,
    pub number_of_elements: Option<u32>,
    pub data_source: Option<String>,
    pub alias: Option<String>,
    pub default: Option<Value>,
    pub ranges: Option<Vec<Range>>,
    pub samples: Option<u32>,
    pub frequency: Option<f64>,
    pub trigger: bool,
    pub byte_size: Option<u32>,
    /// Attributes not interpreted by the builder
    pub properties: Vec<(String, Value)>,
}

impl Signal {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            ..Default::default()
        }
    }

    /// Name used when looking the signal up in its data source
    pub fn lookup_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.qualified_name)
    }

    /// True once type, dimensions and element count are all known
    pub fn is_concrete(&self) -> bool {
        self.resolved_type.is_some()
            && self.number_of_dimensions.is_some()
            && self.number_of_elements.is_some()
    }

    /// True if this signal paces its thread
    pub fn is_sync(&self) -> bool {
        self.frequency.is_some()
    }

    /// Build a leaf signal from declaration attributes. `SyncSignal`, `MemberAliases`
    /// and `Defaults` are consumed by flattening and must not reach this point.
    pub fn from_attributes(qualified_name: &str, attributes: &[(String, Value)]) -> Result<Self> {
        let invalid = |key: &str, value: &Value, why: &str| {
            BuildError::new(
                ErrorKind::InvalidAttribute,
                qualified_name,
                format!("{} = {} {}", key, value, why),
            )
        };

        let mut signal = Signal::new(qualified_name);
        for (key, value) in attributes {
            match key.as_str() {
                attr::TYPE => {
                    let name = value
                        .as_text()
                        .ok_or_else(|| invalid(key, value, "is not a type name"))?;
                    signal.type_name = Some(name.to_string());
                    signal.resolved_type = TypeDescriptor::from_name(name);
                }
                attr::NUMBER_OF_DIMENSIONS => {
                    let dims = value
                        .as_u32()
                        .and_then(|d| u8::try_from(d).ok())
                        .ok_or_else(|| invalid(key, value, "is not a dimension count"))?;
                    signal.number_of_dimensions = Some(dims);
                }
                attr::NUMBER_OF_ELEMENTS => {
                    let count = value
                        .as_u32()
                        .ok_or_else(|| invalid(key, value, "is not an element count"))?;
                    signal.number_of_elements = Some(count);
                }
                attr::DATA_SOURCE => {
                    let name = value
                        .as_text()
                        .ok_or_else(|| invalid(key, value, "is not a data source name"))?;
                    signal.data_source = Some(name.to_string());
                }
                attr::ALIAS => {
                    let name = value
                        .as_text()
                        .ok_or_else(|| invalid(key, value, "is not a signal name"))?;
                    signal.alias = Some(name.to_string());
                }
                attr::FULL_TYPE => {
                    signal.full_type = value.as_text().map(str::to_string);
                }
                attr::DEFAULT => signal.default = Some(value.clone()),
                attr::RANGES => {
                    let ranges = parse_ranges(value).map_err(|why| {
                        BuildError::new(ErrorKind::RangeOutOfBounds, qualified_name, why)
                    })?;
                    signal.ranges = Some(ranges);
                }
                attr::SAMPLES => {
                    let samples = value
                        .as_u32()
                        .filter(|&s| s > 0)
                        .ok_or_else(|| invalid(key, value, "is not a positive sample count"))?;
                    signal.samples = Some(samples);
                }
                attr::FREQUENCY => {
                    let frequency = value
                        .as_f64()
                        .filter(|f| f.is_finite() && *f > 0.0)
                        .ok_or_else(|| invalid(key, value, "is not a positive frequency"))?;
                    signal.frequency = Some(frequency);
                }
                attr::TRIGGER => {
                    signal.trigger = value
                        .as_bool()
                        .ok_or_else(|| invalid(key, value, "is not a boolean"))?;
                }
                attr::SYNC_SIGNAL | attr::MEMBER_ALIASES | attr::DEFAULTS => {
                    return Err(invalid(key, value, "is only valid on struct signals"));
                }
                computed if attr::COMPUTED.contains(&computed) => {
                    return Err(invalid(key, value, "is computed by the builder"));
                }
                _ => signal.properties.push((key.clone(), value.clone())),
            }
        }
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(rows: &[(i64, i64)]) -> Value {
        Value::Matrix(
            rows.iter()
                .map(|&(a, b)| vec![Scalar::Int(a), Scalar::Int(b)])
                .collect(),
        )
    }

    #[test]
    fn test_parse_ranges() {
        let ranges = parse_ranges(&pairs(&[(0, 10), (15, 20)])).unwrap();
        assert_eq!(ranges, vec![Range::new(0, 10), Range::new(15, 20)]);

        let single = Value::Vector(vec![Scalar::Int(2), Scalar::Int(3)]);
        assert_eq!(parse_ranges(&single).unwrap(), vec![Range::new(2, 3)]);

        assert!(parse_ranges(&pairs(&[(-1, 3)])).is_err());
        assert!(parse_ranges(&Value::from(3u32)).is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(Range::new(0, 31).validate(32).is_ok());
        assert!(Range::new(14, 11).validate(32).is_err());
        assert!(Range::new(0, 32).validate(32).is_err());
        assert_eq!(Range::new(11, 14).len(), 4);
    }

    #[test]
    fn test_ranges_intersect() {
        let a = [Range::new(0, 10), Range::new(15, 20)];
        let b = [Range::new(11, 14), Range::new(21, 31)];
        let c = [Range::new(11, 14), Range::new(20, 31)];
        assert!(!ranges_intersect(&a, &b));
        assert!(ranges_intersect(&a, &c));
    }

    #[test]
    fn test_declaration_from_store() {
        let mut store = ConfigurationStore::new();
        store.set("Signal.Type", "Outer").unwrap();
        let aliases = store.create_path("Signal.MemberAliases").unwrap();
        store.write(aliases, "Signal.a1", "Renamed").unwrap();
        let defaults = store.create_path("Signal.Defaults").unwrap();
        store.write(defaults, "Signal.a2", "{1 2}").unwrap();
        store.set("Signal.Nested.Type", "uint8").unwrap();

        let node = store.resolve("Signal").unwrap();
        let decl = SignalDeclaration::from_store(&store, node).unwrap();
        assert_eq!(decl.type_name(), Some("Outer"));
        assert_eq!(
            decl.member_aliases,
            vec![("Signal.a1".to_string(), "Renamed".to_string())]
        );
        assert_eq!(decl.defaults.len(), 1);
        assert_eq!(decl.children.len(), 1);
        assert_eq!(decl.children[0].name, "Nested");
    }

    #[test]
    fn test_signal_from_attributes() {
        let decl = SignalDeclaration::new("S")
            .with_attribute(attr::TYPE, "float32")
            .with_attribute(attr::NUMBER_OF_ELEMENTS, 3u32)
            .with_attribute(attr::SAMPLES, 2u32)
            .with_attribute(attr::FREQUENCY, 1000.0)
            .with_attribute("Address", 0x40u32);
        let signal = Signal::from_attributes("GAM.S", &decl.attributes).unwrap();
        assert_eq!(signal.resolved_type, Some(TypeDescriptor::FLOAT32));
        assert_eq!(signal.number_of_elements, Some(3));
        assert_eq!(signal.samples, Some(2));
        assert!(signal.is_sync());
        assert_eq!(signal.properties, vec![("Address".to_string(), Value::from(0x40u32))]);
        assert!(!signal.is_concrete());
    }

    #[test]
    fn test_signal_attribute_errors() {
        let attrs = vec![(attr::SAMPLES.to_string(), Value::from(0u32))];
        let err = Signal::from_attributes("S", &attrs).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidAttribute));

        let attrs = vec![(attr::SYNC_SIGNAL.to_string(), Value::from("a"))];
        let err = Signal::from_attributes("S", &attrs).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidAttribute));

        let attrs = vec![(attr::FREQUENCY.to_string(), Value::from(-1.0))];
        assert!(Signal::from_attributes("S", &attrs).is_err());

        for key in attr::COMPUTED {
            let attrs = vec![(key.to_string(), Value::from(4u32))];
            let err = Signal::from_attributes("S", &attrs).unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::InvalidAttribute), "{}", key);
        }
    }

    #[test]
    fn test_lookup_name() {
        let mut signal = Signal::new("Sig");
        assert_eq!(signal.lookup_name(), "Sig");
        signal.alias = Some("Other".into());
        assert_eq!(signal.lookup_name(), "Other");
    }
}
