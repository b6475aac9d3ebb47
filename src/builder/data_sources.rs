//! Data source resolution and verification stages.
//!
//! Resolution binds every function signal to a data-source signal, creating the
//! data-source signal on first reference and merging attributes on every later
//! one. Verification then settles each data-source signal's type, shape, byte size
//! and default value.

use super::database::{
    DataSourceSignal, DefaultContribution, Direction, SignalBinding, SignalRef,
};
use super::id::FunctionId;
use super::{BuildStage, ConfigurationBuilder};
use crate::error::{BuildError, ErrorKind, Result, ResultExt};
use crate::signal::Signal;
use crate::types::parse_default;

/// Settle missing dimensions/elements. See DESIGN.md for the table.
pub(crate) fn default_shape(
    name: &str,
    dimensions: Option<u8>,
    elements: Option<u32>,
) -> Result<(u8, u32)> {
    let shape = match (dimensions, elements) {
        (_, Some(0)) => {
            return Err(BuildError::new(
                ErrorKind::ElementCountMismatch,
                name,
                "NumberOfElements must be at least 1",
            ))
        }
        (Some(d), _) if d > 2 => {
            return Err(BuildError::new(
                ErrorKind::DimensionMismatch,
                name,
                format!("{} dimensions are not supported", d),
            ))
        }
        (None, None) | (None, Some(1)) | (Some(0), None) => (0, 1),
        (None, Some(n)) => (1, n),
        (Some(1), None) => (1, 1),
        (Some(d), None) => {
            return Err(BuildError::new(
                ErrorKind::MissingRequiredAttribute,
                name,
                format!("{} dimensions given without NumberOfElements", d),
            ))
        }
        (Some(0), Some(n)) if n != 1 => {
            return Err(BuildError::new(
                ErrorKind::DimensionMismatch,
                name,
                format!("scalar signal cannot have {} elements", n),
            ))
        }
        (Some(d), Some(n)) => (d, n),
    };
    Ok(shape)
}

/// Merge `incoming` into the data-source `existing` signal: attributes present on
/// both sides must agree, attributes only on the incoming side are copied.
fn merge_attributes(existing: &mut Signal, incoming: &Signal, origin: &str) -> Result<()> {
    let name = existing.qualified_name.clone();
    let conflict = |kind, what: &str, ours: String, theirs: String| {
        BuildError::new(
            kind,
            &name,
            format!("{} {} from {} conflicts with {}", what, theirs, origin, ours),
        )
    };

    match (&existing.type_name, &incoming.type_name) {
        (Some(ours), Some(theirs)) if ours != theirs => {
            return Err(conflict(
                ErrorKind::TypeMismatch,
                "Type",
                ours.clone(),
                theirs.clone(),
            ))
        }
        (None, Some(theirs)) => {
            existing.type_name = Some(theirs.clone());
            existing.resolved_type = incoming.resolved_type;
        }
        _ => {}
    }
    match (&existing.full_type, &incoming.full_type) {
        (Some(ours), Some(theirs)) if ours != theirs => {
            return Err(conflict(
                ErrorKind::TypeMismatch,
                "FullType",
                ours.clone(),
                theirs.clone(),
            ))
        }
        (None, Some(theirs)) => existing.full_type = Some(theirs.clone()),
        _ => {}
    }
    match (existing.number_of_dimensions, incoming.number_of_dimensions) {
        (Some(ours), Some(theirs)) if ours != theirs => {
            return Err(conflict(
                ErrorKind::DimensionMismatch,
                "NumberOfDimensions",
                ours.to_string(),
                theirs.to_string(),
            ))
        }
        (None, Some(theirs)) => existing.number_of_dimensions = Some(theirs),
        _ => {}
    }
    match (existing.number_of_elements, incoming.number_of_elements) {
        (Some(ours), Some(theirs)) if ours != theirs => {
            return Err(conflict(
                ErrorKind::ElementCountMismatch,
                "NumberOfElements",
                ours.to_string(),
                theirs.to_string(),
            ))
        }
        (None, Some(theirs)) => existing.number_of_elements = Some(theirs),
        _ => {}
    }
    Ok(())
}

impl ConfigurationBuilder<'_> {
    /// Stage 3: bind every function signal to its data-source signal.
    pub fn resolve_data_sources(&mut self) -> Result<()> {
        self.run_stage(
            "Data source resolution",
            BuildStage::SignalsFlattened,
            BuildStage::DataSourcesResolved,
            |builder| {
                for index in 0..builder.functions.len() {
                    let id = FunctionId(index as u32);
                    for direction in Direction::ALL {
                        let count = builder
                            .functions
                            .get(id)
                            .map_or(0, |f| f.signals(direction).len());
                        for signal in 0..count {
                            let reference = SignalRef {
                                function: id,
                                direction,
                                signal,
                            };
                            builder.resolve_signal_data_source(reference)?;
                        }
                    }
                }
                tracing::debug!(
                    "Resolved {} function signals onto {} data-source signals",
                    builder.functions.signal_count(),
                    builder.data.signal_count()
                );
                Ok(())
            },
        )
    }

    fn resolve_signal_data_source(&mut self, reference: SignalRef) -> Result<()> {
        let function = self
            .functions
            .get(reference.function)
            .ok_or_else(|| BuildError::Config(format!("no function {}", reference.function)))?;
        let path = function.signal_path(reference.direction, reference.signal);
        let incoming = function.signals(reference.direction)[reference.signal]
            .signal
            .clone();

        let requested = incoming
            .data_source
            .clone()
            .or_else(|| function.default_data_source.clone())
            .or_else(|| self.settings.default_data_source.clone())
            .ok_or_else(|| {
                BuildError::new(
                    ErrorKind::MissingRequiredAttribute,
                    &path,
                    "no DataSource and no default data source",
                )
            })?;
        let data_source = self.data.find(&requested).with_context(|| path.clone())?;

        let source = self
            .data
            .get_mut(data_source)
            .ok_or_else(|| BuildError::Config(format!("no data source {}", data_source)))?;
        let lookup = incoming.lookup_name().to_string();
        let position = match source.find_signal(&lookup) {
            Some(position) => position,
            None => {
                if let Some(existing) = source.node_conflict(&lookup) {
                    return Err(BuildError::new(
                        ErrorKind::LeafMappedOnNode,
                        &path,
                        format!(
                            "{}.{} cannot be bound to {}.{}",
                            source.qualified_name, lookup, source.qualified_name, existing
                        ),
                    ));
                }
                source
                    .signals
                    .push(DataSourceSignal::new(Signal::new(lookup.clone())));
                source.signals.len() - 1
            }
        };

        let qualified_source = source.qualified_name.clone();
        let entry = &mut source.signals[position];
        merge_attributes(&mut entry.signal, &incoming, &path)?;
        if let Some(value) = &incoming.default {
            entry.defaults.push(DefaultContribution {
                origin: path.clone(),
                value: value.clone(),
            });
        }
        entry.references.push(reference);
        tracing::trace!("{} -> {}.{}", path, qualified_source, lookup);

        if let Some(fs) = self
            .functions
            .get_mut(reference.function)
            .and_then(|f| f.set_mut(reference.direction).signals.get_mut(reference.signal))
        {
            fs.signal.data_source = Some(qualified_source);
            fs.binding = Some(SignalBinding {
                data_source,
                signal: position,
            });
        }
        Ok(())
    }

    /// Stage 4: every data-source signal gets a concrete type, shape and byte
    /// size, and all of its default contributions must agree.
    pub fn verify_data_sources_signals(&mut self) -> Result<()> {
        self.run_stage(
            "Data source signal verification",
            BuildStage::DataSourcesResolved,
            BuildStage::DataSourcesVerified,
            |builder| {
                for source in builder.data.iter_mut() {
                    for entry in source.signals.iter_mut() {
                        let name =
                            format!("{}.{}", source.qualified_name, entry.signal.qualified_name);
                        verify_data_source_signal(&name, entry)?;
                    }
                }
                tracing::debug!("Verified {} data-source signals", builder.data.signal_count());
                Ok(())
            },
        )
    }
}

fn verify_data_source_signal(name: &str, entry: &mut DataSourceSignal) -> Result<()> {
    let signal = &mut entry.signal;
    let ty = match (&signal.type_name, signal.resolved_type) {
        (_, Some(ty)) => ty,
        (Some(type_name), None) => {
            return Err(BuildError::new(
                ErrorKind::UnresolvedName,
                name,
                format!("{} is not a primitive type", type_name),
            ))
        }
        (None, None) => {
            return Err(BuildError::new(
                ErrorKind::MissingRequiredAttribute,
                name,
                "no Type given by the data source or any function",
            ))
        }
    };

    let (dimensions, elements) =
        default_shape(name, signal.number_of_dimensions, signal.number_of_elements)?;
    signal.number_of_dimensions = Some(dimensions);
    signal.number_of_elements = Some(elements);
    let byte_size = ty.byte_size().checked_mul(elements).ok_or_else(|| {
        BuildError::new(
            ErrorKind::SizeOverflow,
            name,
            format!("{} x {} bytes does not fit 32 bits", elements, ty.byte_size()),
        )
    })?;
    signal.byte_size = Some(byte_size);

    let mut resolved: Option<(&str, Vec<_>)> = None;
    for contribution in &entry.defaults {
        let parsed =
            parse_default(&contribution.value, ty, dimensions, elements).map_err(|why| {
                BuildError::new(
                    ErrorKind::DefaultValueMismatch,
                    name,
                    format!(
                        "Default {} from {}: {}",
                        contribution.value, contribution.origin, why
                    ),
                )
            })?;
        match &resolved {
            Some((origin, baseline)) if *baseline != parsed => {
                return Err(BuildError::new(
                    ErrorKind::DefaultValueMismatch,
                    name,
                    format!(
                        "Default {} from {} differs from the default given by {}",
                        contribution.value, contribution.origin, origin
                    ),
                ))
            }
            Some(_) => {}
            None => resolved = Some((contribution.origin.as_str(), parsed)),
        }
    }
    if let Some(first) = entry.defaults.first() {
        signal.default = Some(first.value.clone());
    }
    entry.resolved_default = resolved.map(|(_, parsed)| parsed);
    Ok(())
}
