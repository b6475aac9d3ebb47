//! Function signal resolution and verification stages.

use super::database::{DataDatabase, Direction, FunctionSignal};
use super::{BuildStage, ConfigurationBuilder};
use crate::error::{BuildError, ErrorKind, Result};

fn resolve_function_signal(
    path: &str,
    fs: &mut FunctionSignal,
    data: &DataDatabase,
) -> Result<()> {
    let binding = fs.binding.ok_or_else(|| {
        BuildError::new(
            ErrorKind::UnresolvedName,
            path,
            "signal is not bound to a data source",
        )
    })?;
    let source = data.signal(binding).ok_or_else(|| {
        BuildError::new(ErrorKind::UnresolvedName, path, "bound data-source signal vanished")
    })?;
    let resolved = &source.signal;
    let signal = &mut fs.signal;

    if signal.type_name.is_none() {
        signal.type_name = resolved.type_name.clone();
        signal.resolved_type = resolved.resolved_type;
    }
    if signal.full_type.is_none() {
        signal.full_type = resolved.full_type.clone();
    }
    if signal.number_of_dimensions.is_none() {
        signal.number_of_dimensions = resolved.number_of_dimensions;
    }
    if signal.number_of_elements.is_none() {
        signal.number_of_elements = resolved.number_of_elements;
    }
    if signal.default.is_none() {
        signal.default = resolved.default.clone();
    }
    Ok(())
}

fn verify_function_signal(
    path: &str,
    direction: Direction,
    fs: &FunctionSignal,
    data: &DataDatabase,
) -> Result<()> {
    let signal = &fs.signal;
    if !signal.is_concrete() {
        return Err(BuildError::new(
            ErrorKind::MissingRequiredAttribute,
            path,
            "type, dimensions or elements are still unresolved",
        ));
    }

    if let Some(resolved) = fs.binding.and_then(|b| data.signal(b)) {
        let resolved = &resolved.signal;
        if signal.resolved_type != resolved.resolved_type {
            return Err(BuildError::new(
                ErrorKind::TypeMismatch,
                path,
                format!(
                    "{:?} differs from data-source type {:?}",
                    signal.type_name, resolved.type_name
                ),
            ));
        }
        if signal.number_of_dimensions != resolved.number_of_dimensions {
            return Err(BuildError::new(
                ErrorKind::DimensionMismatch,
                path,
                format!(
                    "{:?} dimensions differ from data-source {:?}",
                    signal.number_of_dimensions, resolved.number_of_dimensions
                ),
            ));
        }
        if signal.number_of_elements != resolved.number_of_elements {
            return Err(BuildError::new(
                ErrorKind::ElementCountMismatch,
                path,
                format!(
                    "{:?} elements differ from data-source {:?}",
                    signal.number_of_elements, resolved.number_of_elements
                ),
            ));
        }
    }

    if signal.samples.is_some_and(|s| s == 0) {
        return Err(BuildError::new(
            ErrorKind::InvalidAttribute,
            path,
            "Samples must be at least 1",
        ));
    }
    match direction {
        Direction::Output if signal.frequency.is_some() => {
            return Err(BuildError::new(
                ErrorKind::InvalidAttribute,
                path,
                "Frequency is only valid on input signals",
            ))
        }
        Direction::Input if signal.trigger => {
            return Err(BuildError::new(
                ErrorKind::InvalidAttribute,
                path,
                "Trigger is only valid on output signals",
            ))
        }
        _ => {}
    }

    if let Some(ranges) = &signal.ranges {
        let total = signal.number_of_elements.unwrap_or(0);
        for range in ranges {
            range
                .validate(total)
                .map_err(|why| BuildError::new(ErrorKind::RangeOutOfBounds, path, why))?;
        }
    }
    Ok(())
}

impl ConfigurationBuilder<'_> {
    /// Stage 5: copy the settled data-source attributes onto every function
    /// signal that left them out.
    pub fn resolve_function_signals(&mut self) -> Result<()> {
        self.run_stage(
            "Function signal resolution",
            BuildStage::DataSourcesVerified,
            BuildStage::FunctionSignalsResolved,
            |builder| {
                let data = &builder.data;
                for function in builder.functions.iter_mut() {
                    for direction in Direction::ALL {
                        let name = function.qualified_name.clone();
                        for fs in function.set_mut(direction).signals.iter_mut() {
                            let path = format!("{}.{}", name, fs.signal.qualified_name);
                            resolve_function_signal(&path, fs, data)?;
                        }
                    }
                }
                tracing::debug!(
                    "Resolved {} function signals",
                    builder.functions.signal_count()
                );
                Ok(())
            },
        )
    }

    /// Stage 6: every function signal is concrete, agrees with its data-source
    /// signal and declares ranges inside the signal.
    pub fn verify_function_signals(&mut self) -> Result<()> {
        self.run_stage(
            "Function signal verification",
            BuildStage::FunctionSignalsResolved,
            BuildStage::FunctionSignalsVerified,
            |builder| {
                for function in builder.functions.iter() {
                    for direction in Direction::ALL {
                        for (index, fs) in function.signals(direction).iter().enumerate() {
                            let path = function.signal_path(direction, index);
                            verify_function_signal(&path, direction, fs, &builder.data)?;
                        }
                    }
                }
                tracing::debug!(
                    "Verified {} function signals",
                    builder.functions.signal_count()
                );
                Ok(())
            },
        )
    }
}
