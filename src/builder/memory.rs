//! Memory sizing and offset allocation stages.
//!
//! Function buffers hold, per direction, the touched elements of every signal
//! times its sample count. Data-source buffers hold every signal in full. In both,
//! signals are packed back to back in declaration order.

use super::database::{Direction, FunctionSignal, RangeWindow};
use super::id::DataSourceId;
use super::{BuildStage, ConfigurationBuilder};
use crate::error::{BuildError, ErrorKind, Result};

/// Offsets of consecutive blocks of `sizes` bytes, and the total. `None` on
/// overflow.
pub(crate) fn cumulative_offsets<I>(sizes: I) -> Option<(Vec<u32>, u32)>
where
    I: IntoIterator<Item = u32>,
{
    let mut total = 0u32;
    let mut offsets = Vec::new();
    for size in sizes {
        offsets.push(total);
        total = total.checked_add(size)?;
    }
    Some((offsets, total))
}

fn overflow(path: &str, what: &str) -> BuildError {
    BuildError::new(
        ErrorKind::SizeOverflow,
        path,
        format!("{} does not fit in 32 bits", what),
    )
}

/// Byte size and range windows of one function signal
fn size_function_signal(path: &str, fs: &mut FunctionSignal) -> Result<()> {
    let signal = &fs.signal;
    let element = signal.resolved_type.map(|t| t.byte_size()).ok_or_else(|| {
        BuildError::new(ErrorKind::MissingRequiredAttribute, path, "type is unresolved")
    })?;
    let elements = signal.number_of_elements.unwrap_or(1);
    let samples = signal.samples.unwrap_or(1);

    let mut windows = Vec::new();
    let touched = match &signal.ranges {
        Some(ranges) => {
            let mut touched = 0u32;
            for range in ranges {
                let offset = range
                    .min
                    .checked_mul(element)
                    .ok_or_else(|| overflow(path, "range offset"))?;
                let size = range
                    .len()
                    .checked_mul(element)
                    .ok_or_else(|| overflow(path, "range size"))?;
                windows.push(RangeWindow { offset, size });
                touched = touched
                    .checked_add(range.len())
                    .ok_or_else(|| overflow(path, "touched elements"))?;
            }
            touched
        }
        None => {
            let size = elements
                .checked_mul(element)
                .ok_or_else(|| overflow(path, "signal size"))?;
            windows.push(RangeWindow { offset: 0, size });
            elements
        }
    };

    let bytes = element
        .checked_mul(touched)
        .and_then(|b| b.checked_mul(samples))
        .ok_or_else(|| overflow(path, "signal size"))?;
    fs.signal.byte_size = Some(bytes);
    fs.windows = windows;
    Ok(())
}

impl ConfigurationBuilder<'_> {
    /// Stage 9: byte size of every function signal and its windows into the
    /// data-source signal.
    pub fn resolve_function_signals_memory_size(&mut self) -> Result<()> {
        self.run_stage(
            "Function memory sizing",
            BuildStage::ConsumersVerified,
            BuildStage::MemorySizesResolved,
            |builder| {
                for function in builder.functions.iter_mut() {
                    let name = function.qualified_name.clone();
                    for direction in Direction::ALL {
                        for fs in function.set_mut(direction).signals.iter_mut() {
                            let path = format!("{}.{}", name, fs.signal.qualified_name);
                            size_function_signal(&path, fs)?;
                        }
                    }
                }
                Ok(())
            },
        )
    }

    /// Stage 10a: offsets in every function's input and output buffers, and the
    /// per-data-source byte totals.
    pub fn resolve_functions_memory(&mut self) -> Result<()> {
        self.run_stage(
            "Function memory allocation",
            BuildStage::MemorySizesResolved,
            BuildStage::FunctionsMemoryResolved,
            |builder| {
                for function in builder.functions.iter_mut() {
                    let name = function.qualified_name.clone();
                    for direction in Direction::ALL {
                        let set = function.set_mut(direction);
                        let (offsets, total) =
                            cumulative_offsets(set.signals.iter().map(|s| s.memory_size()))
                                .ok_or_else(|| overflow(&name, "function buffer"))?;

                        let mut per_source: Vec<(DataSourceId, u32)> = Vec::new();
                        for (fs, offset) in set.signals.iter_mut().zip(offsets) {
                            fs.offset = Some(offset);
                            let Some(binding) = fs.binding else {
                                continue;
                            };
                            let size = fs.memory_size();
                            match per_source.iter_mut().find(|(id, _)| *id == binding.data_source) {
                                // Bounded by the checked buffer total
                                Some((_, bytes)) => *bytes += size,
                                None => per_source.push((binding.data_source, size)),
                            }
                        }
                        set.memory.size = total;
                        set.memory.data_sources = per_source;
                    }
                    tracing::trace!(
                        "{}: {} input bytes, {} output bytes",
                        name,
                        function.inputs.memory.size,
                        function.outputs.memory.size
                    );
                }
                Ok(())
            },
        )
    }

    /// Stage 10b: offsets in every data source's shared buffer.
    pub fn resolve_data_sources_memory(&mut self) -> Result<()> {
        self.run_stage(
            "Data source memory allocation",
            BuildStage::FunctionsMemoryResolved,
            BuildStage::DataSourcesMemoryResolved,
            |builder| {
                let mut total_bytes = 0u64;
                for source in builder.data.iter_mut() {
                    let sizes = source
                        .signals
                        .iter()
                        .map(|s| s.signal.byte_size.unwrap_or(0));
                    let (offsets, total) = cumulative_offsets(sizes)
                        .ok_or_else(|| overflow(&source.qualified_name, "data source buffer"))?;
                    for (signal, offset) in source.signals.iter_mut().zip(offsets) {
                        signal.offset = Some(offset);
                    }
                    source.size = total;
                    total_bytes += u64::from(total);
                }
                tracing::debug!(
                    "Allocated {} bytes over {} data sources",
                    total_bytes,
                    builder.data.len()
                );
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Range, Signal};
    use crate::types::TypeDescriptor;
    use proptest::prelude::*;

    fn signal(ty: TypeDescriptor, elements: u32) -> FunctionSignal {
        let mut signal = Signal::new("S");
        signal.resolved_type = Some(ty);
        signal.number_of_dimensions = Some(if elements > 1 { 1 } else { 0 });
        signal.number_of_elements = Some(elements);
        FunctionSignal::new(signal)
    }

    #[test]
    fn test_offsets_example() {
        let (offsets, total) = cumulative_offsets([4, 4, 4, 12]).unwrap();
        assert_eq!(offsets, vec![0, 4, 8, 12]);
        assert_eq!(total, 24);
    }

    #[test]
    fn test_offsets_overflow() {
        assert!(cumulative_offsets([u32::MAX, 1]).is_none());
        assert!(cumulative_offsets([u32::MAX]).is_some());
    }

    #[test]
    fn test_size_whole_signal() {
        let mut fs = signal(TypeDescriptor::FLOAT32, 3);
        size_function_signal("GAM1.S", &mut fs).unwrap();
        assert_eq!(fs.memory_size(), 12);
        assert_eq!(fs.windows, vec![RangeWindow { offset: 0, size: 12 }]);
    }

    #[test]
    fn test_size_ranges_and_samples() {
        let mut fs = signal(TypeDescriptor::INT32, 32);
        fs.signal.ranges = Some(vec![Range::new(0, 10), Range::new(15, 20)]);
        fs.signal.samples = Some(2);
        size_function_signal("GAM1.S", &mut fs).unwrap();
        // (11 + 6) elements * 4 bytes * 2 samples
        assert_eq!(fs.memory_size(), 136);
        assert_eq!(
            fs.windows,
            vec![
                RangeWindow { offset: 0, size: 44 },
                RangeWindow { offset: 60, size: 24 },
            ]
        );
    }

    #[test]
    fn test_size_overflow() {
        let mut fs = signal(TypeDescriptor::FLOAT64, u32::MAX / 4);
        let err = size_function_signal("GAM1.S", &mut fs).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::SizeOverflow));
    }

    proptest! {
        #[test]
        fn prop_offsets_are_cumulative(sizes in prop::collection::vec(0u32..4096, 0..64)) {
            let (offsets, total) = cumulative_offsets(sizes.iter().copied()).unwrap();
            prop_assert_eq!(offsets.len(), sizes.len());
            let mut expected = 0u32;
            for (offset, size) in offsets.iter().zip(&sizes) {
                prop_assert_eq!(*offset, expected);
                if *size > 0 {
                    prop_assert!(*offset < total);
                }
                expected += size;
            }
            prop_assert_eq!(total, expected);
        }
    }
}
