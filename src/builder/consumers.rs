//! Consumer and producer resolution stages.
//!
//! Every data-source signal records, per execution state, which function signals
//! read it (consumers) and which write it (producers). Two producers of the same
//! signal in the same state are only accepted when both declare `Ranges` and the
//! ranges are disjoint.

use super::database::{Direction, SignalRef};
use super::{BuildStage, ConfigurationBuilder, FunctionsDatabase};
use crate::error::{BuildError, ErrorKind, Result};
use crate::signal::ranges_intersect;

/// Check that no two producers of one state write the same element
fn verify_producers(
    functions: &FunctionsDatabase,
    signal: &str,
    state: &str,
    producers: &[SignalRef],
) -> Result<()> {
    for (i, first) in producers.iter().enumerate() {
        for second in &producers[i + 1..] {
            let (Some(a), Some(b)) = (functions.signal(*first), functions.signal(*second)) else {
                continue;
            };
            let path = |r: &SignalRef| {
                functions
                    .get(r.function)
                    .map(|f| f.signal_path(r.direction, r.signal))
                    .unwrap_or_default()
            };

            match (&a.signal.ranges, &b.signal.ranges) {
                (Some(ra), Some(rb)) => {
                    if ranges_intersect(ra, rb) {
                        return Err(BuildError::new(
                            ErrorKind::RangeOverlap,
                            signal,
                            format!(
                                "{} and {} write overlapping ranges in state {}",
                                path(first),
                                path(second),
                                state
                            ),
                        ));
                    }
                }
                _ => {
                    return Err(BuildError::new(
                        ErrorKind::DuplicateWriter,
                        signal,
                        format!(
                            "{} and {} both write it in state {}",
                            path(first),
                            path(second),
                            state
                        ),
                    ))
                }
            }
        }
    }
    Ok(())
}

impl ConfigurationBuilder<'_> {
    /// Stage 8a: record the readers and writers of every data-source signal per
    /// state.
    pub fn resolve_consumers_and_producers(&mut self) -> Result<()> {
        self.run_stage(
            "Consumer/producer resolution",
            BuildStage::StatesResolved,
            BuildStage::ConsumersResolved,
            |builder| {
                for source in builder.data.iter_mut() {
                    for signal in source.signals.iter_mut() {
                        signal.states.clear();
                    }
                }

                let mut links = 0usize;
                for state in &builder.states {
                    for id in state.functions() {
                        let Some(function) = builder.functions.get(id) else {
                            continue;
                        };
                        for direction in Direction::ALL {
                            for (index, fs) in function.signals(direction).iter().enumerate() {
                                let Some(binding) = fs.binding else {
                                    continue;
                                };
                                let Some(target) = builder.data.signal_mut(binding) else {
                                    continue;
                                };
                                let r = SignalRef {
                                    function: id,
                                    direction,
                                    signal: index,
                                };
                                let usage = target.usage_mut(&state.name);
                                match direction {
                                    Direction::Input => usage.consumers.push(r),
                                    Direction::Output => usage.producers.push(r),
                                }
                                links += 1;
                            }
                        }
                    }
                }
                tracing::debug!(
                    "Recorded {} consumer/producer links over {} states",
                    links,
                    builder.states.len()
                );
                Ok(())
            },
        )
    }

    /// Stage 8b: a data-source signal has at most one unranged writer per state,
    /// and ranged writers never overlap.
    pub fn verify_consumers_and_producers(&mut self) -> Result<()> {
        self.run_stage(
            "Consumer/producer verification",
            BuildStage::ConsumersResolved,
            BuildStage::ConsumersVerified,
            |builder| {
                for source in builder.data.iter() {
                    for signal in &source.signals {
                        let name = format!(
                            "{}.{}",
                            source.qualified_name, signal.signal.qualified_name
                        );
                        for usage in &signal.states {
                            verify_producers(
                                &builder.functions,
                                &name,
                                &usage.state,
                                &usage.producers,
                            )?;
                            if usage.producers.is_empty() && !usage.consumers.is_empty() {
                                tracing::trace!(
                                    "{} is read in {} without a producer",
                                    name,
                                    usage.state
                                );
                            }
                        }
                    }
                }
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::id::FunctionId;
    use crate::builder::FunctionSignal;
    use crate::signal::{Range, Signal};

    fn writers(ranges: &[Option<Vec<Range>>]) -> (FunctionsDatabase, Vec<SignalRef>) {
        let mut functions = FunctionsDatabase::new();
        let mut refs = Vec::new();
        for (i, r) in ranges.iter().enumerate() {
            let function = functions.push(format!("GAM{}", i + 1));
            let mut signal = Signal::new("S");
            signal.ranges = r.clone();
            function.outputs.signals.push(FunctionSignal::new(signal));
            refs.push(SignalRef {
                function: FunctionId(i as u32),
                direction: Direction::Output,
                signal: 0,
            });
        }
        (functions, refs)
    }

    #[test]
    fn test_single_writer() {
        let (functions, refs) = writers(&[None]);
        verify_producers(&functions, "DDB1.S", "Run", &refs).unwrap();
    }

    #[test]
    fn test_duplicate_writer() {
        let (functions, refs) = writers(&[None, Some(vec![Range::new(0, 3)])]);
        let err = verify_producers(&functions, "DDB1.S", "Run", &refs).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DuplicateWriter));
        assert!(err.to_string().contains("GAM1.S"));
    }

    #[test]
    fn test_disjoint_ranges() {
        let (functions, refs) = writers(&[
            Some(vec![Range::new(0, 10), Range::new(15, 20)]),
            Some(vec![Range::new(11, 14), Range::new(21, 31)]),
        ]);
        verify_producers(&functions, "DDB1.S", "Run", &refs).unwrap();
    }

    #[test]
    fn test_overlapping_ranges() {
        let (functions, refs) = writers(&[
            Some(vec![Range::new(0, 10), Range::new(15, 20)]),
            Some(vec![Range::new(11, 14), Range::new(20, 31)]),
        ]);
        let err = verify_producers(&functions, "DDB1.S", "Run", &refs).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RangeOverlap));
    }
}
