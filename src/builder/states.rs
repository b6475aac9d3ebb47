//! Execution state resolution stage.
//!
//! A States store is laid out as
//!
//! ```text
//! <State>.Threads.<Thread>.Functions = { GAM1 Group1.GAM2 }
//! <State>.Threads.<Thread>.CPUs      = 0x1          (optional)
//! ```
//!
//! Function names may be fully qualified or any unambiguous dotted suffix.

use super::database::{Direction, ExecutionState, SignalRef, Thread};
use super::id::FunctionId;
use super::{BuildStage, ConfigurationBuilder, FunctionsDatabase};
use crate::error::{BuildError, ErrorKind, Result, ResultExt};
use crate::store::{ConfigurationStore, NodeId};
use std::collections::HashSet;

const THREADS: &str = "Threads";
const FUNCTIONS: &str = "Functions";
const CPUS: &str = "CPUs";

fn resolve_thread(
    store: &ConfigurationStore,
    node: NodeId,
    state: &str,
    functions: &FunctionsDatabase,
    scheduled: &mut HashSet<FunctionId>,
) -> Result<Thread> {
    let name = store.name(node).unwrap_or("").to_string();
    let path = format!("{}.{}", state, name);
    let names = store
        .read(node, FUNCTIONS)
        .and_then(|v| v.as_text_list())
        .filter(|names| !names.is_empty())
        .ok_or_else(|| {
            BuildError::new(
                ErrorKind::MissingRequiredAttribute,
                &path,
                "thread has no Functions",
            )
        })?;

    let mut thread = Thread {
        name,
        functions: Vec::with_capacity(names.len()),
        cpus: store.read(node, CPUS).cloned(),
        sync_signal: None,
    };

    for function_name in names {
        let id = functions
            .find(function_name)
            .with_context(|| path.clone())?;
        if !scheduled.insert(id) {
            return Err(BuildError::new(
                ErrorKind::DuplicateFunctionInState,
                function_name,
                format!("function appears more than once in state {}", state),
            ));
        }
        thread.functions.push(id);

        let Some(function) = functions.get(id) else {
            continue;
        };
        for (index, fs) in function.signals(Direction::Input).iter().enumerate() {
            if !fs.signal.is_sync() {
                continue;
            }
            let candidate = SignalRef {
                function: id,
                direction: Direction::Input,
                signal: index,
            };
            if let Some(existing) = thread.sync_signal {
                return Err(BuildError::new(
                    ErrorKind::MultipleSyncSignalsInThread,
                    &path,
                    format!(
                        "{} and {} both declare a Frequency",
                        describe(functions, existing),
                        describe(functions, candidate)
                    ),
                ));
            }
            thread.sync_signal = Some(candidate);
        }
    }
    Ok(thread)
}

fn describe(functions: &FunctionsDatabase, r: SignalRef) -> String {
    functions
        .get(r.function)
        .map(|f| f.signal_path(r.direction, r.signal))
        .unwrap_or_else(|| format!("{:?}", r))
}

impl ConfigurationBuilder<'_> {
    /// Stage 7: build every execution state from the States store, replacing
    /// whatever an earlier run produced.
    pub fn resolve_states(&mut self, states: &ConfigurationStore) -> Result<()> {
        self.run_stage(
            "State resolution",
            BuildStage::FunctionSignalsVerified,
            BuildStage::StatesResolved,
            |builder| {
                builder.states.clear();
                for function in builder.functions.iter_mut() {
                    function.states.clear();
                }

                for state_node in states.children(states.root()) {
                    if !states.is_interior(state_node) {
                        continue;
                    }
                    let state_name = states.name(state_node).unwrap_or("").to_string();
                    let threads = states
                        .child(state_node, THREADS)
                        .filter(|&t| states.child_count(t) > 0)
                        .ok_or_else(|| {
                            BuildError::new(
                                ErrorKind::MissingRequiredAttribute,
                                &state_name,
                                "state has no Threads",
                            )
                        })?;

                    let mut scheduled = HashSet::new();
                    let mut state = ExecutionState {
                        name: state_name.clone(),
                        threads: Vec::new(),
                    };
                    for thread_node in states.children(threads) {
                        let thread = resolve_thread(
                            states,
                            thread_node,
                            &state_name,
                            &builder.functions,
                            &mut scheduled,
                        )?;
                        state.threads.push(thread);
                    }

                    for thread in &state.threads {
                        for &id in &thread.functions {
                            if let Some(function) = builder.functions.get_mut(id) {
                                function
                                    .states
                                    .push((state_name.clone(), thread.name.clone()));
                            }
                        }
                    }
                    tracing::debug!(
                        "State {}: {} threads, {} functions",
                        state.name,
                        state.threads.len(),
                        scheduled.len()
                    );
                    builder.states.push(state);
                }

                if builder.settings.warn_unscheduled_functions {
                    for function in builder.functions.iter() {
                        if function.states.is_empty() {
                            tracing::warn!(
                                "Function {} does not take part in any state",
                                function.qualified_name
                            );
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
    use crate::builder::FunctionSignal;
    use crate::signal::Signal;

    fn timed_input(name: &str, frequency: Option<f64>) -> FunctionSignal {
        let mut signal = Signal::new(name);
        signal.frequency = frequency;
        FunctionSignal::new(signal)
    }

    fn functions() -> FunctionsDatabase {
        let mut functions = FunctionsDatabase::new();
        functions
            .push("GAM1")
            .inputs
            .signals
            .push(timed_input("Counter", Some(1000.0)));
        functions.push("GAM2").inputs.signals.push(timed_input("In", None));
        let twice = functions.push("GAM3");
        twice.inputs.signals.push(timed_input("A", Some(1000.0)));
        twice.inputs.signals.push(timed_input("B", Some(500.0)));
        functions
    }

    fn thread_node(store: &ConfigurationStore, path: &str) -> NodeId {
        store.resolve(path).unwrap()
    }

    #[test]
    fn test_thread_sync_signal() {
        let mut store = ConfigurationStore::new();
        store.set("Run.Threads.T1.Functions", vec!["GAM2", "GAM1"]).unwrap();
        store.set("Run.Threads.T1.CPUs", 2u32).unwrap();
        let functions = functions();
        let mut scheduled = HashSet::new();

        let node = thread_node(&store, "Run.Threads.T1");
        let thread = resolve_thread(&store, node, "Run", &functions, &mut scheduled).unwrap();
        assert_eq!(thread.name, "T1");
        assert_eq!(thread.functions, vec![FunctionId(1), FunctionId(0)]);
        assert_eq!(thread.cpus, Some(crate::types::Value::from(2u32)));
        assert_eq!(
            thread.sync_signal,
            Some(SignalRef {
                function: FunctionId(0),
                direction: Direction::Input,
                signal: 0,
            })
        );
    }

    #[test]
    fn test_thread_without_functions() {
        let mut store = ConfigurationStore::new();
        store.set("Run.Threads.T1.Functions", Vec::<&str>::new()).unwrap();
        store.set("Run.Threads.T2.CPUs", 1u32).unwrap();
        let functions = functions();

        for path in ["Run.Threads.T1", "Run.Threads.T2"] {
            let node = thread_node(&store, path);
            let err = resolve_thread(&store, node, "Run", &functions, &mut HashSet::new())
                .unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::MissingRequiredAttribute), "{}", path);
        }
    }

    #[test]
    fn test_function_in_two_threads_of_one_state() {
        let mut store = ConfigurationStore::new();
        store.set("Run.Threads.T1.Functions", vec!["GAM2"]).unwrap();
        store.set("Run.Threads.T2.Functions", vec!["GAM2"]).unwrap();
        let functions = functions();
        let mut scheduled = HashSet::new();

        let first = thread_node(&store, "Run.Threads.T1");
        resolve_thread(&store, first, "Run", &functions, &mut scheduled).unwrap();
        let second = thread_node(&store, "Run.Threads.T2");
        let err = resolve_thread(&store, second, "Run", &functions, &mut scheduled).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DuplicateFunctionInState));

        // Another state starts from an empty schedule
        resolve_thread(&store, second, "Idle", &functions, &mut HashSet::new()).unwrap();
    }

    #[test]
    fn test_two_frequencies_in_one_function() {
        let mut store = ConfigurationStore::new();
        store.set("Run.Threads.T1.Functions", vec!["GAM3"]).unwrap();
        let functions = functions();

        let node = thread_node(&store, "Run.Threads.T1");
        let err =
            resolve_thread(&store, node, "Run", &functions, &mut HashSet::new()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MultipleSyncSignalsInThread));
        assert!(err.to_string().contains("GAM3.A"));
    }
}
