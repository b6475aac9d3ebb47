//! Signal database initialisation and flattening stages.

use super::database::{DataSourceSignal, DefaultContribution, Direction, FunctionSignal};
use super::flatten::flatten_signals;
use super::{BuildStage, ConfigurationBuilder};
use crate::error::{BuildError, ErrorKind, Result, ResultExt};
use crate::signal::SignalDeclaration;
use crate::store::{ConfigurationStore, NodeId};
use crate::types::Value;

const CLASS: &str = "Class";
const DEFAULT_DATA_SOURCE: &str = "DefaultDataSource";
const SIGNALS: &str = "Signals";

/// A group holds further functions or data sources, so a node without interior
/// children is always an entry of its own, even an empty one.
fn has_interior_children(store: &ConfigurationStore, node: NodeId) -> bool {
    store.children(node).any(|c| store.is_interior(c))
}

/// A node of the Functions store is a function (rather than a group) when it
/// declares signals or a class, or cannot be a group.
fn is_function(store: &ConfigurationStore, node: NodeId) -> bool {
    store.child(node, Direction::Input.section()).is_some()
        || store.child(node, Direction::Output.section()).is_some()
        || store.read(node, CLASS).is_some()
        || !has_interior_children(store, node)
}

fn is_data_source(store: &ConfigurationStore, node: NodeId) -> bool {
    store.child(node, SIGNALS).is_some()
        || store.read(node, CLASS).is_some()
        || !has_interior_children(store, node)
}

fn read_text(store: &ConfigurationStore, node: NodeId, name: &str) -> Result<Option<String>> {
    match store.read(node, name) {
        None => Ok(None),
        Some(value) => value.as_text().map(|t| Some(t.to_string())).ok_or_else(|| {
            BuildError::new(
                ErrorKind::InvalidAttribute,
                store.path(node),
                format!("{} = {} is not a name", name, value),
            )
        }),
    }
}

/// Declarations below an optional signal-list child
fn declarations(
    store: &ConfigurationStore,
    node: NodeId,
    section: &str,
) -> Result<Vec<SignalDeclaration>> {
    match store.child(node, section) {
        Some(list) => SignalDeclaration::list_from_store(store, list)
            .with_context(|| format!("Reading {}.{}", store.path(node), section)),
        None => Ok(Vec::new()),
    }
}

impl ConfigurationBuilder<'_> {
    /// Stage 1: harvest every function and data source, with ordinals in
    /// discovery order and dot-joined qualified names. Resets any earlier build.
    pub fn initialise_signals_database(
        &mut self,
        functions: &ConfigurationStore,
        data: &ConfigurationStore,
    ) -> Result<()> {
        self.functions.clear();
        self.data.clear();
        self.states.clear();
        self.stage = BuildStage::Created;

        self.run_stage(
            "Signal database initialisation",
            BuildStage::Created,
            BuildStage::SignalsInitialised,
            |builder| {
                builder.add_functions(functions, functions.root(), None)?;
                builder.add_data_sources(data, data.root())?;
                tracing::debug!(
                    "Initialised {} functions and {} data sources",
                    builder.functions.len(),
                    builder.data.len()
                );
                Ok(())
            },
        )
    }

    fn add_functions(
        &mut self,
        store: &ConfigurationStore,
        parent: NodeId,
        inherited_default: Option<&str>,
    ) -> Result<()> {
        for node in store.children(parent) {
            if !store.is_interior(node) {
                continue;
            }
            let own_default = read_text(store, node, DEFAULT_DATA_SOURCE)?;
            let default = own_default.as_deref().or(inherited_default);

            if !is_function(store, node) {
                self.add_functions(store, node, default)?;
                continue;
            }

            let inputs = declarations(store, node, Direction::Input.section())?;
            let outputs = declarations(store, node, Direction::Output.section())?;
            let class = read_text(store, node, CLASS)?;
            let function = self.functions.push(store.path(node));
            function.class = class;
            function.default_data_source = default.map(str::to_string);
            function.inputs.declarations = inputs;
            function.outputs.declarations = outputs;
            tracing::trace!("Function {} = {}", function.id, function.qualified_name);
        }
        Ok(())
    }

    fn add_data_sources(&mut self, store: &ConfigurationStore, parent: NodeId) -> Result<()> {
        for node in store.children(parent) {
            if !store.is_interior(node) {
                continue;
            }
            if !is_data_source(store, node) {
                self.add_data_sources(store, node)?;
                continue;
            }

            let declared = declarations(store, node, SIGNALS)?;
            let class = read_text(store, node, CLASS)?;
            let properties: Vec<(String, Value)> = store
                .children(node)
                .filter(|&c| store.is_leaf(c) && store.name(c) != Some(CLASS))
                .filter_map(|c| Some((store.name(c)?.to_string(), store.value(c)?.clone())))
                .collect();
            let source = self.data.push(store.path(node));
            source.class = class;
            source.declarations = declared;
            source.properties = properties;
            tracing::trace!("Data source {} = {}", source.id, source.qualified_name);
        }
        Ok(())
    }

    /// Stage 2: flatten the declarations of every function and data source.
    pub fn flatten_signals_databases(&mut self) -> Result<()> {
        self.run_stage(
            "Signal flattening",
            BuildStage::SignalsInitialised,
            BuildStage::SignalsFlattened,
            |builder| {
                let types = builder.types;
                let max_depth = builder.settings.max_struct_depth;

                for function in builder.functions.iter_mut() {
                    for direction in Direction::ALL {
                        let declared = &function.set(direction).declarations;
                        let signals = flatten_signals(declared, types, max_depth)
                            .with_context(|| {
                                format!("{}.{}", function.qualified_name, direction)
                            })?;
                        function.set_mut(direction).signals =
                            signals.into_iter().map(FunctionSignal::new).collect();
                    }
                }

                for source in builder.data.iter_mut() {
                    let signals = flatten_signals(&source.declarations, types, max_depth)
                        .with_context(|| source.qualified_name.clone())?;
                    let origin = source.qualified_name.clone();
                    source.signals = signals
                        .into_iter()
                        .map(|signal| {
                            let mut entry = DataSourceSignal::new(signal);
                            if let Some(value) = entry.signal.default.clone() {
                                entry.defaults.push(DefaultContribution {
                                    origin: origin.clone(),
                                    value,
                                });
                            }
                            entry
                        })
                        .collect();
                }

                tracing::debug!(
                    "Flattened into {} function signals and {} data-source signals",
                    builder.functions.signal_count(),
                    builder.data.signal_count()
                );
                Ok(())
            },
        )
    }
}
