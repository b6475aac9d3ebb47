//! Configuration builder pipeline.
//!
//! The builder turns the Functions, Data and States stores of an application into
//! flattened, typed, offset-assigned and broker-annotated databases. It runs as a
//! strictly sequential list of stages, each one short-circuiting on the first
//! invalid configuration it detects:
//!
//! ```text
//! initialise_signals_database        harvest functions, data sources, declarations
//! flatten_signals_databases          expand namespaces and struct types into leaves
//! resolve_data_sources               bind function signals, merge data-source signals
//! verify_data_sources_signals        concrete type/shape, byte size, defaults
//! resolve_function_signals           copy resolved attributes back to functions
//! verify_function_signals            concreteness, agreement, ranges
//! resolve_states                     states, threads, sync signals
//! resolve_consumers_and_producers    readers/writers per state
//! verify_consumers_and_producers     single writer or disjoint ranges
//! resolve_function_signals_memory_size
//! resolve_functions_memory           private buffer offsets
//! resolve_data_sources_memory        shared buffer offsets
//! assign_brokers_to_functions        transport adapter per signal
//! ```
//!
//! Every stage is callable on its own, in order. A stage called out of order fails
//! with [`ErrorKind::StageOrder`]; a failed stage leaves the builder unusable until
//! it is initialised again.

mod brokers;
mod consumers;
mod data_sources;
pub mod database;
mod export;
pub mod flatten;
mod function_signals;
pub mod id;
mod initialise;
mod memory;
mod states;

pub use brokers::{BrokerProvider, BrokerRegistry, MemoryMapBrokers};
pub use database::{
    BrokerGroup, DataDatabase, DataSource, DataSourceSignal, Direction, ExecutionState,
    Function, FunctionSignal, FunctionsDatabase, RangeWindow, SignalBinding, SignalRef, Thread,
};
pub use export::MemoryEntry;
pub use id::{DataSourceId, FunctionId};

use crate::config::BuilderSettings;
use crate::error::{BuildError, ErrorKind, Result, ResultExt};
use crate::registry::TypeRegistry;
use crate::store::ConfigurationStore;

/// Last stage the builder completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    Created,
    SignalsInitialised,
    SignalsFlattened,
    DataSourcesResolved,
    DataSourcesVerified,
    FunctionSignalsResolved,
    FunctionSignalsVerified,
    StatesResolved,
    ConsumersResolved,
    ConsumersVerified,
    MemorySizesResolved,
    FunctionsMemoryResolved,
    DataSourcesMemoryResolved,
    BrokersAssigned,
    /// A stage failed; only initialisation is accepted
    Failed,
}

/// Result of a complete build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub functions: FunctionsDatabase,
    pub data: DataDatabase,
    pub states: Vec<ExecutionState>,
}

impl BuildOutput {
    /// Total bytes over every function buffer and data-source buffer
    pub fn total_bytes(&self) -> u64 {
        let functions: u64 = self
            .functions
            .iter()
            .map(|f| u64::from(f.inputs.memory.size) + u64::from(f.outputs.memory.size))
            .sum();
        let data: u64 = self.data.iter().map(|d| u64::from(d.size)).sum();
        functions + data
    }
}

/// The staged configuration builder
pub struct ConfigurationBuilder<'a> {
    types: &'a TypeRegistry,
    brokers: &'a BrokerRegistry,
    settings: BuilderSettings,
    functions: FunctionsDatabase,
    data: DataDatabase,
    states: Vec<ExecutionState>,
    stage: BuildStage,
}

impl<'a> ConfigurationBuilder<'a> {
    pub fn new(
        types: &'a TypeRegistry,
        brokers: &'a BrokerRegistry,
        settings: BuilderSettings,
    ) -> Self {
        Self {
            types,
            brokers,
            settings,
            functions: FunctionsDatabase::new(),
            data: DataDatabase::new(),
            states: Vec::new(),
            stage: BuildStage::Created,
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    pub fn functions(&self) -> &FunctionsDatabase {
        &self.functions
    }

    pub fn data(&self) -> &DataDatabase {
        &self.data
    }

    pub fn states(&self) -> &[ExecutionState] {
        &self.states
    }

    /// Run every stage and hand over the resolved databases.
    ///
    /// # Arguments
    /// * `functions` - Store whose root children are functions or function groups
    /// * `data` - Store whose root children are data sources or data-source groups
    /// * `states` - Store whose root children are execution states
    pub fn build(
        mut self,
        functions: &ConfigurationStore,
        data: &ConfigurationStore,
        states: &ConfigurationStore,
    ) -> Result<BuildOutput> {
        self.initialise_signals_database(functions, data)?;
        self.flatten_signals_databases()?;
        self.resolve_data_sources()?;
        self.verify_data_sources_signals()?;
        self.resolve_function_signals()?;
        self.verify_function_signals()?;
        self.resolve_states(states)?;
        self.resolve_consumers_and_producers()?;
        self.verify_consumers_and_producers()?;
        self.resolve_function_signals_memory_size()?;
        self.resolve_functions_memory()?;
        self.resolve_data_sources_memory()?;
        self.assign_brokers_to_functions()?;

        let output = self.into_output()?;
        tracing::info!(
            "Built {} functions ({} signals), {} data sources ({} signals), {} states, {} bytes",
            output.functions.len(),
            output.functions.signal_count(),
            output.data.len(),
            output.data.signal_count(),
            output.states.len(),
            output.total_bytes()
        );
        Ok(output)
    }

    /// Hand over the databases once every stage has completed
    pub fn into_output(self) -> Result<BuildOutput> {
        if self.stage != BuildStage::BrokersAssigned {
            return Err(BuildError::new(
                ErrorKind::StageOrder,
                "build",
                format!("build is incomplete, last stage was {:?}", self.stage),
            ));
        }
        Ok(BuildOutput {
            functions: self.functions,
            data: self.data,
            states: self.states,
        })
    }

    /// Run one stage: check ordering, open a span, add the stage name as context.
    fn run_stage<F>(
        &mut self,
        name: &'static str,
        required: BuildStage,
        completed: BuildStage,
        stage: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if self.stage != required {
            return Err(BuildError::new(
                ErrorKind::StageOrder,
                name,
                format!(
                    "requires {:?} to have completed, builder is at {:?}",
                    required, self.stage
                ),
            ));
        }

        let span = tracing::debug_span!("stage", stage = name);
        let _enter = span.enter();
        match stage(self).context(name) {
            Ok(()) => {
                self.stage = completed;
                Ok(())
            }
            Err(e) => {
                tracing::debug!("{} failed: {}", name, e);
                self.stage = BuildStage::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> (ConfigurationStore, ConfigurationStore, ConfigurationStore) {
        let mut functions = ConfigurationStore::new();
        functions.set("GAM1.InputSignals.In.Type", "uint32").unwrap();
        functions.set("GAM1.OutputSignals.Out.Type", "float32").unwrap();
        let mut data = ConfigurationStore::new();
        data.set("DDB1.Class", "GAMDataSource").unwrap();
        let mut states = ConfigurationStore::new();
        states
            .set("Running.Threads.Thread1.Functions", vec!["GAM1"])
            .unwrap();
        (functions, data, states)
    }

    #[test]
    fn test_stage_order_enforced() {
        let types = TypeRegistry::new();
        let brokers = BrokerRegistry::new();
        let mut builder = ConfigurationBuilder::new(&types, &brokers, BuilderSettings::default());
        let err = builder.resolve_data_sources().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::StageOrder));
        assert_eq!(builder.stage(), BuildStage::Created);
    }

    #[test]
    fn test_failed_stage_requires_reinitialise() {
        let types = TypeRegistry::new();
        let brokers = BrokerRegistry::new();
        let (functions, data, _) = stores();
        // No default data source: resolution fails
        let mut builder = ConfigurationBuilder::new(&types, &brokers, BuilderSettings::default());
        builder.initialise_signals_database(&functions, &data).unwrap();
        builder.flatten_signals_databases().unwrap();
        let err = builder.resolve_data_sources().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MissingRequiredAttribute));
        assert_eq!(builder.stage(), BuildStage::Failed);

        let err = builder.verify_data_sources_signals().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::StageOrder));
        builder.initialise_signals_database(&functions, &data).unwrap();
        assert_eq!(builder.stage(), BuildStage::SignalsInitialised);
    }

    #[test]
    fn test_build_runs_every_stage() {
        let types = TypeRegistry::new();
        let brokers = BrokerRegistry::new();
        let (functions, data, states) = stores();
        let settings = BuilderSettings::default().with_default_data_source("DDB1");
        let output = ConfigurationBuilder::new(&types, &brokers, settings)
            .build(&functions, &data, &states)
            .unwrap();
        assert_eq!(output.functions.len(), 1);
        assert_eq!(output.data.signal_count(), 2);
        assert_eq!(output.states.len(), 1);
        // 4 + 4 bytes private, 4 + 4 bytes shared
        assert_eq!(output.total_bytes(), 16);
    }

    #[test]
    fn test_into_output_requires_complete_build() {
        let types = TypeRegistry::new();
        let brokers = BrokerRegistry::new();
        let builder = ConfigurationBuilder::new(&types, &brokers, BuilderSettings::default());
        let err = builder.into_output().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::StageOrder));
    }
}
