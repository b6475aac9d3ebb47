//! Export of the resolved databases as hierarchical stores.
//!
//! Functions and data sources are emitted under their ordinals so that qualified
//! names containing dots survive as plain `QualifiedName` leaves:
//!
//! ```text
//! Functions.0.QualifiedName = "Group1.GAM2"
//! Functions.0.Signals.InputSignals.0.{QualifiedName, Type, ByteOffset, Broker, ...}
//! Functions.0.Memory.InputSignals.{ByteSize, DataSources.DDB1}
//! Data.0.Signals.0.States.Running.{GAMConsumers, GAMProducers}
//! States.Running.Threads.Thread1.{Functions, CPUs, SyncSignal}
//! ```

use super::database::{Direction, FunctionSignal, SignalRef};
use super::{BuildOutput, FunctionsDatabase};
use crate::error::Result;
use crate::signal::{attr, Signal};
use crate::store::{ConfigurationStore, NodeId, NodeKind, StoreResult};
use crate::types::{Scalar, Value};
use std::fmt;

/// One row of the flat memory table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    /// Qualified name of the function or data source owning the buffer
    pub owner: String,
    /// `None` for data-source buffers
    pub direction: Option<Direction>,
    pub signal: String,
    pub offset: u32,
    pub size: u32,
}

impl fmt::Display for MemoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Some(direction) => write!(f, "{}.{}", self.owner, direction)?,
            None => write!(f, "{}", self.owner)?,
        }
        write!(
            f,
            " {} @ {} ({} bytes)",
            self.signal, self.offset, self.size
        )
    }
}

fn interior(store: &mut ConfigurationStore, parent: NodeId, name: &str) -> StoreResult<NodeId> {
    match store.child(parent, name) {
        Some(existing) => Ok(existing),
        None => store.create_node(parent, name, NodeKind::Interior),
    }
}

fn signal_ref_path(functions: &FunctionsDatabase, r: SignalRef) -> String {
    functions
        .get(r.function)
        .map(|f| f.signal_path(r.direction, r.signal))
        .unwrap_or_default()
}

/// Leaves shared by function and data-source signals
fn write_signal(store: &mut ConfigurationStore, node: NodeId, signal: &Signal) -> StoreResult<()> {
    store.write(node, attr::QUALIFIED_NAME, signal.qualified_name.as_str())?;
    if let Some(type_name) = &signal.type_name {
        store.write(node, attr::TYPE, type_name.as_str())?;
    }
    if let Some(full_type) = &signal.full_type {
        store.write(node, attr::FULL_TYPE, full_type.as_str())?;
    }
    if let Some(dims) = signal.number_of_dimensions {
        store.write(node, attr::NUMBER_OF_DIMENSIONS, u32::from(dims))?;
    }
    if let Some(elements) = signal.number_of_elements {
        store.write(node, attr::NUMBER_OF_ELEMENTS, elements)?;
    }
    if let Some(size) = signal.byte_size {
        store.write(node, attr::BYTE_SIZE, size)?;
    }
    if let Some(data_source) = &signal.data_source {
        store.write(node, attr::DATA_SOURCE, data_source.as_str())?;
    }
    if let Some(alias) = &signal.alias {
        store.write(node, attr::ALIAS, alias.as_str())?;
    }
    if let Some(samples) = signal.samples {
        store.write(node, attr::SAMPLES, samples)?;
    }
    if let Some(frequency) = signal.frequency {
        store.write(node, attr::FREQUENCY, frequency)?;
    }
    if signal.trigger {
        store.write(node, attr::TRIGGER, 1u32)?;
    }
    if let Some(ranges) = &signal.ranges {
        let rows = ranges
            .iter()
            .map(|r| vec![Scalar::UInt(u64::from(r.min)), Scalar::UInt(u64::from(r.max))])
            .collect();
        store.write(node, attr::RANGES, Value::Matrix(rows))?;
    }
    if let Some(default) = &signal.default {
        store.write(node, attr::DEFAULT, default.clone())?;
    }
    for (key, value) in &signal.properties {
        store.write(node, key, value.clone())?;
    }
    Ok(())
}

fn write_function_signal(
    store: &mut ConfigurationStore,
    node: NodeId,
    fs: &FunctionSignal,
) -> StoreResult<()> {
    write_signal(store, node, &fs.signal)?;
    if let Some(offset) = fs.offset {
        store.write(node, attr::BYTE_OFFSET, offset)?;
    }
    if !fs.windows.is_empty() {
        let rows = fs
            .windows
            .iter()
            .map(|w| vec![Scalar::UInt(u64::from(w.offset)), Scalar::UInt(u64::from(w.size))])
            .collect();
        store.write(node, attr::RANGE_WINDOWS, Value::Matrix(rows))?;
    }
    if let Some(broker) = &fs.broker {
        store.write(node, attr::BROKER, broker.as_str())?;
    }
    Ok(())
}

impl BuildOutput {
    /// Resolved Functions database as a store
    pub fn functions_store(&self) -> Result<ConfigurationStore> {
        let mut store = ConfigurationStore::new();
        let root = interior(&mut store, ConfigurationStore::ROOT, "Functions")?;

        for function in self.functions.iter() {
            let node = interior(&mut store, root, &function.id.to_string())?;
            store.write(node, attr::QUALIFIED_NAME, function.qualified_name.as_str())?;
            if let Some(class) = &function.class {
                store.write(node, "Class", class.as_str())?;
            }
            if !function.states.is_empty() {
                let states = interior(&mut store, node, "States")?;
                for (state, thread) in &function.states {
                    store.write(states, state, thread.as_str())?;
                }
            }

            for direction in Direction::ALL {
                let set = function.set(direction);
                let signals = store.create_path_from(node, "Signals")?;
                let signals = interior(&mut store, signals, direction.section())?;
                for (index, fs) in set.signals.iter().enumerate() {
                    let signal = interior(&mut store, signals, &index.to_string())?;
                    write_function_signal(&mut store, signal, fs)?;
                }

                let memory = store.create_path_from(node, "Memory")?;
                let memory = interior(&mut store, memory, direction.section())?;
                store.write(memory, attr::BYTE_SIZE, set.memory.size)?;
                if !set.memory.data_sources.is_empty() {
                    let per_source = interior(&mut store, memory, "DataSources")?;
                    for (id, bytes) in &set.memory.data_sources {
                        let name = self
                            .data
                            .get(*id)
                            .map(|d| d.qualified_name.clone())
                            .unwrap_or_else(|| id.to_string());
                        store.write(per_source, &name, *bytes)?;
                    }
                }

                if !set.brokers.is_empty() {
                    let brokers = store.create_path_from(node, "Brokers")?;
                    let brokers = interior(&mut store, brokers, direction.section())?;
                    for (index, group) in set.brokers.iter().enumerate() {
                        let entry = interior(&mut store, brokers, &index.to_string())?;
                        store.write(entry, attr::BROKER, group.broker.as_str())?;
                        if let Some(source) = self.data.get(group.data_source) {
                            store.write(entry, "DataSource", source.qualified_name.as_str())?;
                        }
                        let names: Vec<String> = group
                            .signals
                            .iter()
                            .filter_map(|&i| set.signals.get(i))
                            .map(|fs| fs.signal.qualified_name.clone())
                            .collect();
                        store.write(entry, "Signals", names)?;
                    }
                }
            }
        }
        Ok(store)
    }

    /// Resolved Data database as a store
    pub fn data_store(&self) -> Result<ConfigurationStore> {
        let mut store = ConfigurationStore::new();
        let root = interior(&mut store, ConfigurationStore::ROOT, "Data")?;

        for source in self.data.iter() {
            let node = interior(&mut store, root, &source.id.to_string())?;
            // Computed leaves go last so they win over same-named properties
            for (key, value) in &source.properties {
                store.write(node, key, value.clone())?;
            }
            store.write(node, attr::QUALIFIED_NAME, source.qualified_name.as_str())?;
            if let Some(class) = &source.class {
                store.write(node, "Class", class.as_str())?;
            }
            store.write(node, attr::BYTE_SIZE, source.size)?;

            let signals = interior(&mut store, node, "Signals")?;
            for (index, entry) in source.signals.iter().enumerate() {
                let signal = interior(&mut store, signals, &index.to_string())?;
                write_signal(&mut store, signal, &entry.signal)?;
                if let Some(offset) = entry.offset {
                    store.write(signal, attr::BYTE_OFFSET, offset)?;
                }
                if entry.states.is_empty() {
                    continue;
                }
                let states = interior(&mut store, signal, "States")?;
                for usage in &entry.states {
                    let state = interior(&mut store, states, &usage.state)?;
                    let consumers: Vec<String> = usage
                        .consumers
                        .iter()
                        .map(|r| signal_ref_path(&self.functions, *r))
                        .collect();
                    let producers: Vec<String> = usage
                        .producers
                        .iter()
                        .map(|r| signal_ref_path(&self.functions, *r))
                        .collect();
                    store.write(state, "GAMConsumers", consumers)?;
                    store.write(state, "GAMProducers", producers)?;
                }
            }
        }
        Ok(store)
    }

    /// Resolved execution states as a store
    pub fn states_store(&self) -> Result<ConfigurationStore> {
        let mut store = ConfigurationStore::new();
        let root = interior(&mut store, ConfigurationStore::ROOT, "States")?;

        for state in &self.states {
            let node = interior(&mut store, root, &state.name)?;
            let threads = interior(&mut store, node, "Threads")?;
            for thread in &state.threads {
                let entry = interior(&mut store, threads, &thread.name)?;
                let names: Vec<String> = thread
                    .functions
                    .iter()
                    .filter_map(|&id| self.functions.get(id))
                    .map(|f| f.qualified_name.clone())
                    .collect();
                store.write(entry, "Functions", names)?;
                if let Some(cpus) = &thread.cpus {
                    store.write(entry, "CPUs", cpus.clone())?;
                }
                if let Some(sync) = thread.sync_signal {
                    store.write(
                        entry,
                        attr::SYNC_SIGNAL,
                        signal_ref_path(&self.functions, sync),
                    )?;
                }
            }
        }
        Ok(store)
    }

    /// Every function and data-source buffer slot, in allocation order
    pub fn memory_table(&self) -> Vec<MemoryEntry> {
        let mut table = Vec::new();
        for function in self.functions.iter() {
            for direction in Direction::ALL {
                for fs in function.signals(direction) {
                    table.push(MemoryEntry {
                        owner: function.qualified_name.clone(),
                        direction: Some(direction),
                        signal: fs.signal.qualified_name.clone(),
                        offset: fs.offset.unwrap_or(0),
                        size: fs.memory_size(),
                    });
                }
            }
        }
        for source in self.data.iter() {
            for entry in &source.signals {
                table.push(MemoryEntry {
                    owner: source.qualified_name.clone(),
                    direction: None,
                    signal: entry.signal.qualified_name.clone(),
                    offset: entry.offset.unwrap_or(0),
                    size: entry.signal.byte_size.unwrap_or(0),
                });
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::database::{DataSourceSignal, RangeWindow};
    use crate::builder::DataDatabase;
    use crate::builder::id::FunctionId;
    use crate::signal::Range;

    fn output() -> BuildOutput {
        let mut functions = FunctionsDatabase::new();
        let function = functions.push("Group1.GAM1");
        let mut signal = Signal::new("S");
        signal.type_name = Some("uint16".into());
        signal.number_of_elements = Some(4);
        signal.byte_size = Some(4);
        signal.data_source = Some("DDB1".into());
        signal.ranges = Some(vec![Range::new(1, 2)]);
        let mut fs = FunctionSignal::new(signal.clone());
        fs.offset = Some(0);
        fs.windows = vec![RangeWindow { offset: 2, size: 4 }];
        fs.broker = Some("MemoryMapOutputBroker".into());
        function.outputs.signals.push(fs);
        function.outputs.memory.size = 4;

        let mut data = DataDatabase::new();
        let source = data.push("DDB1");
        source.size = 8;
        source.properties = vec![
            (attr::BYTE_SIZE.to_string(), Value::from(99u32)),
            ("HeapName".to_string(), Value::from("Default")),
        ];
        signal.byte_size = Some(8);
        signal.ranges = None;
        let mut entry = DataSourceSignal::new(signal);
        entry.offset = Some(0);
        entry.usage_mut("Run").producers.push(SignalRef {
            function: FunctionId(0),
            direction: Direction::Output,
            signal: 0,
        });
        source.signals.push(entry);

        BuildOutput {
            functions,
            data,
            states: Vec::new(),
        }
    }

    #[test]
    fn test_function_signal_leaves() {
        let store = output().functions_store().unwrap();
        let leaf = |path: &str| store.get(&format!("Functions.0.{}", path)).cloned();
        assert_eq!(leaf("QualifiedName"), Some(Value::from("Group1.GAM1")));
        assert_eq!(leaf("Signals.OutputSignals.0.QualifiedName"), Some(Value::from("S")));
        assert_eq!(leaf("Signals.OutputSignals.0.ByteOffset"), Some(Value::from(0u32)));
        assert_eq!(leaf("Signals.OutputSignals.0.ByteSize"), Some(Value::from(4u32)));
        assert_eq!(
            leaf("Signals.OutputSignals.0.Broker"),
            Some(Value::from("MemoryMapOutputBroker"))
        );
        assert_eq!(
            leaf("Signals.OutputSignals.0.RangeWindows"),
            Some(Value::Matrix(vec![vec![Scalar::UInt(2), Scalar::UInt(4)]]))
        );
        assert_eq!(
            leaf("Signals.OutputSignals.0.Ranges"),
            Some(Value::Matrix(vec![vec![Scalar::UInt(1), Scalar::UInt(2)]]))
        );
        assert_eq!(leaf("Memory.OutputSignals.ByteSize"), Some(Value::from(4u32)));
        assert_eq!(leaf("Memory.InputSignals.ByteSize"), Some(Value::from(0u32)));
    }

    #[test]
    fn test_data_source_leaves() {
        let store = output().data_store().unwrap();
        // Computed size wins over a property of the same name
        assert_eq!(store.get("Data.0.ByteSize"), Some(&Value::from(8u32)));
        assert_eq!(store.get("Data.0.HeapName"), Some(&Value::from("Default")));
        assert_eq!(store.get("Data.0.Signals.0.ByteOffset"), Some(&Value::from(0u32)));
        let producers = store
            .get("Data.0.Signals.0.States.Run.GAMProducers")
            .and_then(Value::as_text_list)
            .unwrap();
        assert_eq!(producers, vec!["Group1.GAM1.S"]);
        assert_eq!(
            store
                .get("Data.0.Signals.0.States.Run.GAMConsumers")
                .and_then(Value::as_text_list),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_memory_table_rows() {
        let table = output().memory_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].owner, "Group1.GAM1");
        assert_eq!(table[0].direction, Some(Direction::Output));
        assert_eq!((table[0].offset, table[0].size), (0, 4));
        assert_eq!(table[1].owner, "DDB1");
        assert_eq!(table[1].direction, None);
        assert_eq!((table[1].offset, table[1].size), (0, 8));
    }
}
