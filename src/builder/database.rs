//! Functions and Data databases.
//!
//! The builder owns two parallel databases: one [`Function`] per processing block
//! and one [`DataSource`] per shared memory region. Both are created by the
//! initialisation stage and only mutated in place afterwards. Cross references use
//! ordinals ([`FunctionId`], [`DataSourceId`]) and signal positions, never pointers.

use super::id::{DataSourceId, FunctionId};
use crate::error::{BuildError, ErrorKind, Result};
use crate::signal::{Signal, SignalDeclaration};
use crate::types::{ParsedScalar, Value};
use std::fmt;

/// Direction of a function signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];

    /// Name of the signal list node in a function
    pub fn section(self) -> &'static str {
        match self {
            Direction::Input => "InputSignals",
            Direction::Output => "OutputSignals",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// Position of a data-source signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalBinding {
    pub data_source: DataSourceId,
    pub signal: usize,
}

/// Position of a function signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalRef {
    pub function: FunctionId,
    pub direction: Direction,
    pub signal: usize,
}

/// Byte window of a declared range inside the data-source signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub offset: u32,
    pub size: u32,
}

/// A flattened signal of a function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignal {
    pub signal: Signal,
    /// Data-source signal this reference is merged into (stage 3)
    pub binding: Option<SignalBinding>,
    /// Windows copied from/to the data-source signal (stage 9)
    pub windows: Vec<RangeWindow>,
    /// Offset in the function's private buffer (stage 10)
    pub offset: Option<u32>,
    /// Transport adapter responsible for the copy (stage 11)
    pub broker: Option<String>,
}

impl FunctionSignal {
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            binding: None,
            windows: Vec::new(),
            offset: None,
            broker: None,
        }
    }

    /// Bytes in the function's private buffer (0 until sized)
    pub fn memory_size(&self) -> u32 {
        self.signal.byte_size.unwrap_or(0)
    }
}

/// Buffer totals of one function direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionMemory {
    pub size: u32,
    /// Bytes per data source, in order of first appearance
    pub data_sources: Vec<(DataSourceId, u32)>,
}

/// Consecutive signals of one direction sharing data source and broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerGroup {
    pub broker: String,
    pub data_source: DataSourceId,
    /// Signal positions in the direction's list
    pub signals: Vec<usize>,
}

/// Everything a function holds for one direction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSet {
    pub declarations: Vec<SignalDeclaration>,
    pub signals: Vec<FunctionSignal>,
    pub memory: DirectionMemory,
    pub brokers: Vec<BrokerGroup>,
}

/// A processing block
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub id: FunctionId,
    pub qualified_name: String,
    pub class: Option<String>,
    /// Own or inherited `DefaultDataSource`
    pub default_data_source: Option<String>,
    pub inputs: SignalSet,
    pub outputs: SignalSet,
    /// `(state, thread)` memberships (stage 7)
    pub states: Vec<(String, String)>,
}

impl Function {
    pub fn new(id: FunctionId, qualified_name: impl Into<String>) -> Self {
        Self {
            id,
            qualified_name: qualified_name.into(),
            class: None,
            default_data_source: None,
            inputs: SignalSet::default(),
            outputs: SignalSet::default(),
            states: Vec::new(),
        }
    }

    pub fn set(&self, direction: Direction) -> &SignalSet {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub fn set_mut(&mut self, direction: Direction) -> &mut SignalSet {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }

    pub fn signals(&self, direction: Direction) -> &[FunctionSignal] {
        &self.set(direction).signals
    }

    /// Thread this function runs on in `state`
    pub fn thread_in(&self, state: &str) -> Option<&str> {
        self.states
            .iter()
            .find(|(s, _)| s == state)
            .map(|(_, t)| t.as_str())
    }

    /// `<function>.<signal>` used in diagnostics
    pub fn signal_path(&self, direction: Direction, index: usize) -> String {
        match self.signals(direction).get(index) {
            Some(fs) => format!("{}.{}", self.qualified_name, fs.signal.qualified_name),
            None => format!("{}.{}[{}]", self.qualified_name, direction, index),
        }
    }
}

/// Readers and writers of a data-source signal in one state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUsage {
    pub state: String,
    pub consumers: Vec<SignalRef>,
    pub producers: Vec<SignalRef>,
}

impl StateUsage {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            consumers: Vec::new(),
            producers: Vec::new(),
        }
    }
}

/// A default value and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultContribution {
    pub origin: String,
    pub value: Value,
}

/// A signal of a data source: the union of every reference bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceSignal {
    pub signal: Signal,
    /// Function references merged into this signal, in merge order
    pub references: Vec<SignalRef>,
    pub defaults: Vec<DefaultContribution>,
    /// Default parsed against the resolved type and shape (stage 4)
    pub resolved_default: Option<Vec<ParsedScalar>>,
    /// Per-state consumers and producers (stage 8)
    pub states: Vec<StateUsage>,
    /// Offset in the data source's shared buffer (stage 10)
    pub offset: Option<u32>,
}

impl DataSourceSignal {
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            references: Vec::new(),
            defaults: Vec::new(),
            resolved_default: None,
            states: Vec::new(),
            offset: None,
        }
    }

    pub fn usage(&self, state: &str) -> Option<&StateUsage> {
        self.states.iter().find(|u| u.state == state)
    }

    pub fn usage_mut(&mut self, state: &str) -> &mut StateUsage {
        match self.states.iter().position(|u| u.state == state) {
            Some(position) => &mut self.states[position],
            None => {
                self.states.push(StateUsage::new(state));
                let last = self.states.len() - 1;
                &mut self.states[last]
            }
        }
    }
}

/// A shared memory region
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub id: DataSourceId,
    pub qualified_name: String,
    pub class: Option<String>,
    pub declarations: Vec<SignalDeclaration>,
    pub signals: Vec<DataSourceSignal>,
    /// Total shared-buffer size (stage 10)
    pub size: u32,
    /// Leaf attributes other than `Class`
    pub properties: Vec<(String, Value)>,
}

impl DataSource {
    pub fn new(id: DataSourceId, qualified_name: impl Into<String>) -> Self {
        Self {
            id,
            qualified_name: qualified_name.into(),
            class: None,
            declarations: Vec::new(),
            signals: Vec::new(),
            size: 0,
            properties: Vec::new(),
        }
    }

    /// Position of the signal with this exact qualified name
    pub fn find_signal(&self, name: &str) -> Option<usize> {
        self.signals
            .iter()
            .position(|s| s.signal.qualified_name == name)
    }

    /// A signal whose name is a dotted prefix of `name`, or has `name` as one
    pub fn node_conflict(&self, name: &str) -> Option<&str> {
        self.signals
            .iter()
            .map(|s| s.signal.qualified_name.as_str())
            .find(|existing| is_dotted_prefix(existing, name) || is_dotted_prefix(name, existing))
    }
}

/// True if `prefix` is a strict dotted prefix of `name` (`A.B` of `A.B.C`)
fn is_dotted_prefix(prefix: &str, name: &str) -> bool {
    name.len() > prefix.len()
        && name.starts_with(prefix)
        && name.as_bytes()[prefix.len()] == b'.'
}

/// Resolve a name against qualified candidates: exact match first, then a unique
/// dotted suffix match (`GAM2` or `Group1.GAM2` for `App.Group1.GAM2`).
fn resolve_name<'a>(
    candidates: impl Iterator<Item = &'a str> + Clone,
    name: &str,
    what: &str,
) -> Result<usize> {
    if let Some(position) = candidates.clone().position(|c| c == name) {
        return Ok(position);
    }
    let matches: Vec<(usize, &str)> = candidates
        .enumerate()
        .filter(|(_, c)| {
            c.len() > name.len()
                && c.ends_with(name)
                && c.as_bytes()[c.len() - name.len() - 1] == b'.'
        })
        .collect();
    match matches.as_slice() {
        [] => Err(BuildError::new(
            ErrorKind::UnresolvedName,
            name,
            format!("no {} with this name", what),
        )),
        [(position, _)] => Ok(*position),
        many => Err(BuildError::new(
            ErrorKind::AmbiguousName,
            name,
            format!(
                "matches {} {}s: {}",
                many.len(),
                what,
                many.iter().map(|(_, c)| *c).collect::<Vec<_>>().join(", ")
            ),
        )),
    }
}

/// Database of functions, indexed by [`FunctionId`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionsDatabase {
    functions: Vec<Function>,
}

impl FunctionsDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn clear(&mut self) {
        self.functions.clear();
    }

    /// Append a function, assigning the next ordinal
    pub fn push(&mut self, qualified_name: impl Into<String>) -> &mut Function {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function::new(id, qualified_name));
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    pub fn get(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn get_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.iter_mut()
    }

    /// Resolve a qualified name or unambiguous dotted suffix
    pub fn find(&self, name: &str) -> Result<FunctionId> {
        let names = self.functions.iter().map(|f| f.qualified_name.as_str());
        resolve_name(names, name, "function").map(|i| FunctionId(i as u32))
    }

    pub fn by_name(&self, name: &str) -> Option<&Function> {
        self.find(name).ok().and_then(|id| self.get(id))
    }

    /// Function signal at `r`
    pub fn signal(&self, r: SignalRef) -> Option<&FunctionSignal> {
        self.get(r.function)
            .and_then(|f| f.signals(r.direction).get(r.signal))
    }

    /// Total number of flattened function signals
    pub fn signal_count(&self) -> usize {
        self.functions
            .iter()
            .map(|f| f.inputs.signals.len() + f.outputs.signals.len())
            .sum()
    }
}

/// Database of data sources, indexed by [`DataSourceId`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataDatabase {
    sources: Vec<DataSource>,
}

impl DataDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }

    /// Append a data source, assigning the next ordinal
    pub fn push(&mut self, qualified_name: impl Into<String>) -> &mut DataSource {
        let id = DataSourceId(self.sources.len() as u32);
        self.sources.push(DataSource::new(id, qualified_name));
        let last = self.sources.len() - 1;
        &mut self.sources[last]
    }

    pub fn get(&self, id: DataSourceId) -> Option<&DataSource> {
        self.sources.get(id.index())
    }

    pub fn get_mut(&mut self, id: DataSourceId) -> Option<&mut DataSource> {
        self.sources.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSource> {
        self.sources.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataSource> {
        self.sources.iter_mut()
    }

    /// Resolve a qualified name or unambiguous short name
    pub fn find(&self, name: &str) -> Result<DataSourceId> {
        let names = self.sources.iter().map(|d| d.qualified_name.as_str());
        resolve_name(names, name, "data source").map(|i| DataSourceId(i as u32))
    }

    pub fn by_name(&self, name: &str) -> Option<&DataSource> {
        self.find(name).ok().and_then(|id| self.get(id))
    }

    /// Data-source signal at `binding`
    pub fn signal(&self, binding: SignalBinding) -> Option<&DataSourceSignal> {
        self.get(binding.data_source)
            .and_then(|d| d.signals.get(binding.signal))
    }

    pub fn signal_mut(&mut self, binding: SignalBinding) -> Option<&mut DataSourceSignal> {
        self.get_mut(binding.data_source)
            .and_then(|d| d.signals.get_mut(binding.signal))
    }

    pub fn signal_count(&self) -> usize {
        self.sources.iter().map(|d| d.signals.len()).sum()
    }
}

/// A thread of an execution state
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub name: String,
    pub functions: Vec<FunctionId>,
    pub cpus: Option<Value>,
    /// The input signal pacing this thread, if any
    pub sync_signal: Option<SignalRef>,
}

/// A named run mode
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    pub name: String,
    pub threads: Vec<Thread>,
}

impl ExecutionState {
    /// Every function of the state in thread order
    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.threads.iter().flat_map(|t| t.functions.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn functions() -> FunctionsDatabase {
        let mut db = FunctionsDatabase::new();
        db.push("GAM1");
        db.push("Group1.GAM2");
        db.push("Group2.GAM2");
        db.push("Group2.Sub.GAM3");
        db
    }

    #[test]
    fn test_find_exact_and_suffix() {
        let db = functions();
        assert_eq!(db.find("GAM1").unwrap(), FunctionId(0));
        assert_eq!(db.find("Group1.GAM2").unwrap(), FunctionId(1));
        assert_eq!(db.find("GAM3").unwrap(), FunctionId(3));
        assert_eq!(db.find("Sub.GAM3").unwrap(), FunctionId(3));
    }

    #[test]
    fn test_find_ambiguous_and_missing() {
        let db = functions();
        let err = db.find("GAM2").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AmbiguousName));
        let err = db.find("GAM9").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::UnresolvedName));
        // A suffix must start at a segment boundary
        assert!(db.find("AM1").is_err());
    }

    #[test]
    fn test_node_conflict() {
        let mut data = DataDatabase::new();
        let ds = data.push("DDB1");
        ds.signals.push(DataSourceSignal::new(Signal::new("Sig.a1.b1")));
        ds.signals.push(DataSourceSignal::new(Signal::new("Flat")));
        let ds = data.get(DataSourceId(0)).unwrap();
        assert_eq!(ds.node_conflict("Sig"), Some("Sig.a1.b1"));
        assert_eq!(ds.node_conflict("Sig.a1"), Some("Sig.a1.b1"));
        assert_eq!(ds.node_conflict("Flat.x"), Some("Flat"));
        assert_eq!(ds.node_conflict("Sig.a1.b1"), None);
        assert_eq!(ds.node_conflict("Si"), None);
    }

    #[test]
    fn test_usage_mut_creates_once() {
        let mut signal = DataSourceSignal::new(Signal::new("S"));
        signal.usage_mut("Run").consumers.push(SignalRef {
            function: FunctionId(0),
            direction: Direction::Input,
            signal: 0,
        });
        signal.usage_mut("Run");
        assert_eq!(signal.states.len(), 1);
        assert_eq!(signal.usage("Run").unwrap().consumers.len(), 1);
        assert!(signal.usage("Idle").is_none());
    }
}
