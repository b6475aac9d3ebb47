//! Broker providers and the broker assignment stage.
//!
//! A broker is the transport adapter that copies a function signal between the
//! function's private buffer and the data source's shared buffer. Which broker
//! applies is the data source's decision, answered through [`BrokerProvider`].

use super::database::{BrokerGroup, DataSource, Direction};
use super::{BuildStage, ConfigurationBuilder};
use crate::error::{BuildError, ErrorKind, Result};
use crate::signal::Signal;

pub const MEMORY_MAP_INPUT_BROKER: &str = "MemoryMapInputBroker";
pub const MEMORY_MAP_SYNCHRONISED_INPUT_BROKER: &str = "MemoryMapSynchronisedInputBroker";
pub const MEMORY_MAP_OUTPUT_BROKER: &str = "MemoryMapOutputBroker";
pub const MEMORY_MAP_SYNCHRONISED_OUTPUT_BROKER: &str = "MemoryMapSynchronisedOutputBroker";

/// Answers which broker a data source offers for one signal.
///
/// Implementations must be deterministic: the same data source, signal and
/// direction always yield the same broker name.
#[cfg_attr(test, mockall::automock)]
pub trait BrokerProvider: Send + Sync {
    /// Broker name for `signal` moving in `direction`, or `None` when the data
    /// source cannot serve it.
    fn broker(&self, data_source: &DataSource, signal: &Signal, direction: Direction)
        -> Option<String>;
}

/// Memory-mapped brokers, offered by every plain shared-memory data source
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryMapBrokers;

impl BrokerProvider for MemoryMapBrokers {
    fn broker(
        &self,
        _data_source: &DataSource,
        signal: &Signal,
        direction: Direction,
    ) -> Option<String> {
        let name = match direction {
            Direction::Input if signal.is_sync() || signal.samples.unwrap_or(1) > 1 => {
                MEMORY_MAP_SYNCHRONISED_INPUT_BROKER
            }
            Direction::Input => MEMORY_MAP_INPUT_BROKER,
            Direction::Output if signal.trigger => MEMORY_MAP_SYNCHRONISED_OUTPUT_BROKER,
            Direction::Output => MEMORY_MAP_OUTPUT_BROKER,
        };
        Some(name.to_string())
    }
}

/// Broker providers keyed by data source qualified name or class
pub struct BrokerRegistry {
    providers: Vec<(String, Box<dyn BrokerProvider>)>,
    fallback: Box<dyn BrokerProvider>,
}

impl Default for BrokerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerRegistry {
    /// Registry where every data source uses [`MemoryMapBrokers`]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            fallback: Box::new(MemoryMapBrokers),
        }
    }

    /// Register a provider for data sources whose qualified name or class is `key`.
    /// A later registration for the same key replaces the earlier one.
    pub fn register(&mut self, key: impl Into<String>, provider: impl BrokerProvider + 'static) {
        let key = key.into();
        self.providers.retain(|(k, _)| *k != key);
        self.providers.push((key, Box::new(provider)));
    }

    pub fn with_fallback(mut self, provider: impl BrokerProvider + 'static) -> Self {
        self.fallback = Box::new(provider);
        self
    }

    /// Provider for `data_source`: by qualified name first, then by class
    pub fn provider_for(&self, data_source: &DataSource) -> &dyn BrokerProvider {
        let by_name = self
            .providers
            .iter()
            .find(|(key, _)| *key == data_source.qualified_name);
        let by_class = || {
            let class = data_source.class.as_deref()?;
            self.providers.iter().find(|(key, _)| key == class)
        };
        match by_name.or_else(by_class) {
            Some((_, provider)) => provider.as_ref(),
            None => self.fallback.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for BrokerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field(
                "providers",
                &self.providers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ConfigurationBuilder<'_> {
    /// Stage 11: ask each signal's data source for a broker and group
    /// consecutive signals sharing data source and broker.
    pub fn assign_brokers_to_functions(&mut self) -> Result<()> {
        self.run_stage(
            "Broker assignment",
            BuildStage::DataSourcesMemoryResolved,
            BuildStage::BrokersAssigned,
            |builder| {
                let registry = builder.brokers;
                let data = &builder.data;
                let mut groups = 0usize;

                for function in builder.functions.iter_mut() {
                    let name = function.qualified_name.clone();
                    for direction in Direction::ALL {
                        let set = function.set_mut(direction);
                        set.brokers.clear();
                        for (index, fs) in set.signals.iter_mut().enumerate() {
                            let path = format!("{}.{}", name, fs.signal.qualified_name);
                            let binding = fs.binding.ok_or_else(|| {
                                BuildError::new(
                                    ErrorKind::UnresolvedName,
                                    &path,
                                    "signal is not bound to a data source",
                                )
                            })?;
                            let source = data.get(binding.data_source).ok_or_else(|| {
                                BuildError::new(
                                    ErrorKind::UnresolvedName,
                                    &path,
                                    "bound data source vanished",
                                )
                            })?;
                            let broker = registry
                                .provider_for(source)
                                .broker(source, &fs.signal, direction)
                                .ok_or_else(|| {
                                    BuildError::new(
                                        ErrorKind::NoCompatibleBroker,
                                        &path,
                                        format!(
                                            "{} offers no {} broker for this signal",
                                            source.qualified_name,
                                            match direction {
                                                Direction::Input => "input",
                                                Direction::Output => "output",
                                            }
                                        ),
                                    )
                                })?;
                            tracing::trace!("{} -> {}", path, broker);

                            match set.brokers.last_mut() {
                                Some(group)
                                    if group.broker == broker
                                        && group.data_source == binding.data_source =>
                                {
                                    group.signals.push(index);
                                }
                                _ => {
                                    set.brokers.push(BrokerGroup {
                                        broker: broker.clone(),
                                        data_source: binding.data_source,
                                        signals: vec![index],
                                    });
                                    groups += 1;
                                }
                            }
                            fs.broker = Some(broker);
                        }
                    }
                }
                tracing::debug!("Assigned {} broker groups", groups);
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::id::DataSourceId;

    fn source(class: Option<&str>) -> DataSource {
        let mut source = DataSource::new(DataSourceId(0), "Timings");
        source.class = class.map(str::to_string);
        source
    }

    #[test]
    fn test_memory_map_selection() {
        let brokers = MemoryMapBrokers;
        let ds = source(None);
        let mut signal = Signal::new("S");
        assert_eq!(
            brokers.broker(&ds, &signal, Direction::Input).as_deref(),
            Some(MEMORY_MAP_INPUT_BROKER)
        );
        assert_eq!(
            brokers.broker(&ds, &signal, Direction::Output).as_deref(),
            Some(MEMORY_MAP_OUTPUT_BROKER)
        );

        signal.samples = Some(4);
        assert_eq!(
            brokers.broker(&ds, &signal, Direction::Input).as_deref(),
            Some(MEMORY_MAP_SYNCHRONISED_INPUT_BROKER)
        );
        signal.samples = None;
        signal.frequency = Some(1000.0);
        assert_eq!(
            brokers.broker(&ds, &signal, Direction::Input).as_deref(),
            Some(MEMORY_MAP_SYNCHRONISED_INPUT_BROKER)
        );

        signal.trigger = true;
        assert_eq!(
            brokers.broker(&ds, &signal, Direction::Output).as_deref(),
            Some(MEMORY_MAP_SYNCHRONISED_OUTPUT_BROKER)
        );
    }

    #[test]
    fn test_registry_lookup_order() {
        let mut by_class = MockBrokerProvider::new();
        by_class
            .expect_broker()
            .returning(|_, _, _| Some("ClassBroker".to_string()));
        let mut by_name = MockBrokerProvider::new();
        by_name
            .expect_broker()
            .returning(|_, _, _| Some("NameBroker".to_string()));

        let mut registry = BrokerRegistry::new();
        registry.register("TimingDataSource", by_class);
        let ds = source(Some("TimingDataSource"));
        let signal = Signal::new("S");
        let broker = registry
            .provider_for(&ds)
            .broker(&ds, &signal, Direction::Input);
        assert_eq!(broker.as_deref(), Some("ClassBroker"));

        registry.register("Timings", by_name);
        let broker = registry
            .provider_for(&ds)
            .broker(&ds, &signal, Direction::Input);
        assert_eq!(broker.as_deref(), Some("NameBroker"));

        let other = source(Some("GAMDataSource"));
        let broker = registry
            .provider_for(&other)
            .broker(&other, &signal, Direction::Output);
        assert_eq!(broker.as_deref(), Some(MEMORY_MAP_OUTPUT_BROKER));
    }

    #[test]
    fn test_mock_is_asked_once_per_signal() {
        let mut provider = MockBrokerProvider::new();
        provider
            .expect_broker()
            .withf(|ds, signal, direction| {
                ds.qualified_name == "Timings"
                    && signal.qualified_name == "Counter"
                    && *direction == Direction::Input
            })
            .times(1)
            .returning(|_, _, _| None);

        let ds = source(None);
        let registry = BrokerRegistry::new().with_fallback(provider);
        let broker = registry
            .provider_for(&ds)
            .broker(&ds, &Signal::new("Counter"), Direction::Input);
        assert!(broker.is_none());
    }
}
