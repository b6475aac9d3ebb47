//! Test data builders for creating application stores

use rtapp_builder::{
    BrokerRegistry, BuildOutput, BuilderSettings, ConfigurationBuilder, ConfigurationStore,
    Result, Scalar, StructDef, TypeRegistry, Value,
};

/// `Ranges` value from `(min, max)` pairs
pub fn ranges(pairs: &[(u32, u32)]) -> Value {
    Value::Matrix(
        pairs
            .iter()
            .map(|&(min, max)| vec![Scalar::UInt(u64::from(min)), Scalar::UInt(u64::from(max))])
            .collect(),
    )
}

/// Builder for the Functions, Data and States stores of an application
pub struct ApplicationBuilder {
    pub functions: ConfigurationStore,
    pub data: ConfigurationStore,
    pub states: ConfigurationStore,
    pub types: TypeRegistry,
    pub settings: BuilderSettings,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            functions: ConfigurationStore::new(),
            data: ConfigurationStore::new(),
            states: ConfigurationStore::new(),
            types: TypeRegistry::new(),
            settings: BuilderSettings::default(),
        }
    }

    /// Declare an input signal: `<function>.InputSignals.<signal>.<key> = value`
    pub fn input(self, function: &str, signal: &str, attributes: &[(&str, Value)]) -> Self {
        self.signal(function, "InputSignals", signal, attributes)
    }

    /// Declare an output signal: `<function>.OutputSignals.<signal>.<key> = value`
    pub fn output(self, function: &str, signal: &str, attributes: &[(&str, Value)]) -> Self {
        self.signal(function, "OutputSignals", signal, attributes)
    }

    fn signal(
        mut self,
        function: &str,
        section: &str,
        signal: &str,
        attributes: &[(&str, Value)],
    ) -> Self {
        let path = format!("{}.{}.{}", function, section, signal);
        let node = self.functions.create_path(&path).unwrap();
        for (key, value) in attributes {
            self.functions.write(node, key, value.clone()).unwrap();
        }
        self
    }

    /// Declare a data source with a class
    pub fn data_source(mut self, name: &str, class: &str) -> Self {
        self.data.set(&format!("{}.Class", name), class).unwrap();
        self
    }

    /// Declare a signal on a data source
    pub fn data_signal(mut self, source: &str, signal: &str, attributes: &[(&str, Value)]) -> Self {
        let node = self
            .data
            .create_path(&format!("{}.Signals.{}", source, signal))
            .unwrap();
        for (key, value) in attributes {
            self.data.write(node, key, value.clone()).unwrap();
        }
        self
    }

    /// Schedule functions on a thread of a state
    pub fn thread(mut self, state: &str, thread: &str, functions: &[&str]) -> Self {
        self.states
            .set(
                &format!("{}.Threads.{}.Functions", state, thread),
                functions.to_vec(),
            )
            .unwrap();
        self
    }

    pub fn struct_type(mut self, def: StructDef) -> Self {
        self.types.insert(def);
        self
    }

    pub fn default_data_source(mut self, name: &str) -> Self {
        self.settings = self.settings.with_default_data_source(name);
        self
    }

    /// Run every stage with the default memory-map brokers
    pub fn build(&self) -> Result<BuildOutput> {
        self.build_with(&BrokerRegistry::new())
    }

    pub fn build_with(&self, brokers: &BrokerRegistry) -> Result<BuildOutput> {
        ConfigurationBuilder::new(&self.types, brokers, self.settings.clone()).build(
            &self.functions,
            &self.data,
            &self.states,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_builder() {
        let app = ApplicationBuilder::new()
            .input("GAM1", "A", &[("Type", Value::from("uint8"))])
            .data_source("DDB1", "GAMDataSource")
            .thread("Run", "T1", &["GAM1"]);
        assert_eq!(
            app.functions.get("GAM1.InputSignals.A.Type"),
            Some(&Value::from("uint8"))
        );
        assert_eq!(
            app.states.get("Run.Threads.T1.Functions"),
            Some(&Value::from(vec!["GAM1"]))
        );
    }
}
