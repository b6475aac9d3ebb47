//! Loading application files from disk and building them

mod common;

use common::assert_kind;
use rtapp_builder::builder::database::Direction;
use rtapp_builder::{ApplicationFile, BrokerRegistry, ConfigurationBuilder, ErrorKind};
use std::io::Write;

const TOML_APP: &str = r#"
[Settings]
DefaultDataSource = "DDB1"

[Types.Point]
x = { Type = "float32" }
y = { Type = "float32" }

[Types.Window]
values = { Type = "int16", NumberOfElements = 8, NumberOfDimensions = 1 }

[Functions.Reader.InputSignals.Position]
Type = "Point"
DataSource = "Sensors"
Alias = "Target"

[Functions.Reader.OutputSignals.Buffer]
Type = "Window"

[Functions.Writer.OutputSignals.Target.x]
Type = "float32"
DataSource = "Sensors"

[Functions.Writer.OutputSignals.Target.y]
Type = "float32"
DataSource = "Sensors"

[Functions.Timer.InputSignals.Counter]
Type = "uint32"
DataSource = "Timings"
Frequency = 1000

[Data.DDB1]
Class = "GAMDataSource"

[Data.Sensors]
Class = "GAMDataSource"

[Data.Timings]
Class = "TimingDataSource"

[States.Running.Threads.Fast]
Functions = ["Timer", "Writer", "Reader"]
CPUs = 1
"#;

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn test_build_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "application.toml", TOML_APP);

    let app = ApplicationFile::load(&path).unwrap();
    let types = app.type_registry().unwrap();
    let brokers = BrokerRegistry::new();
    let output = ConfigurationBuilder::new(&types, &brokers, app.settings.clone())
        .build(&app.functions, &app.data, &app.states)
        .unwrap();

    // Reader's aliased struct lands on the Target namespace written by Writer
    let sensors = output.data.by_name("Sensors").unwrap();
    let names: Vec<_> = sensors
        .signals
        .iter()
        .map(|s| s.signal.qualified_name.as_str())
        .collect();
    assert_eq!(names, vec!["Target.x", "Target.y"]);
    assert_eq!(sensors.size, 8);

    let reader = output.functions.by_name("Reader").unwrap();
    let buffer = &reader.signals(Direction::Output)[0];
    assert_eq!(buffer.signal.qualified_name, "Buffer.values");
    assert_eq!(buffer.memory_size(), 16);

    let state = &output.states[0];
    assert_eq!(state.threads[0].name, "Fast");
    assert!(state.threads[0].sync_signal.is_some());
    assert!(state.threads[0].cpus.is_some());
}

#[test]
fn test_build_from_json_file() {
    let json = r#"{
        "Settings": { "DefaultDataSource": "DDB1" },
        "Functions": {
            "GAM1": { "OutputSignals": { "Counter": { "Type": "uint64" } } },
            "GAM2": { "InputSignals": { "Counter": { "Type": "uint64" } } }
        },
        "Data": { "DDB1": { "Class": "GAMDataSource" } },
        "States": {
            "Running": { "Threads": { "T1": { "Functions": ["GAM1", "GAM2"] } } }
        }
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "application.json", json);

    let app = ApplicationFile::load(&path).unwrap();
    let types = app.type_registry().unwrap();
    let brokers = BrokerRegistry::new();
    let output = ConfigurationBuilder::new(&types, &brokers, app.settings.clone())
        .build(&app.functions, &app.data, &app.states)
        .unwrap();
    assert_eq!(output.total_bytes(), 24);
}

#[test]
fn test_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "broken.toml", "[Functions\nGAM1 = ");
    assert!(ApplicationFile::load(&path).is_err());

    let missing = dir.path().join("missing.toml");
    assert!(ApplicationFile::load(missing).is_err());
}

#[test]
fn test_unknown_struct_type_in_file() {
    let content = r#"
[Functions.GAM1.InputSignals.S]
Type = "Unknown"
DataSource = "DDB1"

[Data.DDB1]
Class = "GAMDataSource"

[States.Running.Threads.T1]
Functions = ["GAM1"]
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "application.toml", content);
    let app = ApplicationFile::load(&path).unwrap();
    let types = app.type_registry().unwrap();
    let brokers = BrokerRegistry::new();
    let result = ConfigurationBuilder::new(&types, &brokers, app.settings.clone()).build(
        &app.functions,
        &app.data,
        &app.states,
    );
    assert_kind(result, ErrorKind::UnresolvedName);
}
