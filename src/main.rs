//! rtapp-builder - Command line entry point
//!
//! Builds an application file and prints the resolved configuration.
//!
//! ```text
//! rtapp-builder <file> [--output tree|json|memory] [--default-data-source NAME]
//! ```

use anyhow::{bail, Context};
use rtapp_builder::{store::convert, ApplicationFile, BrokerRegistry, ConfigurationBuilder};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str =
    "Usage: rtapp-builder <file> [--output tree|json|memory] [--default-data-source NAME]";

/// What to print after a successful build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Tree,
    Json,
    Memory,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tree" => Ok(OutputFormat::Tree),
            "json" => Ok(OutputFormat::Json),
            "memory" => Ok(OutputFormat::Memory),
            other => bail!("unknown output format '{}'\n{}", other, USAGE),
        }
    }
}

#[derive(Debug)]
struct Options {
    file: PathBuf,
    output: OutputFormat,
    default_data_source: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Options> {
    let mut file = None;
    let mut output = OutputFormat::Tree;
    let mut default_data_source = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--output" | "-o" => {
                let value = args.next().context("--output needs a value")?;
                output = value.parse()?;
            }
            "--default-data-source" => {
                default_data_source =
                    Some(args.next().context("--default-data-source needs a value")?);
            }
            "--help" | "-h" => bail!("{}", USAGE),
            flag if flag.starts_with('-') => bail!("unknown option '{}'\n{}", flag, USAGE),
            _ if file.is_some() => bail!("more than one input file\n{}", USAGE),
            _ => file = Some(PathBuf::from(arg)),
        }
    }

    Ok(Options {
        file: file.context(USAGE)?,
        output,
        default_data_source,
    })
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rtapp_builder=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = parse_args(std::env::args().skip(1))?;
    tracing::info!("Building {:?}", options.file);

    let app = ApplicationFile::load(&options.file)?;
    let mut settings = app.settings.clone();
    if let Some(name) = options.default_data_source {
        settings = settings.with_default_data_source(name);
    }
    let types = app.type_registry()?;
    let brokers = BrokerRegistry::new();

    let output = ConfigurationBuilder::new(&types, &brokers, settings)
        .build(&app.functions, &app.data, &app.states)
        .with_context(|| format!("Failed to build {:?}", options.file))?;

    match options.output {
        OutputFormat::Tree => {
            print!("{}", output.functions_store()?);
            print!("{}", output.data_store()?);
            print!("{}", output.states_store()?);
        }
        OutputFormat::Json => {
            let mut document = serde_json::Map::new();
            for store in [
                output.functions_store()?,
                output.data_store()?,
                output.states_store()?,
            ] {
                if let serde_json::Value::Object(sections) = convert::to_json(&store) {
                    document.extend(sections);
                }
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::Value::Object(document))?
            );
        }
        OutputFormat::Memory => {
            for entry in output.memory_table() {
                println!("{}", entry);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(args(&[
            "app.toml",
            "--output",
            "memory",
            "--default-data-source",
            "DDB1",
        ]))
        .unwrap();
        assert_eq!(options.file, PathBuf::from("app.toml"));
        assert_eq!(options.output, OutputFormat::Memory);
        assert_eq!(options.default_data_source.as_deref(), Some("DDB1"));
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["a.toml", "b.toml"])).is_err());
        assert!(parse_args(args(&["a.toml", "--output", "xml"])).is_err());
        assert!(parse_args(args(&["a.toml", "--verbose"])).is_err());
    }
}
