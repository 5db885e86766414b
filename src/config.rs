use clap::{Parser, Subcommand};
use serde::Deserialize;

use ledgerkv_core::{Frame, Value};

#[derive(Parser, Debug)]
#[command(name = "ledgerkv", about = "ledgerkv - pluggable storage backends for accounting books")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "ledgerkv.toml")]
    pub config: String,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Break a lock held by another session (overrides config file)
    #[arg(long)]
    pub ignore_lock: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered storage providers
    Providers,
    /// Load a book and print its slots and the backend configuration
    Inspect {
        location: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a book-level slot and sync it to the location
    Set {
        location: String,
        path: String,
        value: String,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default)]
    pub ignore_lock: bool,

    /// Create the location if it does not exist yet.
    #[serde(default = "default_create")]
    pub create: bool,

    /// Handed to the backend through `load_config`.
    #[serde(default)]
    pub options: toml::Table,
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_create() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            ignore_lock: false,
            create: default_create(),
            options: toml::Table::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: default_logging(),
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if cli.ignore_lock {
            config.backend.ignore_lock = true;
        }

        config
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn backend_options(&self) -> Frame {
        frame_from_toml(&self.backend.options)
    }
}

/// Converts a TOML table into a frame. Tables become nested frames, arrays
/// become lists, datetimes that carry an offset become timestamps and other
/// datetimes are kept as their text.
pub fn frame_from_toml(table: &toml::Table) -> Frame {
    table
        .iter()
        .map(|(key, value)| (key.as_str(), value_from_toml(value)))
        .collect()
}

fn value_from_toml(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::Integer(*i),
        toml::Value::Float(f) => Value::Double(*f),
        toml::Value::Boolean(b) => Value::Integer(i64::from(*b)),
        toml::Value::Datetime(dt) => {
            let text = dt.to_string();
            time::OffsetDateTime::parse(&text, &time::format_description::well_known::Rfc3339)
                .map(Value::Timestamp)
                .unwrap_or(Value::String(text))
        }
        toml::Value::Array(items) => Value::List(items.iter().map(value_from_toml).collect()),
        toml::Value::Table(table) => Value::Frame(frame_from_toml(table)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_are_missing() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.backend.create);
        assert!(!config.backend.ignore_lock);
        assert!(config.backend_options().is_empty());
    }

    #[test]
    fn test_backend_options_become_a_frame() {
        let config = Config::parse(
            r#"
            [logging]
            level = "debug"
            json = true

            [backend]
            ignore_lock = true

            [backend.options.load]
            eager = 0
            reference-types = ["Account", "Commodity"]
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert!(config.backend.ignore_lock);
        let options = config.backend_options();
        assert_eq!(options.get_slot_at("load/eager"), Some(&Value::Integer(0)));
        assert_eq!(
            options.get_slot_at("load/reference-types"),
            Some(&Value::List(vec![Value::from("Account"), Value::from("Commodity")]))
        );
    }

    #[test]
    fn test_toml_scalars() {
        let table: toml::Table = toml::from_str(
            r#"
            flag = true
            rate = 0.5
            opened = 2023-01-15T10:30:00Z
            day = 2023-01-15
            "#,
        )
        .unwrap();
        let frame = frame_from_toml(&table);
        assert_eq!(frame.get_slot("flag"), Some(&Value::Integer(1)));
        assert_eq!(frame.get_slot("rate"), Some(&Value::Double(0.5)));
        assert!(frame.get_slot("opened").and_then(Value::as_timestamp).is_some());
        assert_eq!(frame.get_slot("day"), Some(&Value::from("2023-01-15")));
    }
}
