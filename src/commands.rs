use prettytable::{row, Table};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use ledgerkv_core::{BackendError, Book, FrameError, Numeric, Value, ValueError};

use crate::{config::Config, registry::ProviderRegistry, session::Session};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("invalid value: {0}")]
    Value(#[from] ValueError),
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads a command-line value: integers, `n/d` rationals, doubles, GUIDs and
/// RFC 3339 timestamps are recognised, anything else is a string.
pub fn parse_value(text: &str) -> Result<Value, CommandError> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Integer(i));
    }
    if let Some((num, denom)) = text.split_once('/') {
        if let (Ok(num), Ok(denom)) = (num.parse::<i64>(), denom.parse::<i64>()) {
            return Ok(Value::Rational(Numeric::new(num, denom)?));
        }
    }
    if let Ok(d) = text.parse::<f64>() {
        return Ok(Value::Double(d));
    }
    if let Ok(guid) = Uuid::parse_str(text) {
        return Ok(Value::Guid(guid));
    }
    if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(Value::Timestamp(ts));
    }
    Ok(Value::String(text.to_string()))
}

pub fn list_providers(registry: &ProviderRegistry) -> String {
    let mut table = Table::new();
    table.add_row(row!["Name", "Access method", "Partial books"]);
    table.add_empty_row();

    for provider in registry.providers() {
        let partial = if provider.partial_book_supported() { "yes" } else { "no" };
        table.add_row(row![provider.name(), provider.access_method(), partial]);
    }

    format!("\n{}\n", table)
}

fn open_session(registry: &ProviderRegistry, config: &Config, location: &str) -> Result<Session, CommandError> {
    let mut session = registry.new_session(location)?;
    let options = config.backend_options();
    if !options.is_empty() {
        session.load_config(options)?;
    }
    session.session_begin(config.backend.ignore_lock, config.backend.create)?;
    Ok(session)
}

pub fn inspect(registry: &ProviderRegistry, config: &Config, location: &str, json: bool) -> Result<String, CommandError> {
    let mut session = open_session(registry, config, location)?;
    let mut book = Book::new();
    session.load(&mut book)?;

    let output = if json {
        serde_json::to_string_pretty(&serde_json::json!({
            "location": session.full_path().unwrap_or(location),
            "book": book.guid,
            "version": book.version,
            "instances": book.len(),
            "slots": &book.slots,
            "config": session.get_config(),
        }))?
    } else {
        format!(
            "Location: {}\nBook: {} (version {}, {} instances)\nSlots:\n{}\nConfiguration:\n{}\n",
            session.full_path().unwrap_or(location),
            book.guid,
            book.version,
            book.len(),
            book.slots,
            session.get_config(),
        )
    };

    session.session_end()?;
    Ok(output)
}

/// Sets a book-level slot, creating intermediate frames, and syncs the book.
pub fn set_slot(
    registry: &ProviderRegistry,
    config: &Config,
    location: &str,
    path: &str,
    value: &str,
) -> Result<Book, CommandError> {
    let value = parse_value(value)?;
    let mut session = open_session(registry, config, location)?;
    let mut book = Book::new();
    session.load(&mut book)?;

    book.slots.set_path(path, value)?;
    book.mark_dirty();
    session.sync(&mut book)?;
    info!(location, path, version = book.version, "Slot set");

    session.session_end()?;
    Ok(book)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use ledgerkv_memory::MemoryProvider;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42").unwrap(), Value::Integer(42));
        assert_eq!(parse_value("-3/4").unwrap(), Value::Rational(Numeric::new(-3, 4).unwrap()));
        assert_eq!(parse_value("2.5").unwrap(), Value::Double(2.5));
        assert!(matches!(parse_value("1/0"), Err(CommandError::Value(_))));
        assert_eq!(parse_value("a/b").unwrap(), Value::from("a/b"));
        assert!(matches!(
            parse_value("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap(),
            Value::Guid(_)
        ));
        assert!(matches!(parse_value("2023-01-15T10:30:00Z").unwrap(), Value::Timestamp(_)));
        assert_eq!(parse_value("cash").unwrap(), Value::from("cash"));
    }

    #[test]
    fn test_set_then_inspect() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MemoryProvider::new()));
        let config = Config::default();

        let book = set_slot(&registry, &config, "mem://home", "options/currency", "EUR").unwrap();
        assert_eq!(book.slots.get_slot_at("options/currency"), Some(&Value::from("EUR")));

        let text = inspect(&registry, &config, "mem://home", false).unwrap();
        assert!(text.contains("Location: mem://home"));
        assert!(text.contains("currency => \"EUR\""));

        let json: serde_json::Value =
            serde_json::from_str(&inspect(&registry, &config, "mem://home", true).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["slots"]["options"]["value"]["currency"]["value"], "EUR");
    }

    #[test]
    fn test_providers_table() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MemoryProvider::new()));
        let table = list_providers(&registry);
        assert!(table.contains("memory"));
        assert!(table.contains("mem"));
    }

    #[test]
    fn test_unknown_access_method() {
        let registry = ProviderRegistry::new();
        let err = inspect(&registry, &Config::default(), "file://books.xml", false).unwrap_err();
        assert!(matches!(err, CommandError::Backend(BackendError::NoHandler(_))));
    }
}
