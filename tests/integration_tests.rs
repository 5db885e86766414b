use std::sync::{Arc, Mutex};

use ledgerkv::{
    BackendError, BackendProvider, Book, CompareOp, ErrorCode, Frame, FrameError, Instance, Numeric,
    ProviderRegistry, Query, Session, SessionState, Value, COUNTER_ERROR,
};
use ledgerkv_memory::{MemoryProvider, MemoryStore, CONFIG_LOAD_EAGER, CONFIG_REFERENCE_TYPES};

fn setup() -> (ProviderRegistry, MemoryStore) {
    let store = MemoryStore::new();
    let registry = ProviderRegistry::new();
    registry.register(Arc::new(MemoryProvider::with_store(store.clone())));
    (registry, store)
}

fn open(registry: &ProviderRegistry, location: &str) -> Session {
    let mut session = registry.new_session(location).expect("Failed to select provider");
    session.session_begin(false, true).expect("Failed to begin session");
    session
}

fn account(name: &str, code: i64) -> Instance {
    let mut instance = Instance::new("Account");
    instance.slots.set("name", Value::from(name));
    instance.slots.set("code", Value::from(code));
    instance
}

fn save(session: &mut Session, instance: &mut Instance) {
    session.begin(instance).expect("Failed to begin edit");
    session.commit(instance).expect("Failed to commit");
}

#[test]
fn test_set_path_creates_intermediate_frames() {
    let mut frame = Frame::new();
    frame.set_path("a/b/c", Value::from(5)).unwrap();
    assert_eq!(frame.get_slot_at("a/b/c"), Some(&Value::Integer(5)));
    assert!(frame.get_frame("a/b").is_some());

    let mut other = Frame::new();
    assert_eq!(other.set_at("a/b/c", Value::from(5)), Err(FrameError::NoSuchPath("a".to_string())));
    assert!(other.is_empty());
    assert_eq!(other.set_path("", Value::from(5)), Err(FrameError::EmptyPath));
}

#[test]
fn test_frame_compare_and_deep_copy() {
    let mut a = Frame::new();
    a.set_path("options/currency", Value::from("EUR")).unwrap();
    a.set("rate", Value::from(Numeric::new(1, 3).unwrap()));
    let mut b = a.clone();
    assert_eq!(ledgerkv::compare(&a, &b), std::cmp::Ordering::Equal);

    b.set_path("options/currency", Value::from("USD")).unwrap();
    assert_eq!(a.get_slot_at("options/currency"), Some(&Value::from("EUR")));
    assert_eq!(ledgerkv::compare(&a, &b), std::cmp::Ordering::Less);
}

#[test]
fn test_first_accepting_provider_wins() {
    let registry = ProviderRegistry::new();
    registry.register(Arc::new(
        MemoryProvider::new().named("xml").accepting(|address| address.ends_with(".xml")),
    ));
    registry.register(Arc::new(MemoryProvider::new().named("fallback")));

    let (_, provider) = registry.select("mem://books.xml").unwrap();
    assert_eq!(provider.name(), "xml");
    let (location, provider) = registry.select("mem://books.db").unwrap();
    assert_eq!(provider.name(), "fallback");
    assert_eq!(location.address(), "books.db");
}

#[test]
fn test_no_accepting_provider() {
    let registry = ProviderRegistry::new();
    registry.register(Arc::new(MemoryProvider::new().accepting(|_| false)));
    assert!(matches!(registry.new_session("mem://x"), Err(BackendError::NoHandler(_))));
    assert!(matches!(registry.new_session("file://x"), Err(BackendError::NoHandler(_))));
    assert_eq!(registry.providers().len(), 1);
}

#[test]
fn test_global_registry() {
    let registry = ProviderRegistry::global();
    registry.register(Arc::new(MemoryProvider::new().named("global-test")));
    assert!(registry.providers().iter().any(|p| p.name() == "global-test"));
}

#[test]
fn test_missing_location_is_not_created() {
    let (registry, store) = setup();
    let mut session = registry.new_session("mem://absent").unwrap();
    assert!(matches!(session.session_begin(false, false), Err(BackendError::NoSuchLocation(_))));
    assert_eq!(session.state(), SessionState::Unconnected);
    assert_eq!(session.get_error(), ErrorCode::NoSuchLocation);
    assert!(!store.contains("absent"));
}

#[test]
fn test_lock_conflict_then_ignore_lock() {
    let (registry, _store) = setup();
    let _first = open(&registry, "mem://x");

    let mut second = registry.new_session("mem://x").unwrap();
    assert!(matches!(second.session_begin(false, false), Err(BackendError::Locked(_))));
    assert_eq!(second.get_error(), ErrorCode::Locked);
    assert_eq!(second.get_error(), ErrorCode::NoError);
    assert_eq!(second.state(), SessionState::Unconnected);

    second.session_begin(true, false).unwrap();
    assert!(second.is_active());
    assert_eq!(second.full_path(), Some("mem://x"));
}

#[test]
fn test_session_end_releases_lock() {
    let (registry, store) = setup();
    let mut first = open(&registry, "mem://x");
    first.session_end().unwrap();
    assert!(!store.is_locked("x"));
    let second = open(&registry, "mem://x");

    drop(second);
    assert!(!store.is_locked("x"));
}

#[test]
fn test_commit_without_begin_is_misuse() {
    let (registry, store) = setup();
    let mut session = open(&registry, "mem://books");
    let mut cash = account("cash", 1000);

    assert!(matches!(session.commit(&mut cash), Err(BackendError::Misuse(_))));
    assert_eq!(session.get_error(), ErrorCode::Misuse);
    assert_eq!(store.instance_count("books"), 0);
}

#[test]
fn test_operations_after_end_are_misuse() {
    let (registry, _store) = setup();
    let mut session = open(&registry, "mem://books");
    session.session_end().unwrap();

    let mut book = Book::new();
    assert!(matches!(session.load(&mut book), Err(BackendError::Misuse(_))));
    assert!(matches!(session.sync(&mut book), Err(BackendError::Misuse(_))));
    assert_eq!(session.counter_value("invoice"), COUNTER_ERROR);
    assert_eq!(session.get_error(), ErrorCode::Misuse);
    assert!(session.get_message().is_some());
}

#[test]
fn test_commit_after_remote_destroy() {
    let (registry, _store) = setup();
    let mut first = open(&registry, "mem://books");
    let mut cash = account("cash", 1000);
    save(&mut first, &mut cash);
    let mut stale = cash.clone();

    first.begin(&cash).unwrap();
    cash.mark_destroyed();
    first.commit(&mut cash).unwrap();
    first.session_end().unwrap();

    let mut second = open(&registry, "mem://books");
    second.begin(&stale).unwrap();
    stale.slots.set("name", Value::from("petty cash"));
    assert!(matches!(second.commit(&mut stale), Err(BackendError::ModifyDestroyed(_))));
    assert_eq!(second.get_error(), ErrorCode::ModifyDestroyed);

    // The failed edit is still open and can be rolled back.
    assert!(matches!(second.rollback(&mut stale), Err(BackendError::ModifyDestroyed(_))));
    assert!(matches!(second.rollback(&mut stale), Err(BackendError::Misuse(_))));
}

#[test]
fn test_rollback_restores_committed_state() {
    let (registry, _store) = setup();
    let mut session = open(&registry, "mem://books");
    let mut cash = account("cash", 1000);
    save(&mut session, &mut cash);

    session.begin(&cash).unwrap();
    cash.slots.set("code", Value::from(9999));
    session.rollback(&mut cash).unwrap();
    assert_eq!(cash.slots.get_slot("code"), Some(&Value::from(1000)));
    assert_eq!(cash.version, 1);
}

#[test]
fn test_rollback_of_new_instance_discards_edits() {
    let (registry, store) = setup();
    let mut session = open(&registry, "mem://books");
    let mut cash = account("cash", 1000);

    session.begin(&cash).unwrap();
    cash.slots.set("code", Value::from(9999));
    cash.slots.set("note", Value::from("draft"));
    session.rollback(&mut cash).unwrap();

    assert_eq!(cash.slots.get_slot("code"), Some(&Value::from(1000)));
    assert!(cash.slots.get_slot("note").is_none());
    assert_eq!(cash.version, 0);
    assert_eq!(store.instance_count("books"), 0);
}

#[test]
fn test_sync_reconciles_by_version() {
    let (registry, _store) = setup();
    let mut writer = open(&registry, "mem://books");
    let mut cash = account("cash", 1000);
    save(&mut writer, &mut cash);
    let original = cash.clone();
    cash.slots.set("name", Value::from("till"));
    writer.begin(&cash).unwrap();
    writer.commit(&mut cash).unwrap();
    writer.session_end().unwrap();

    let mut session = open(&registry, "mem://books");
    let mut book = Book::new();
    book.slots.set("title", Value::from("Household"));
    book.mark_dirty();

    let mut bank = account("bank", 1100);
    bank.mark_dirty();
    book.insert(original.clone());
    book.insert(bank.clone());
    session.sync(&mut book).unwrap();

    let synced = book.get(&cash.guid).unwrap();
    assert_eq!(synced.version, 2);
    assert_eq!(synced.slots.get_slot("name"), Some(&Value::from("till")));

    let mut fresh = Book::new();
    session.load(&mut fresh).unwrap();
    assert!(fresh.contains(&bank.guid));
    assert_eq!(fresh.slots.get_slot("title"), Some(&Value::from("Household")));
    assert_eq!(fresh.guid, book.guid);
}

#[test]
fn test_query_merge_is_idempotent() {
    let (registry, _store) = setup();
    let mut writer = open(&registry, "mem://books");
    for (name, code) in [("cash", 1000), ("bank", 1100), ("rent", 5000)] {
        save(&mut writer, &mut account(name, code));
    }
    let mut other = Instance::new("Budget");
    save(&mut writer, &mut other);
    writer.session_end().unwrap();

    let mut session = registry.new_session("mem://books").unwrap();
    let mut config = Frame::new();
    config.set_path(CONFIG_LOAD_EAGER, Value::from(0)).unwrap();
    config.set_path(CONFIG_REFERENCE_TYPES, Value::List(Vec::new())).unwrap();
    session.load_config(config).unwrap();
    session.session_begin(false, false).unwrap();

    let mut book = Book::new();
    session.load(&mut book).unwrap();
    assert!(book.is_empty());

    let query = Query::search_for("Account").with_term("code", CompareOp::Lt, Value::from(5000));
    let handle = session.compile_query(&query).unwrap();
    assert_eq!(session.run_query(&mut book, &handle).unwrap(), 2);
    assert_eq!(session.run_query(&mut book, &handle).unwrap(), 0);
    assert_eq!(book.len(), 2);
    assert_eq!(book.instances_of("Account").count(), 2);

    session.free_query(handle).unwrap();
}

#[test]
fn test_freed_or_foreign_handles_are_rejected() {
    let (registry, _store) = setup();
    let mut first = open(&registry, "mem://a");
    let mut second = open(&registry, "mem://b");
    let mut book = Book::new();

    let first_handle = first.compile_query(&Query::search_for("Budget")).unwrap();
    let second_handle = second.compile_query(&Query::search_for("Account")).unwrap();
    assert_eq!(first_handle.id(), second_handle.id());

    assert!(matches!(first.run_query(&mut book, &second_handle), Err(BackendError::Misuse(_))));
    assert_eq!(first.get_error(), ErrorCode::Misuse);
    assert!(matches!(second.run_query(&mut book, &first_handle), Err(BackendError::Misuse(_))));
    assert_eq!(second.get_error(), ErrorCode::Misuse);

    assert_eq!(first.run_query(&mut book, &first_handle).unwrap(), 0);
    assert_eq!(second.run_query(&mut book, &second_handle).unwrap(), 0);

    let issuer = first_handle.issuer();
    let id = first_handle.id();
    assert!(matches!(second.free_query(first_handle), Err(BackendError::Misuse(_))));
    assert!(matches!(first.free_query(second_handle), Err(BackendError::Misuse(_))));

    let replay = ledgerkv::QueryHandle::new(issuer, id);
    first.free_query(replay).unwrap();
    let replay = ledgerkv::QueryHandle::new(issuer, id);
    assert!(matches!(first.run_query(&mut book, &replay), Err(BackendError::Misuse(_))));
    assert_eq!(first.peek_error(), ErrorCode::Misuse);
}

#[test]
fn test_counters_start_at_one() {
    let (registry, _store) = setup();
    let mut session = open(&registry, "mem://books");
    assert_eq!(session.counter_value("invoice"), 1);
    assert_eq!(session.counter_value("invoice"), 2);
    assert_eq!(session.counter("bill").unwrap(), 1);
    assert_eq!(session.counter_value(""), COUNTER_ERROR);
    assert_eq!(session.get_error(), ErrorCode::Misuse);
}

#[test]
fn test_events_from_another_session() {
    let (registry, _store) = setup();
    let mut first = open(&registry, "mem://shared");
    let mut cash = account("cash", 1000);
    save(&mut first, &mut cash);
    let mut book = Book::new();
    first.load(&mut book).unwrap();
    assert!(!first.events_pending());

    let mut second = registry.new_session("mem://shared").unwrap();
    second.session_begin(true, false).unwrap();
    let mut renamed = cash.clone();
    second.begin(&renamed).unwrap();
    renamed.slots.set("name", Value::from("till"));
    second.commit(&mut renamed).unwrap();

    assert!(first.events_pending());
    assert!(first.process_events(&mut book).unwrap());
    assert_eq!(book.get(&cash.guid).unwrap().slots.get_slot("name"), Some(&Value::from("till")));
    assert!(!first.process_events(&mut book).unwrap());
}

#[test]
fn test_config_roundtrip_and_validation() {
    let (registry, _store) = setup();
    let mut session = open(&registry, "mem://books");
    assert_eq!(session.get_config().get_slot_at(CONFIG_LOAD_EAGER), Some(&Value::from(1)));

    let mut bad = Frame::new();
    bad.set_path(CONFIG_REFERENCE_TYPES, Value::from("Account")).unwrap();
    assert!(session.load_config(bad).is_err());
    assert_eq!(session.get_error(), ErrorCode::Misuse);
    assert_eq!(session.get_config().get_slot_at(CONFIG_REFERENCE_TYPES), Some(&Value::List(Vec::new())));
}

#[test]
fn test_save_may_clobber_and_progress() {
    let (registry, _store) = setup();
    let mut session = open(&registry, "mem://books");
    assert!(!session.save_may_clobber_data());

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    session.set_percentage(Some(Box::new(move |message: Option<&str>, pct: f64| {
        sink.lock().unwrap().push((message.map(str::to_string), pct));
    })));

    let mut book = Book::new();
    session.sync(&mut book).unwrap();
    assert!(session.save_may_clobber_data());

    let messages = messages.lock().unwrap();
    assert_eq!(messages.first().map(|m| m.1), Some(0.0));
    assert_eq!(messages.last().map(|m| m.1), Some(100.0));
}

#[test]
fn test_error_stack_pops() {
    let (registry, _store) = setup();
    let mut session = registry.new_session("mem://books").unwrap();
    let mut book = Book::new();
    assert!(session.load(&mut book).is_err());

    assert_eq!(session.peek_error(), ErrorCode::Misuse);
    assert_eq!(session.get_error(), ErrorCode::Misuse);
    assert_eq!(session.get_error(), ErrorCode::NoError);
    assert!(session.get_message().is_some());
    assert!(session.get_message().is_none());
}
