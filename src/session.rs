use std::{collections::HashSet, sync::Arc};

use ledgerkv_core::{
    Backend, BackendError, BackendProvider, Book, ErrorCode, ErrorStack, Frame, Instance, Location,
    PercentageFn, Query, QueryHandle,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Returned by `Session::counter_value` when the counter could not be read.
pub const COUNTER_ERROR: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Active,
    Ended,
}

/// One backend bound to one location.
///
/// The session enforces call ordering for every provider: nothing but
/// configuration before `session_begin`, nothing at all after `session_end`,
/// and `commit`/`rollback` only for instances opened with `begin`. Failures
/// are returned and also left on the session's `ErrorStack`.
pub struct Session {
    location: Location,
    provider: Arc<dyn BackendProvider>,
    backend: Box<dyn Backend>,
    state: SessionState,
    open_edits: HashSet<Uuid>,
    queries: HashSet<(Uuid, u64)>,
    errors: ErrorStack,
}

impl Session {
    pub fn new(location: Location, provider: Arc<dyn BackendProvider>) -> Self {
        let backend = provider.create_backend();
        Self {
            location,
            provider,
            backend,
            state: SessionState::Unconnected,
            open_edits: HashSet::new(),
            queries: HashSet::new(),
            errors: ErrorStack::new(),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn provider(&self) -> &Arc<dyn BackendProvider> {
        &self.provider
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Pops the last recorded error code.
    pub fn get_error(&mut self) -> ErrorCode {
        self.errors.get_error()
    }

    pub fn peek_error(&self) -> ErrorCode {
        self.errors.peek_error()
    }

    /// Pops the last recorded error message.
    pub fn get_message(&mut self) -> Option<String> {
        self.errors.get_message()
    }

    pub fn errors_mut(&mut self) -> &mut ErrorStack {
        &mut self.errors
    }

    fn record<T>(&mut self, op: &str, result: Result<T, BackendError>) -> Result<T, BackendError> {
        if let Err(e) = &result {
            warn!(location = %self.location, op, error = %e, "Backend operation failed");
            self.errors.record(e);
        }
        result
    }

    fn ensure_active(&self, op: &str) -> Result<(), BackendError> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Unconnected => Err(BackendError::Misuse(format!("{} before session_begin", op))),
            SessionState::Ended => Err(BackendError::Misuse(format!("{} after session_end", op))),
        }
    }

    pub fn session_begin(&mut self, ignore_lock: bool, create_if_nonexistent: bool) -> Result<(), BackendError> {
        let result = match self.state {
            SessionState::Unconnected => {
                self.backend
                    .session_begin(&self.location, ignore_lock, create_if_nonexistent)
            }
            SessionState::Active => Err(BackendError::Misuse("session already begun".to_string())),
            SessionState::Ended => Err(BackendError::Misuse("session_begin after session_end".to_string())),
        };
        self.record("session_begin", result)?;
        self.state = SessionState::Active;
        debug!(location = %self.location, provider = self.provider.name(), ignore_lock, "Session begun");
        Ok(())
    }

    /// Frees outstanding queries, releases the backend's locks and moves to
    /// `Ended` even if the backend reports a failure.
    pub fn session_end(&mut self) -> Result<(), BackendError> {
        if let Err(e) = self.ensure_active("session_end") {
            return self.record("session_end", Err(e));
        }
        for (issuer, id) in std::mem::take(&mut self.queries) {
            if let Err(e) = self.backend.free_query(QueryHandle::new(issuer, id)) {
                warn!(location = %self.location, handle = id, error = %e, "Failed to free query");
            }
        }
        self.open_edits.clear();
        self.state = SessionState::Ended;
        let result = self.backend.session_end();
        debug!(location = %self.location, "Session ended");
        self.record("session_end", result)
    }

    pub fn load(&mut self, book: &mut Book) -> Result<(), BackendError> {
        let result = self.ensure_active("load").and_then(|_| self.backend.load(book));
        self.record("load", result)
    }

    pub fn begin(&mut self, instance: &Instance) -> Result<(), BackendError> {
        let result = self.ensure_active("begin").and_then(|_| self.backend.begin(instance));
        if result.is_ok() {
            self.open_edits.insert(instance.guid);
        }
        self.record("begin", result)
    }

    /// A failed commit leaves the edit open so it can be rolled back.
    pub fn commit(&mut self, instance: &mut Instance) -> Result<(), BackendError> {
        let result = self
            .ensure_active("commit")
            .and_then(|_| self.ensure_open(instance.guid, "commit"))
            .and_then(|_| self.backend.commit(instance));
        if result.is_ok() {
            self.open_edits.remove(&instance.guid);
        }
        self.record("commit", result)
    }

    /// Closes the edit whatever the backend reports.
    pub fn rollback(&mut self, instance: &mut Instance) -> Result<(), BackendError> {
        let result = self
            .ensure_active("rollback")
            .and_then(|_| self.ensure_open(instance.guid, "rollback"));
        let result = match result {
            Ok(()) => {
                self.open_edits.remove(&instance.guid);
                self.backend.rollback(instance)
            }
            Err(e) => Err(e),
        };
        self.record("rollback", result)
    }

    fn ensure_open(&self, guid: Uuid, op: &str) -> Result<(), BackendError> {
        if self.open_edits.contains(&guid) {
            Ok(())
        } else {
            Err(BackendError::Misuse(format!("{} of {} without begin", op, guid)))
        }
    }

    pub fn compile_query(&mut self, query: &Query) -> Result<QueryHandle, BackendError> {
        let result = self
            .ensure_active("compile_query")
            .and_then(|_| self.backend.compile_query(query));
        if let Ok(handle) = &result {
            self.queries.insert((handle.issuer(), handle.id()));
        }
        self.record("compile_query", result)
    }

    /// Merges the query's results into `book`; returns how many instances
    /// were inserted or refreshed.
    pub fn run_query(&mut self, book: &mut Book, handle: &QueryHandle) -> Result<usize, BackendError> {
        let result = self
            .ensure_active("run_query")
            .and_then(|_| self.ensure_live(handle))
            .and_then(|_| self.backend.run_query(book, handle));
        self.record("run_query", result)
    }

    pub fn free_query(&mut self, handle: QueryHandle) -> Result<(), BackendError> {
        let result = self
            .ensure_active("free_query")
            .and_then(|_| self.ensure_live(&handle));
        let result = match result {
            Ok(()) => {
                self.queries.remove(&(handle.issuer(), handle.id()));
                self.backend.free_query(handle)
            }
            Err(e) => Err(e),
        };
        self.record("free_query", result)
    }

    fn ensure_live(&self, handle: &QueryHandle) -> Result<(), BackendError> {
        if self.queries.contains(&(handle.issuer(), handle.id())) {
            Ok(())
        } else {
            Err(BackendError::Misuse(format!("query handle {} is not live", handle.id())))
        }
    }

    pub fn sync(&mut self, book: &mut Book) -> Result<(), BackendError> {
        let result = self.ensure_active("sync").and_then(|_| self.backend.sync(book));
        self.record("sync", result)
    }

    pub fn counter(&mut self, name: &str) -> Result<i64, BackendError> {
        let result = self.ensure_active("counter").and_then(|_| self.backend.counter(name));
        self.record("counter", result)
    }

    /// Like `counter`, but reports failure as `COUNTER_ERROR`. The cause is
    /// left on the error stack.
    pub fn counter_value(&mut self, name: &str) -> i64 {
        self.counter(name).unwrap_or(COUNTER_ERROR)
    }

    pub fn events_pending(&self) -> bool {
        self.is_active() && self.backend.events_pending()
    }

    /// True if `book` changed.
    pub fn process_events(&mut self, book: &mut Book) -> Result<bool, BackendError> {
        let result = self
            .ensure_active("process_events")
            .and_then(|_| self.backend.process_events(book));
        self.record("process_events", result)
    }

    /// Accepted before `session_begin` as well as while active.
    pub fn load_config(&mut self, config: Frame) -> Result<(), BackendError> {
        let result = if self.state == SessionState::Ended {
            Err(BackendError::Misuse("load_config after session_end".to_string()))
        } else {
            self.backend.load_config(config)
        };
        self.record("load_config", result)
    }

    pub fn get_config(&self) -> Frame {
        self.backend.get_config()
    }

    pub fn save_may_clobber_data(&self) -> bool {
        self.is_active() && self.backend.save_may_clobber_data()
    }

    pub fn set_percentage(&mut self, callback: Option<PercentageFn>) {
        self.backend.set_percentage(callback);
    }

    pub fn full_path(&self) -> Option<&str> {
        self.backend.full_path()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.session_end() {
                warn!(location = %self.location, error = %e, "Failed to end session on drop");
            }
        }
    }
}
