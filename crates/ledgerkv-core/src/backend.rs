use thiserror::Error;

use crate::{
    book::{Book, Instance},
    frame::Frame,
    location::Location,
    query::{Query, QueryHandle},
};

/// Protocol-level error codes, as kept on an `ErrorStack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    #[default]
    NoError,
    NoHandler,
    BadLocation,
    NoSuchLocation,
    Locked,
    ModifyDestroyed,
    Misuse,
    Unsupported,
    StorageFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("no backend provider accepts {0}")]
    NoHandler(String),
    #[error("invalid location: {0}")]
    BadLocation(String),
    #[error("no such location: {0}")]
    NoSuchLocation(String),
    #[error("locked by another session: {0}")]
    Locked(String),
    #[error("object was destroyed by another session: {0}")]
    ModifyDestroyed(String),
    #[error("contract violation: {0}")]
    Misuse(String),
    #[error("not supported by this backend: {0}")]
    Unsupported(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl BackendError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BackendError::NoHandler(_) => ErrorCode::NoHandler,
            BackendError::BadLocation(_) => ErrorCode::BadLocation,
            BackendError::NoSuchLocation(_) => ErrorCode::NoSuchLocation,
            BackendError::Locked(_) => ErrorCode::Locked,
            BackendError::ModifyDestroyed(_) => ErrorCode::ModifyDestroyed,
            BackendError::Misuse(_) => ErrorCode::Misuse,
            BackendError::Unsupported(_) => ErrorCode::Unsupported,
            BackendError::StorageFailure(_) => ErrorCode::StorageFailure,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::NoHandler(m)
            | BackendError::BadLocation(m)
            | BackendError::NoSuchLocation(m)
            | BackendError::Locked(m)
            | BackendError::ModifyDestroyed(m)
            | BackendError::Misuse(m)
            | BackendError::Unsupported(m)
            | BackendError::StorageFailure(m) => m,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::StorageFailure(e.to_string())
    }
}

/// Progress callback: an optional status message and a percentage.
pub type PercentageFn = Box<dyn FnMut(Option<&str>, f64) + Send>;

/// One connection to a storage provider.
///
/// Calls arrive through a `Session`, which enforces ordering (no work before
/// `session_begin` or after `session_end`, no `commit`/`rollback` without a
/// `begin` for the same instance). Implementations only have to honour the
/// storage side of each operation. All calls block until done.
pub trait Backend: Send {
    /// Checks the location, takes the single-writer lock (clearing a foreign
    /// one when `ignore_lock` is set) and creates the store if asked to.
    fn session_begin(
        &mut self,
        location: &Location,
        ignore_lock: bool,
        create_if_nonexistent: bool,
    ) -> Result<(), BackendError>;

    /// Releases the lock and every resource held for the location.
    fn session_end(&mut self) -> Result<(), BackendError>;

    /// Loads the minimal working set the engine needs to be operable.
    fn load(&mut self, book: &mut Book) -> Result<(), BackendError>;

    /// Takes the advisory edit lock on `instance`.
    fn begin(&mut self, _instance: &Instance) -> Result<(), BackendError> {
        Ok(())
    }

    /// Persists `instance`, updating its version. Must fail with
    /// `ModifyDestroyed` if another writer destroyed it meanwhile.
    fn commit(&mut self, instance: &mut Instance) -> Result<(), BackendError>;

    /// Drops the in-progress edit and releases the edit lock.
    fn rollback(&mut self, _instance: &mut Instance) -> Result<(), BackendError> {
        Ok(())
    }

    fn compile_query(&mut self, _query: &Query) -> Result<QueryHandle, BackendError> {
        Err(BackendError::Unsupported("compile_query".to_string()))
    }

    /// Runs a compiled query, merging the results into `book`. Returns the
    /// number of instances inserted or refreshed.
    fn run_query(&mut self, _book: &mut Book, _handle: &QueryHandle) -> Result<usize, BackendError> {
        Err(BackendError::Unsupported("run_query".to_string()))
    }

    fn free_query(&mut self, _handle: QueryHandle) -> Result<(), BackendError> {
        Ok(())
    }

    /// Reconciles `book` with the store by version: the newer side wins.
    fn sync(&mut self, book: &mut Book) -> Result<(), BackendError>;

    fn load_config(&mut self, _config: Frame) -> Result<(), BackendError> {
        Ok(())
    }

    fn get_config(&self) -> Frame {
        Frame::new()
    }

    /// Increments and returns a named counter scoped to the store.
    fn counter(&mut self, name: &str) -> Result<i64, BackendError> {
        Err(BackendError::Unsupported(format!("counter '{}'", name)))
    }

    fn events_pending(&self) -> bool {
        false
    }

    /// Applies external changes to `book`; true if it changed.
    fn process_events(&mut self, _book: &mut Book) -> Result<bool, BackendError> {
        Ok(false)
    }

    /// True if saving a whole book here would overwrite existing data.
    fn save_may_clobber_data(&self) -> bool {
        false
    }

    fn set_percentage(&mut self, _callback: Option<PercentageFn>) {}

    /// The resolved location once a session has begun.
    fn full_path(&self) -> Option<&str> {
        None
    }
}

/// Catalog entry for a storage provider.
pub trait BackendProvider: Send + Sync {
    fn name(&self) -> &str;

    /// URL scheme this provider serves, without `://`.
    fn access_method(&self) -> &str;

    /// True if the provider can persist a book that references objects
    /// outside itself.
    fn partial_book_supported(&self) -> bool {
        false
    }

    fn create_backend(&self) -> Box<dyn Backend>;

    /// Whether this provider can own `location`. Several providers may share
    /// an access method; this is how they tell locations apart.
    fn check_data_type(&self, _location: &Location) -> bool {
        true
    }
}
