use crate::backend::{BackendError, ErrorCode};

/// Last error code plus a detail message, one slot deep.
///
/// Reads pop: `get_error` and `get_message` hand back what was stored and
/// clear it, so a caller has to fetch once per failing operation before the
/// next one overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorStack {
    code: ErrorCode,
    message: Option<String>,
}

impl ErrorStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error(&mut self, code: ErrorCode) {
        self.code = code;
    }

    pub fn get_error(&mut self) -> ErrorCode {
        std::mem::take(&mut self.code)
    }

    pub fn peek_error(&self) -> ErrorCode {
        self.code
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn get_message(&mut self) -> Option<String> {
        self.message.take()
    }

    /// Stores both halves of `error`.
    pub fn record(&mut self, error: &BackendError) {
        self.set_error(error.code());
        self.set_message(error.message());
    }

    pub fn is_clear(&self) -> bool {
        self.code == ErrorCode::NoError && self.message.is_none()
    }
}
