//! Core types and traits for ledgerkv storage backends.
//!
//! This crate provides the frame/value store used for object metadata and
//! backend configuration, the minimal book/instance object graph, and the
//! `Backend`/`BackendProvider` contract that storage providers implement in
//! separate crates.

pub mod backend;
pub mod book;
pub mod error_stack;
pub mod frame;
pub mod location;
pub mod numeric;
pub mod path;
pub mod query;
pub mod value;

// Re-export key types at crate root for convenience
pub use backend::{Backend, BackendError, BackendProvider, ErrorCode, PercentageFn};
pub use book::{Book, Instance};
pub use error_stack::ErrorStack;
pub use frame::{compare, Frame, FrameError};
pub use location::Location;
pub use numeric::{Numeric, ValueError};
pub use path::Path;
pub use query::{CompareOp, Query, QueryHandle, QueryTerm};
pub use value::{Value, ValueType};
