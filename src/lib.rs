//! ledgerkv: a provider registry and session layer over pluggable storage
//! backends, plus the hierarchical frame/value store they share.

pub mod commands;
pub mod config;
pub mod registry;
pub mod session;

pub use ledgerkv_core::*;
pub use registry::ProviderRegistry;
pub use session::{Session, SessionState, COUNTER_ERROR};
