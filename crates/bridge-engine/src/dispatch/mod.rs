//! Inbound command dispatch.

pub mod registry;

pub use registry::{current_connection, CommandHandler, DispatchEntry, DispatchRegistry};
