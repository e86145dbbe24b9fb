//! # Messaging
//!
//! Inbound completion message formats.

pub mod completion_message;

pub use completion_message::{CompletionMessage, PendingMessage};
