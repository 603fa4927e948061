//! # botpulse-core
//!
//! Core types for botpulse, the conversation analytics pipeline.
//!
//! The host chatbot runtime hands us subscribers, blocks, conversation
//! contexts and channel events. This crate defines those shapes, the
//! unified error type, the settings file and the fail-open helper that keeps
//! analytics failures away from the conversation itself.

pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{MetricsConfig, Precision, Secret, SinkSettings, SubjectRules};
pub use error::{BotpulseError, Result};
pub use types::*;
