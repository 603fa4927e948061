//! # botpulse-metrics
//!
//! Conversation analytics: runtime events in, time-series points out.
//!
//! This crate provides:
//! - Field and tag extraction from subscribers, blocks and events
//! - Subject classification of blocks
//! - Per-event translation into metric records
//! - A fail-open point writer with a hot-reloadable sink connection
//! - The hook interface the host runtime calls, and a channel dispatcher

pub mod classify;
pub mod extract;
mod hooks;
mod point;
mod sink;
pub mod translate;
mod writer;

pub use classify::classify;
pub use hooks::{spawn_dispatcher, DispatchSummary, EventHooks, HostEvent, MetricsRecorder};
pub use point::{FieldValue, Fields, MetricRecord, Point, Tags, VALUE_FIELD};
pub use sink::{
    fixed_connector, http_connector, write_url, HttpSink, MemorySink, PointSink, SinkConnector,
};
pub use translate::SubjectConfig;
pub use writer::{PointWriter, SinkConnection};
