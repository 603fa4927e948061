//! Event translation
//!
//! One function per observed event kind, each turning a host payload into a
//! [`MetricRecord`]. `None` means the event produces no point: a required
//! companion object is missing or the event kind is not tracked.

use botpulse_core::{
    Block, ChannelEvent, ConversationContext, StatKind, Subscriber, SubjectRules,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::classify::classify;
use crate::extract::{block_fields, channel_tag, message_tags, plugin_fields, subscriber_fields};
use crate::point::MetricRecord;

pub const MESSAGE_SENT: &str = "Event - message sent";
pub const MESSAGE_RECEIVED: &str = "Event - message received";
pub const BLOCK: &str = "Block";
pub const HANDOVER: &str = "Handover";
pub const HANDBACK: &str = "Handback";
pub const LOCAL_FALLBACK: &str = "Local Fallback";
pub const GLOBAL_FALLBACK: &str = "Global Fallback";
pub const INTERVENTION_OPENED: &str = "Intervention Opened";
pub const PLUGIN: &str = "Plugin";
pub const STATS: &str = "Stats";

/// Subject rules plus the tag key the resolved subject is written under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectConfig {
    pub rules: SubjectRules,
    pub tag: String,
}

impl SubjectConfig {
    pub fn new(rules: SubjectRules, tag: impl Into<String>) -> Self {
        Self {
            rules,
            tag: tag.into(),
        }
    }
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self::new(SubjectRules::default(), "subject")
    }
}

/// Message tags plus the channel and type tags every message-like point has
fn message_record(name: &str, event: &ChannelEvent, kind: &str) -> MetricRecord {
    MetricRecord::new(name, 1.0)
        .with_tags(message_tags(event))
        .tag("channel", channel_tag(event.channel.as_deref()))
        .tag("type", kind)
        .with_fields(subscriber_fields(&event.subscriber))
}

pub fn message_sent(event: &ChannelEvent) -> Option<MetricRecord> {
    Some(message_record(MESSAGE_SENT, event, "message"))
}

pub fn message_received(event: &ChannelEvent) -> Option<MetricRecord> {
    Some(message_record(MESSAGE_RECEIVED, event, "message"))
}

/// A block was executed; skipped when the block has no name
pub fn block_triggered(
    event: &ChannelEvent,
    block: &Block,
    context: Option<&ConversationContext>,
    subject: &SubjectConfig,
) -> Option<MetricRecord> {
    if block.name.is_empty() {
        debug!("Skipping block event without a block name");
        return None;
    }

    Some(
        message_record(BLOCK, event, "block")
            .tag(subject.tag.clone(), classify(&block.name, &subject.rules))
            .with_fields(block_fields(Some(event), block, context)),
    )
}

/// Conversation passed to a human (`assigned`) or back to the bot
pub fn handover(subscriber: &Subscriber, assigned: bool) -> Option<MetricRecord> {
    let name = if assigned { HANDOVER } else { HANDBACK };
    Some(
        MetricRecord::new(name, 1.0)
            .tag("channel", channel_tag(subscriber.channel.as_deref()))
            .tag("type", "passation")
            .with_fields(subscriber_fields(subscriber)),
    )
}

/// A block-level fallback fired; block fields only when a named block is known
pub fn local_fallback(
    event: &ChannelEvent,
    block: Option<&Block>,
    context: Option<&ConversationContext>,
) -> Option<MetricRecord> {
    let record = message_record(LOCAL_FALLBACK, event, "fallback");
    Some(match block.filter(|b| !b.name.is_empty()) {
        Some(block) => record.with_fields(block_fields(Some(event), block, context)),
        None => record,
    })
}

pub fn global_fallback(event: &ChannelEvent) -> Option<MetricRecord> {
    Some(message_record(GLOBAL_FALLBACK, event, "fallback"))
}

/// A human agent opened the conversation of a previously assigned subscriber
///
/// The value is the delay since assignment in minutes. Nothing is recorded
/// unless the assignment time is strictly after the epoch.
pub fn intervention_opened(subscriber: &Subscriber, now: DateTime<Utc>) -> Option<MetricRecord> {
    let assigned_at = subscriber
        .assigned_at
        .filter(|at| at.timestamp_millis() > 0)?;

    let assigned_ms = assigned_at.timestamp_millis();
    let opened_ms = now.timestamp_millis();
    let delay_sec = (opened_ms - assigned_ms) as f64 / 1000.0;
    let delay_min = delay_sec / 60.0;
    let delay_hours = delay_min / 60.0;

    Some(
        MetricRecord::new(INTERVENTION_OPENED, delay_min)
            .tag("channel", channel_tag(subscriber.channel.as_deref()))
            .tag("type", "intervention")
            .with_fields(subscriber_fields(subscriber))
            .field(
                "assigned_at",
                assigned_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
            .field("opened_at", now.to_rfc3339_opts(SecondsFormat::Millis, true))
            .field("assigned_at_ms", assigned_ms)
            .field("opened_at_ms", opened_ms)
            .field("intervention_delay_sec", delay_sec)
            .field("intervention_delay_min", delay_min)
            .field("intervention_delay_hours", delay_hours),
    )
}

/// A plugin ran inside a block
///
/// Block, subscriber and title fields take precedence over same-named keys
/// in the plugin's own payload.
pub fn plugin_executed(
    block: &Block,
    context: &ConversationContext,
    title: &str,
    extra: &Map<String, Value>,
) -> Option<MetricRecord> {
    if block.name.is_empty() {
        debug!("Skipping plugin event without a block name");
        return None;
    }

    let mut record = MetricRecord::new(PLUGIN, 1.0)
        .tag("channel", channel_tag(context.channel.as_deref()))
        .tag("type", "plugin")
        .with_fields(block_fields(None, block, Some(context)))
        .field("plugin", title);

    if let Some(user) = &context.user {
        record = record.with_fields(subscriber_fields(user));
    }

    for (key, value) in plugin_fields(extra) {
        record.fields.entry(key).or_insert(value);
    }

    Some(record)
}

/// Aggregate stat entry; only new and returning users are recorded
pub fn stat_entry(
    kind: StatKind,
    name: &str,
    subscriber: Option<&Subscriber>,
) -> Option<MetricRecord> {
    if !kind.is_tracked() {
        return None;
    }
    let subscriber = subscriber?;

    Some(
        MetricRecord::new(STATS, 1.0)
            .tag("channel", channel_tag(subscriber.channel.as_deref()))
            .tag("name", name)
            .tag("type", kind.to_string())
            .with_fields(subscriber_fields(subscriber)),
    )
}
