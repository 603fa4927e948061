//! Event hooks the host runtime calls into
//!
//! [`EventHooks`] has one method per observed event. [`MetricsRecorder`]
//! implements it by translating the payload and writing the resulting point.
//! Hosts that prefer message passing send [`HostEvent`]s to the task started
//! by [`spawn_dispatcher`].

use arc_swap::ArcSwap;
use async_trait::async_trait;
use botpulse_core::{
    Block, ChannelEvent, ConversationContext, MetricsConfig, Result, Secret, StatKind,
    Subscriber,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::point::MetricRecord;
use crate::translate::{self, SubjectConfig};
use crate::writer::PointWriter;

/// Observed runtime events
///
/// Each method returns whether it took effect: a point was written, or a
/// configuration change was applied.
#[async_trait]
pub trait EventHooks: Send + Sync {
    async fn message_sent(&self, event: &ChannelEvent) -> bool;

    async fn message_received(&self, event: &ChannelEvent) -> bool;

    async fn block_triggered(
        &self,
        event: &ChannelEvent,
        block: &Block,
        context: Option<&ConversationContext>,
    ) -> bool;

    /// `assigned` is true when a human takes over, false on hand-back
    async fn handover(&self, subscriber: &Subscriber, assigned: bool) -> bool;

    async fn global_fallback(&self, event: &ChannelEvent) -> bool;

    async fn local_fallback(
        &self,
        event: &ChannelEvent,
        block: Option<&Block>,
        context: Option<&ConversationContext>,
    ) -> bool;

    async fn intervention_opened(&self, subscriber: &Subscriber) -> bool;

    async fn plugin_executed(
        &self,
        block: &Block,
        context: &ConversationContext,
        title: &str,
        extra: &Map<String, Value>,
    ) -> bool;

    async fn stat_entry(&self, kind: StatKind, name: &str, subscriber: Option<&Subscriber>)
        -> bool;

    async fn endpoint_changed(&self, endpoint: &str) -> bool;

    async fn credential_changed(&self, credential: Secret) -> bool;
}

/// Turns runtime events into time-series points
pub struct MetricsRecorder {
    writer: PointWriter,
    subjects: ArcSwap<SubjectConfig>,
}

impl MetricsRecorder {
    pub fn new(writer: PointWriter, subjects: SubjectConfig) -> Self {
        Self {
            writer,
            subjects: ArcSwap::from_pointee(subjects),
        }
    }

    /// Recorder writing over HTTP as described by `config`
    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        let writer = PointWriter::http(config.sink_settings())?;
        Ok(Self::new(
            writer,
            SubjectConfig::new(config.subject_rules(), config.subject_tag.clone()),
        ))
    }

    pub fn writer(&self) -> &PointWriter {
        &self.writer
    }

    /// Subject rules used by subsequent block events
    pub fn update_subjects(&self, subjects: SubjectConfig) {
        self.subjects.store(Arc::new(subjects));
    }

    async fn record(&self, hook: &str, record: Option<MetricRecord>) -> bool {
        match record {
            Some(record) => self.writer.write(record).await,
            None => {
                debug!("{} produced no point", hook);
                false
            }
        }
    }
}

#[async_trait]
impl EventHooks for MetricsRecorder {
    async fn message_sent(&self, event: &ChannelEvent) -> bool {
        self.record("message_sent", translate::message_sent(event))
            .await
    }

    async fn message_received(&self, event: &ChannelEvent) -> bool {
        self.record("message_received", translate::message_received(event))
            .await
    }

    async fn block_triggered(
        &self,
        event: &ChannelEvent,
        block: &Block,
        context: Option<&ConversationContext>,
    ) -> bool {
        let subjects = self.subjects.load_full();
        self.record(
            "block_triggered",
            translate::block_triggered(event, block, context, &subjects),
        )
        .await
    }

    async fn handover(&self, subscriber: &Subscriber, assigned: bool) -> bool {
        self.record("handover", translate::handover(subscriber, assigned))
            .await
    }

    async fn global_fallback(&self, event: &ChannelEvent) -> bool {
        self.record("global_fallback", translate::global_fallback(event))
            .await
    }

    async fn local_fallback(
        &self,
        event: &ChannelEvent,
        block: Option<&Block>,
        context: Option<&ConversationContext>,
    ) -> bool {
        self.record(
            "local_fallback",
            translate::local_fallback(event, block, context),
        )
        .await
    }

    async fn intervention_opened(&self, subscriber: &Subscriber) -> bool {
        self.record(
            "intervention_opened",
            translate::intervention_opened(subscriber, Utc::now()),
        )
        .await
    }

    async fn plugin_executed(
        &self,
        block: &Block,
        context: &ConversationContext,
        title: &str,
        extra: &Map<String, Value>,
    ) -> bool {
        self.record(
            "plugin_executed",
            translate::plugin_executed(block, context, title, extra),
        )
        .await
    }

    async fn stat_entry(
        &self,
        kind: StatKind,
        name: &str,
        subscriber: Option<&Subscriber>,
    ) -> bool {
        self.record("stat_entry", translate::stat_entry(kind, name, subscriber))
            .await
    }

    async fn endpoint_changed(&self, endpoint: &str) -> bool {
        match self.writer.set_endpoint(endpoint) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring endpoint change: {}", e);
                false
            }
        }
    }

    async fn credential_changed(&self, credential: Secret) -> bool {
        match self.writer.set_credential(credential) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring credential change: {}", e);
                false
            }
        }
    }
}

/// A hook invocation as a message, e.g. `{"hook": "handover", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum HostEvent {
    MessageSent {
        event: ChannelEvent,
    },
    MessageReceived {
        event: ChannelEvent,
    },
    BlockTriggered {
        event: ChannelEvent,
        block: Block,
        context: Option<ConversationContext>,
    },
    Handover {
        subscriber: Subscriber,
        assigned: bool,
    },
    GlobalFallback {
        event: ChannelEvent,
    },
    LocalFallback {
        event: ChannelEvent,
        block: Option<Block>,
        context: Option<ConversationContext>,
    },
    InterventionOpened {
        subscriber: Subscriber,
    },
    PluginExecuted {
        block: Block,
        #[serde(default)]
        context: ConversationContext,
        title: String,
        #[serde(default)]
        extra: Map<String, Value>,
    },
    StatEntry {
        kind: StatKind,
        name: String,
        subscriber: Option<Subscriber>,
    },
    EndpointChanged {
        endpoint: String,
    },
    CredentialChanged {
        credential: String,
    },
}

impl HostEvent {
    /// Parse one JSON-encoded hook invocation
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether this event reconfigures the sink rather than recording a point
    pub fn is_config_change(&self) -> bool {
        matches!(
            self,
            Self::EndpointChanged { .. } | Self::CredentialChanged { .. }
        )
    }

    /// Hook name, as used in the `hook` tag
    pub fn hook(&self) -> &'static str {
        match self {
            Self::MessageSent { .. } => "message_sent",
            Self::MessageReceived { .. } => "message_received",
            Self::BlockTriggered { .. } => "block_triggered",
            Self::Handover { .. } => "handover",
            Self::GlobalFallback { .. } => "global_fallback",
            Self::LocalFallback { .. } => "local_fallback",
            Self::InterventionOpened { .. } => "intervention_opened",
            Self::PluginExecuted { .. } => "plugin_executed",
            Self::StatEntry { .. } => "stat_entry",
            Self::EndpointChanged { .. } => "endpoint_changed",
            Self::CredentialChanged { .. } => "credential_changed",
        }
    }

    /// Invoke the matching hook
    pub async fn dispatch<H>(&self, hooks: &H) -> bool
    where
        H: EventHooks + ?Sized,
    {
        match self {
            Self::MessageSent { event } => hooks.message_sent(event).await,
            Self::MessageReceived { event } => hooks.message_received(event).await,
            Self::BlockTriggered {
                event,
                block,
                context,
            } => hooks.block_triggered(event, block, context.as_ref()).await,
            Self::Handover {
                subscriber,
                assigned,
            } => hooks.handover(subscriber, *assigned).await,
            Self::GlobalFallback { event } => hooks.global_fallback(event).await,
            Self::LocalFallback {
                event,
                block,
                context,
            } => {
                hooks
                    .local_fallback(event, block.as_ref(), context.as_ref())
                    .await
            }
            Self::InterventionOpened { subscriber } => hooks.intervention_opened(subscriber).await,
            Self::PluginExecuted {
                block,
                context,
                title,
                extra,
            } => hooks.plugin_executed(block, context, title, extra).await,
            Self::StatEntry {
                kind,
                name,
                subscriber,
            } => hooks.stat_entry(*kind, name, subscriber.as_ref()).await,
            Self::EndpointChanged { endpoint } => hooks.endpoint_changed(endpoint).await,
            Self::CredentialChanged { credential } => {
                hooks.credential_changed(Secret::new(credential.clone())).await
            }
        }
    }
}

/// Totals reported by a dispatcher once its channel closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Events received
    pub handled: usize,
    /// Events whose hook took effect
    pub applied: usize,
}

impl DispatchSummary {
    fn tally(&mut self, hook: &str, applied: bool) {
        if applied {
            self.applied += 1;
        } else {
            debug!("Hook {} had no effect", hook);
        }
    }

    fn collect(&mut self, finished: std::result::Result<(&'static str, bool), JoinError>) {
        match finished {
            Ok((hook, applied)) => self.tally(hook, applied),
            Err(e) => warn!("Hook task failed: {}", e),
        }
    }
}

/// Start a task feeding channel events to `hooks`
///
/// Configuration changes are applied in arrival order before any later event
/// starts. Recording hooks each run as their own task, at most `capacity` at
/// a time, so a write stuck on the sink does not hold up the events behind
/// it. The task ends when every sender is dropped and all hook calls have
/// finished, and returns its totals.
pub fn spawn_dispatcher<H>(
    hooks: Arc<H>,
    capacity: usize,
) -> (mpsc::Sender<HostEvent>, JoinHandle<DispatchSummary>)
where
    H: EventHooks + ?Sized + 'static,
{
    let capacity = capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<HostEvent>(capacity);

    let handle = tokio::spawn(async move {
        let mut summary = DispatchSummary::default();
        let mut in_flight: JoinSet<(&'static str, bool)> = JoinSet::new();

        while let Some(event) = rx.recv().await {
            summary.handled += 1;

            if event.is_config_change() {
                let applied = event.dispatch(hooks.as_ref()).await;
                summary.tally(event.hook(), applied);
                continue;
            }

            while in_flight.len() >= capacity {
                if let Some(finished) = in_flight.join_next().await {
                    summary.collect(finished);
                }
            }

            let hooks = Arc::clone(&hooks);
            in_flight.spawn(async move {
                let applied = event.dispatch(hooks.as_ref()).await;
                (event.hook(), applied)
            });
        }

        while let Some(finished) = in_flight.join_next().await {
            summary.collect(finished);
        }

        debug!(
            "Dispatcher stopped after {} events ({} applied)",
            summary.handled, summary.applied
        );
        summary
    });

    (tx, handle)
}
