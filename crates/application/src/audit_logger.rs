//! Bounded in-memory audit trail of dispatch decisions.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use pixelrelay_core::{EventId, IntegrationId};
use pixelrelay_domain::{
    DecisionSnapshot, DispatchAuditLogEntry, DispatchDecision, IntegrationType, SkipReason,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use crate::relay_ports::AuditSink;

/// Commands consumed by the sink writer task.
enum SinkCommand {
    /// Mirror one entry to the sink.
    Append(DispatchAuditLogEntry),
    /// Acknowledge once every earlier append has been attempted.
    Flush(oneshot::Sender<()>),
}

/// Append-only ring buffer mirrored to an external sink.
///
/// Entries are only ever pushed or evicted from the front; nothing is edited
/// in place. Sink writes run on a background task so recording a decision
/// never waits on the sink.
pub struct AuditLogger {
    max_entries: usize,
    entries: RwLock<VecDeque<DispatchAuditLogEntry>>,
    sink_queue: mpsc::Sender<SinkCommand>,
}

impl AuditLogger {
    /// Creates a logger retaining at most `max_entries` in memory.
    ///
    /// Spawns the sink writer, so this must run inside a Tokio runtime. The
    /// writer stops once the logger is dropped and its queue is empty.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        let (sink_queue, receiver) = mpsc::channel(max_entries);
        tokio::spawn(run_sink_writer(sink, receiver));

        Self {
            max_entries,
            entries: RwLock::new(VecDeque::with_capacity(max_entries)),
            sink_queue,
        }
    }

    /// Records one decision and queues it for the sink.
    ///
    /// Sink failures and a full sink queue are logged; the entry stays in
    /// the in-memory buffer either way.
    pub async fn log_dispatch(
        &self,
        event_id: EventId,
        integration_id: IntegrationId,
        integration_type: IntegrationType,
        decision: DispatchDecision,
        reason: Option<SkipReason>,
    ) -> DispatchAuditLogEntry {
        let entry = DispatchAuditLogEntry::new(
            event_id,
            integration_id,
            integration_type,
            decision,
            reason,
            Utc::now(),
        );

        {
            let mut entries = self.entries.write().await;
            entries.push_back(entry.clone());
            while entries.len() > self.max_entries {
                entries.pop_front();
            }
        }

        debug!(
            event_id = %event_id,
            integration_id = %integration_id,
            integration_type = %integration_type,
            decision = %decision,
            reason = reason.map(|value| value.as_str()),
            "dispatch decision recorded"
        );

        match self.sink_queue.try_send(SinkCommand::Append(entry.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                event_id = %event_id,
                integration_id = %integration_id,
                "audit sink queue full; decision kept in memory only"
            ),
            Err(TrySendError::Closed(_)) => warn!(
                event_id = %event_id,
                integration_id = %integration_id,
                "audit sink writer stopped; decision kept in memory only"
            ),
        }

        entry
    }

    /// Waits until every decision queued so far has been offered to the sink.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sink_queue.send(SinkCommand::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Returns the newest `limit` entries, oldest first.
    pub async fn recent_logs(&self, limit: usize) -> Vec<DispatchAuditLogEntry> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Returns the number of retained entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns whether nothing has been retained.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

async fn run_sink_writer(sink: Arc<dyn AuditSink>, mut receiver: mpsc::Receiver<SinkCommand>) {
    while let Some(command) = receiver.recv().await {
        match command {
            SinkCommand::Append(entry) => {
                if let Err(error) = sink.append(&entry).await {
                    warn!(
                        event_id = %entry.event_id(),
                        integration_id = %entry.integration_id(),
                        error = %error,
                        "failed to mirror dispatch decision to audit sink"
                    );
                }
            }
            SinkCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Explains one audit entry for operators. Pure; never affects dispatch.
#[must_use]
pub fn build_decision_snapshot(
    entry: &DispatchAuditLogEntry,
    event_kind: &str,
    entity_type: &str,
    entity_id: Option<&str>,
) -> DecisionSnapshot {
    DecisionSnapshot::build(entry, event_kind, entity_type, entity_id)
}
