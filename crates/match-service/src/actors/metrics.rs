//! Actor metrics and mailbox monitoring.
//!
//! Mailbox levels are relative to the configured capacity:
//!
//! | Level    | Depth                 |
//! |----------|-----------------------|
//! | Normal   | <= 50% of capacity    |
//! | Warning  | 50% - 75% of capacity |
//! | Critical | > 75% of capacity     |
//!
//! A full mailbox rejects joins and drops leave and data notifications; the
//! monitor counts those drops.

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of message a mailbox rejected, for drop accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    Join,
    Leave,
    Data,
}

impl DropKind {
    /// Returns the kind as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DropKind::Join => "join",
            DropKind::Leave => "leave",
            DropKind::Data => "data",
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// At or below half of capacity.
    Normal,
    /// Between half and three quarters of capacity.
    Warning,
    /// Above three quarters of capacity.
    Critical,
}

/// Mailbox monitor shared by a match actor and its handles.
///
/// Producers record enqueues, the actor records dequeues.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Match identifier for log fields.
    match_id: String,
    /// Mailbox capacity the thresholds are derived from.
    capacity: usize,
    /// Current mailbox depth.
    depth: AtomicUsize,
    /// Highest depth the mailbox actually held.
    peak_depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
    /// Messages dropped due to backpressure.
    messages_dropped: AtomicU64,
    /// Messages discarded unprocessed when the actor closed.
    messages_discarded: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given match.
    #[must_use]
    pub fn new(match_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            match_id: match_id.into(),
            capacity,
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            messages_discarded: AtomicU64::new(0),
        }
    }

    /// Count a message about to be offered to the mailbox.
    ///
    /// Returns the depth including it. Must be followed by either
    /// `confirm_enqueue` or `revert_enqueue` once the send is decided.
    pub fn record_enqueue(&self) -> usize {
        self.depth.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record that the mailbox accepted the message counted at `depth`.
    pub fn confirm_enqueue(&self, depth: usize) {
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);

        let level = self.level_for_depth(depth);
        if level == MailboxLevel::Critical {
            warn!(
                target: "ms.actor.mailbox",
                match_id = %self.match_id,
                depth,
                capacity = self.capacity,
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning && depth == self.normal_threshold() + 1 {
            // Log once when crossing into warning
            debug!(
                target: "ms.actor.mailbox",
                match_id = %self.match_id,
                depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Undo an enqueue that the channel refused.
    pub fn revert_enqueue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a message being taken off the mailbox and processed.
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message being dropped due to backpressure.
    pub fn record_drop(&self, kind: DropKind) {
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_message_dropped(kind.as_str());
        warn!(
            target: "ms.actor.mailbox",
            match_id = %self.match_id,
            kind = kind.as_str(),
            dropped,
            "Message dropped due to backpressure"
        );
    }

    /// Record a queued message thrown away because the actor closed.
    pub fn record_discard(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Get the peak mailbox depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Get total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Get total messages dropped.
    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Get total messages discarded at close.
    #[must_use]
    pub fn messages_discarded(&self) -> u64 {
        self.messages_discarded.load(Ordering::Relaxed)
    }

    /// Get the current mailbox level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn normal_threshold(&self) -> usize {
        self.capacity / 2
    }

    fn warning_threshold(&self) -> usize {
        self.capacity * 3 / 4
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated metrics for the match actors on this node.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Matches currently registered.
    pub active_matches: AtomicUsize,
    /// Total actor panics (indicates bugs in match logic).
    pub actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment active match count.
    pub fn match_created(&self) {
        let active = self.active_matches.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_matches_active(active);
    }

    /// Decrement active match count.
    pub fn match_removed(&self) {
        let previous = self
            .active_matches
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_default();
        prom::set_matches_active(previous.saturating_sub(1));
    }

    /// Record an actor panic.
    pub fn record_panic(&self) {
        let total_panics = self.actor_panics.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_actor_panic();
        tracing::error!(
            target: "ms.actor.panic",
            total_panics,
            "Match actor panic detected - match logic bug, investigation required"
        );
    }

    /// Record a message being processed.
    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get current match count.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.active_matches.load(Ordering::Relaxed)
    }

    /// Get total panics.
    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.actor_panics.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn enqueue(monitor: &MailboxMonitor) {
        let depth = monitor.record_enqueue();
        monitor.confirm_enqueue(depth);
    }

    #[test]
    fn test_drop_kind_as_str() {
        assert_eq!(DropKind::Join.as_str(), "join");
        assert_eq!(DropKind::Leave.as_str(), "leave");
        assert_eq!(DropKind::Data.as_str(), "data");
    }

    #[test]
    fn test_mailbox_monitor_enqueue_dequeue() {
        let monitor = MailboxMonitor::new("match-123", 128);

        assert_eq!(monitor.current_depth(), 0);

        enqueue(&monitor);
        assert_eq!(monitor.current_depth(), 1);
        assert_eq!(monitor.peak_depth(), 1);

        enqueue(&monitor);
        enqueue(&monitor);
        assert_eq!(monitor.current_depth(), 3);
        assert_eq!(monitor.peak_depth(), 3);

        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 3); // Peak stays at 3
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_mailbox_monitor_levels() {
        let monitor = MailboxMonitor::new("match-123", 100);

        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        for _ in 0..60 {
            enqueue(&monitor);
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        for _ in 0..20 {
            enqueue(&monitor);
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);
    }

    #[test]
    fn test_mailbox_monitor_drop_and_discard() {
        let monitor = MailboxMonitor::new("match-123", 4);

        monitor.record_enqueue();
        monitor.revert_enqueue();
        monitor.record_drop(DropKind::Data);
        monitor.record_drop(DropKind::Join);
        assert_eq!(monitor.messages_dropped(), 2);
        assert_eq!(monitor.current_depth(), 0);

        enqueue(&monitor);
        monitor.record_discard();
        assert_eq!(monitor.current_depth(), 0);
        assert_eq!(monitor.messages_discarded(), 1);
        assert_eq!(monitor.messages_processed(), 0);
    }

    #[test]
    fn test_refused_enqueue_leaves_no_peak() {
        let monitor = MailboxMonitor::new("match-123", 4);

        for _ in 0..3 {
            enqueue(&monitor);
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        // Would have been critical had the channel taken it
        let depth = monitor.record_enqueue();
        assert_eq!(depth, 4);
        monitor.revert_enqueue();

        assert_eq!(monitor.current_depth(), 3);
        assert_eq!(monitor.peak_depth(), 3);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);
    }

    #[test]
    fn test_actor_metrics() {
        let metrics = ActorMetrics::new();
        assert_eq!(metrics.match_count(), 0);

        metrics.match_created();
        metrics.match_created();
        assert_eq!(metrics.match_count(), 2);

        metrics.match_removed();
        assert_eq!(metrics.match_count(), 1);
    }

    #[test]
    fn test_match_removed_saturates() {
        let metrics = ActorMetrics::new();
        metrics.match_removed();
        assert_eq!(metrics.match_count(), 0);
    }

    #[test]
    fn test_actor_metrics_panics() {
        let metrics = ActorMetrics::new();

        metrics.record_panic();
        metrics.record_panic();
        assert_eq!(metrics.panic_count(), 2);
    }
}
