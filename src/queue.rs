//! The event queue and its single-flight pacing state.
//!
//! Server events must become *visible* one at a time: the reveal animation
//! for one card has to finish before the next event is shown, and a resolved
//! trick stays on the table until the user acknowledges it (or a fallback
//! timeout fires). [`DrainQueue`] owns the FIFO buffer and the single
//! "resumption handle" that encodes those rules; the client loop asks it when
//! to wake up and which event is ready.
//!
//! Invariants:
//!
//! - events leave the queue strictly in arrival order, across batches;
//! - at most one resumption is pending at any time — arming a new delay or
//!   ack wait overwrites (and thereby cancels) the previous one;
//! - resuming is idempotent: acknowledging an already-resumed wait, or a
//!   fallback deadline firing after the user already acknowledged, is a
//!   no-op.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::event::GameEvent;

/// When the drain loop should next attempt a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// An event is ready right now.
    Now,
    /// Sleep until this instant (end of a delay, or an ack fallback deadline).
    At(Instant),
}

/// The pending resumption, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pacing {
    /// Nothing scheduled; the head event (if any) may be processed.
    Idle,
    /// Presentation delay: the previous event is still being shown.
    Delay { until: Instant },
    /// Frozen until user acknowledgment or the fallback deadline,
    /// whichever fires first.
    AwaitAck { deadline: Instant },
}

/// Ordered FIFO buffer of pending events plus the drain pacing state.
#[derive(Debug)]
pub struct DrainQueue {
    events: VecDeque<GameEvent>,
    pacing: Pacing,
}

impl DrainQueue {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            pacing: Pacing::Idle,
        }
    }

    /// Append a batch to the tail, preserving server-given order.
    ///
    /// Never touches pacing: a batch arriving while the drain is frozen or
    /// delayed waits its turn.
    pub fn enqueue_batch(&mut self, batch: impl IntoIterator<Item = GameEvent>) {
        self.events.extend(batch);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True when no resumption is pending.
    pub fn is_unpaced(&self) -> bool {
        self.pacing == Pacing::Idle
    }

    /// True while frozen on an ack-or-timeout wait.
    pub fn is_awaiting_ack(&self) -> bool {
        matches!(self.pacing, Pacing::AwaitAck { .. })
    }

    /// Arm a presentation delay: no event is processed before `until`.
    pub fn defer(&mut self, until: Instant) {
        self.pacing = Pacing::Delay { until };
    }

    /// Freeze the drain until acknowledged or until `deadline`.
    pub fn freeze(&mut self, deadline: Instant) {
        self.pacing = Pacing::AwaitAck { deadline };
    }

    /// Resolve a pending ack wait early (the user acknowledged).
    ///
    /// Returns `true` if this call resumed the drain; `false` if there was
    /// nothing to acknowledge (already resumed, or never frozen) — cancelling
    /// an already-fired fallback this way is always safe.
    pub fn acknowledge(&mut self) -> bool {
        if self.is_awaiting_ack() {
            self.pacing = Pacing::Idle;
            true
        } else {
            false
        }
    }

    /// Clear expired pacing.
    ///
    /// Returns `true` when an ack wait ended here via its fallback deadline,
    /// so the caller can run the same acknowledgment effects a user action
    /// would have. Calling this when nothing is expired is a no-op.
    pub fn expire_pacing(&mut self, now: Instant) -> bool {
        match self.pacing {
            Pacing::Delay { until } if now >= until => {
                self.pacing = Pacing::Idle;
                false
            }
            Pacing::AwaitAck { deadline } if now >= deadline => {
                self.pacing = Pacing::Idle;
                true
            }
            _ => false,
        }
    }

    /// Pop the head event if the drain is unpaced.
    ///
    /// Callers run [`expire_pacing`](Self::expire_pacing) first; an armed
    /// delay or ack wait always returns `None` here.
    pub fn pop_ready(&mut self) -> Option<GameEvent> {
        match self.pacing {
            Pacing::Idle => self.events.pop_front(),
            _ => None,
        }
    }

    /// When the drain loop should next run a step, or `None` to stay idle
    /// until the next enqueue or acknowledgment.
    pub fn next_wake(&self) -> Option<Wake> {
        match self.pacing {
            Pacing::Idle => {
                if self.events.is_empty() {
                    None
                } else {
                    Some(Wake::Now)
                }
            }
            Pacing::Delay { until } => Some(Wake::At(until)),
            Pacing::AwaitAck { deadline } => Some(Wake::At(deadline)),
        }
    }

    /// Drop all buffered events and pending pacing (leaving a game).
    pub fn reset(&mut self) {
        self.events.clear();
        self.pacing = Pacing::Idle;
    }
}

impl Default for DrainQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use serde_json::json;
    use std::time::Duration;

    fn message(text: &str) -> GameEvent {
        GameEvent::from_value(&json!({
            "type": 2,
            "sender": "t",
            "message": text,
        }))
        .unwrap()
    }

    fn text_of(event: &GameEvent) -> &str {
        match &event.kind {
            EventKind::Message { message, .. } => message,
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_order_across_batches() {
        let mut q = DrainQueue::new();
        q.enqueue_batch(vec![message("a"), message("b")]);
        q.enqueue_batch(vec![message("c")]);
        q.enqueue_batch(vec![message("d"), message("e")]);

        let order: Vec<String> = std::iter::from_fn(|| q.pop_ready())
            .map(|e| text_of(&e).to_string())
            .collect();
        assert_eq!(order, ["a", "b", "c", "d", "e"]);
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_blocks_until_expired() {
        let start = Instant::now();
        let mut q = DrainQueue::new();
        q.enqueue_batch(vec![message("a")]);
        q.defer(start + Duration::from_millis(500));

        assert_eq!(q.pop_ready(), None);
        assert_eq!(q.next_wake(), Some(Wake::At(start + Duration::from_millis(500))));

        // Not yet.
        let early = start + Duration::from_millis(499);
        assert!(!q.expire_pacing(early));
        assert_eq!(q.pop_ready(), None);

        // Delay elapsed: not an ack resumption, event flows.
        assert!(!q.expire_pacing(start + Duration::from_millis(500)));
        assert!(q.is_unpaced());
        assert!(q.pop_ready().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_resumes_exactly_once() {
        let start = Instant::now();
        let mut q = DrainQueue::new();
        q.enqueue_batch(vec![message("next")]);
        q.freeze(start + Duration::from_secs(5));
        assert!(q.is_awaiting_ack());
        assert_eq!(q.pop_ready(), None);

        // User click resumes; the fallback deadline is implicitly cancelled.
        assert!(q.acknowledge());
        // Second trigger (late fallback or double click) is a no-op.
        assert!(!q.acknowledge());
        assert!(!q.expire_pacing(start + Duration::from_secs(6)));

        assert!(q.pop_ready().is_some());
        assert_eq!(q.pop_ready(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_deadline_resumes_and_reports() {
        let start = Instant::now();
        let mut q = DrainQueue::new();
        q.freeze(start + Duration::from_secs(5));

        assert!(!q.expire_pacing(start + Duration::from_secs(4)));
        assert!(q.is_awaiting_ack());

        assert!(q.expire_pacing(start + Duration::from_secs(5)));
        assert!(q.is_unpaced());
        // Ack after the fallback already fired: no-op.
        assert!(!q.acknowledge());
    }

    #[tokio::test(start_paused = true)]
    async fn arming_new_pacing_cancels_previous() {
        let start = Instant::now();
        let mut q = DrainQueue::new();
        q.freeze(start + Duration::from_secs(5));
        // A new delay supersedes the ack wait; only one resumption pending.
        q.defer(start + Duration::from_millis(100));
        assert!(!q.is_awaiting_ack());
        assert!(!q.acknowledge());
        assert!(!q.expire_pacing(start + Duration::from_millis(100)));
        assert!(q.is_unpaced());
    }

    #[tokio::test(start_paused = true)]
    async fn wake_states() {
        let start = Instant::now();
        let mut q = DrainQueue::new();
        // Empty and unpaced: idle terminal state.
        assert_eq!(q.next_wake(), None);

        q.enqueue_batch(vec![message("a")]);
        assert_eq!(q.next_wake(), Some(Wake::Now));

        let deadline = start + Duration::from_secs(5);
        q.freeze(deadline);
        assert_eq!(q.next_wake(), Some(Wake::At(deadline)));

        // Frozen with an empty queue still wakes at the deadline: the
        // table-clear effect must run even if no events follow.
        q.reset();
        q.freeze(deadline);
        assert_eq!(q.next_wake(), Some(Wake::At(deadline)));
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_while_frozen_stays_queued() {
        let start = Instant::now();
        let mut q = DrainQueue::new();
        q.freeze(start + Duration::from_secs(5));
        q.enqueue_batch(vec![message("a"), message("b")]);

        assert_eq!(q.pop_ready(), None);
        assert_eq!(q.len(), 2);

        assert!(q.acknowledge());
        assert_eq!(text_of(&q.pop_ready().unwrap()), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_events_and_pacing() {
        let start = Instant::now();
        let mut q = DrainQueue::new();
        q.enqueue_batch(vec![message("a")]);
        q.freeze(start + Duration::from_secs(5));

        q.reset();
        assert!(q.is_empty());
        assert!(q.is_unpaced());
        assert_eq!(q.next_wake(), None);
    }
}
