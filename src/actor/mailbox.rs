//! Per-actor FIFO mailbox with handle/ignore/defer dequeue policy.
//!
//! Invariants:
//! - `enqueue` appends at the tail; nothing ever reorders queued events.
//! - `try_dequeue` removes at most one event for delivery. Deferred events
//!   stay in place and keep their relative order, so per-sender FIFO holds.
//! - Ignored events are discarded during the scan they are seen in.
//! - `Halt` is always delivered, regardless of the policy.

use std::collections::VecDeque;

use crate::event::{Envelope, Event, EventKind};

/// How the current state treats an event kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Deliver to the state's handler.
    Handle,
    /// Drop silently.
    Ignore,
    /// Leave queued until a later state handles it.
    Defer,
    /// No binding anywhere: deliver so the engine can report it.
    Unhandled,
}

/// An event removed from the mailbox for delivery.
#[derive(Debug)]
pub struct Dequeued<E> {
    pub envelope: Envelope<E>,
    /// True when the policy had no binding for the kind.
    pub unhandled: bool,
}

/// Unbounded FIFO queue of envelopes.
#[derive(Debug)]
pub struct Mailbox<E> {
    queue: VecDeque<Envelope<E>>,
    ignored: u64,
}

impl<E: Event> Default for Mailbox<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Mailbox<E> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            ignored: 0,
        }
    }

    /// Append an envelope. Returns true if the mailbox was empty before.
    pub fn enqueue(&mut self, envelope: Envelope<E>) -> bool {
        let was_empty = self.queue.is_empty();
        self.queue.push_back(envelope);
        was_empty
    }

    /// Put an envelope back at the head (used for raised-then-deferred events).
    pub(crate) fn push_front(&mut self, envelope: Envelope<E>) {
        self.queue.push_front(envelope);
    }

    /// Remove the first deliverable envelope according to `policy`.
    pub fn try_dequeue(
        &mut self,
        mut policy: impl FnMut(EventKind) -> Disposition,
    ) -> Option<Dequeued<E>> {
        let mut idx = 0;
        while idx < self.queue.len() {
            let kind = self.queue[idx].kind();
            if kind == EventKind::HALT {
                return self.remove_at(idx, false);
            }
            match policy(kind) {
                Disposition::Defer => idx += 1,
                Disposition::Ignore => {
                    self.queue.remove(idx);
                    self.ignored = self.ignored.saturating_add(1);
                }
                Disposition::Handle => return self.remove_at(idx, false),
                Disposition::Unhandled => return self.remove_at(idx, true),
            }
        }
        None
    }

    /// Remove the first envelope whose kind is in `kinds` (or a halt),
    /// leaving everything else queued.
    pub fn take_matching(&mut self, kinds: &[EventKind]) -> Option<Envelope<E>> {
        let idx = self
            .queue
            .iter()
            .position(|env| env.kind() == EventKind::HALT || kinds.contains(&env.kind()))?;
        self.queue.remove(idx)
    }

    /// Whether `try_dequeue` with the same policy would deliver something.
    pub fn has_deliverable(&self, mut policy: impl FnMut(EventKind) -> Disposition) -> bool {
        self.queue.iter().any(|env| {
            let kind = env.kind();
            kind == EventKind::HALT
                || matches!(policy(kind), Disposition::Handle | Disposition::Unhandled)
        })
    }

    /// Whether `take_matching(kinds)` would deliver something.
    pub fn has_matching(&self, kinds: &[EventKind]) -> bool {
        self.queue
            .iter()
            .any(|env| env.kind() == EventKind::HALT || kinds.contains(&env.kind()))
    }

    fn remove_at(&mut self, idx: usize, unhandled: bool) -> Option<Dequeued<E>> {
        let envelope = self.queue.remove(idx)?;
        Some(Dequeued {
            envelope,
            unhandled,
        })
    }

    /// Remove everything, in queue order.
    pub fn drain(&mut self) -> Vec<Envelope<E>> {
        self.queue.drain(..).collect()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of events discarded by an ignore binding.
    #[inline(always)]
    pub fn ignored_count(&self) -> u64 {
        self.ignored
    }

    /// Queued envelopes, head first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Envelope<E>> + '_ {
        self.queue.iter()
    }
}
