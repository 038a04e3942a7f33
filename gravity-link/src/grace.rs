//! Deferred pairing applies keyed by participant

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use crate::types::ParticipantId;

/// An apply step waiting for its grace delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingApply {
    /// When the apply becomes due
    pub due: Instant,
    /// Partner the participant was entangled with when the apply was scheduled
    pub partner: ParticipantId,
}

/// Cancellable timers, at most one per participant
///
/// The timers are passive: the owner asks for the next deadline, sleeps until
/// it with whatever runtime it uses, then collects what is due. Nothing here
/// blocks, so other messages keep flowing during a grace delay.
#[derive(Debug, Default)]
pub struct GraceTimers {
    pending: HashMap<ParticipantId, PendingApply>,
}

impl GraceTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an apply for `participant`, replacing any earlier one
    pub fn schedule(&mut self, participant: ParticipantId, partner: ParticipantId, now: Instant, delay: Duration) {
        let due = now + delay;
        if self
            .pending
            .insert(participant, PendingApply { due, partner })
            .is_some()
        {
            tracing::debug!("Participant '{}' grace apply rescheduled", participant);
        }
    }

    /// Cancel the apply of `participant`, returning whether one was pending
    pub fn cancel(&mut self, participant: ParticipantId) -> bool {
        self.pending.remove(&participant).is_some()
    }

    /// Whether an apply is pending for `participant`
    pub fn is_pending(&self, participant: ParticipantId) -> bool {
        self.pending.contains_key(&participant)
    }

    /// Earliest deadline among pending applies
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.due).min()
    }

    /// Remove and return every apply due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<(ParticipantId, PendingApply)> {
        let mut due: Vec<(ParticipantId, PendingApply)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(id, pending)| (*id, *pending))
            .collect();
        for (id, _) in &due {
            self.pending.remove(id);
        }
        due.sort_by_key(|(id, pending)| (pending.due, *id));
        due
    }

    /// Number of pending applies
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
