use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use serde::Serialize;

use crate::cast::SessionId;
use crate::world::EntityId;

/// World time in scheduler units (milliseconds in the reference host).
pub type Tick = u64;

/// A deferred piece of work. Actions carry only identities and guard tokens;
/// everything else is re-read from current state when they fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Next step of a pursuit chain, owned by `opponent`.
    Pursue { mobile: EntityId, opponent: EntityId },
    ResolveCast { session: SessionId },
    AutoClose { item: EntityId },
    /// Temporary item (light source) reaching the end of its life.
    Expire { item: EntityId },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pursue { mobile, opponent } => write!(f, "pursue {mobile} -> {opponent}"),
            Action::ResolveCast { session } => write!(f, "resolve cast {session}"),
            Action::AutoClose { item } => write!(f, "auto-close {item}"),
            Action::Expire { item } => write!(f, "expire {item}"),
        }
    }
}

/// The host's delayed-callback primitive: "run this after `delay` ticks".
pub trait Scheduler {
    fn now(&self) -> Tick;
    fn schedule(&mut self, delay: Tick, action: Action);
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScheduledAction {
    pub due: Tick,
    pub sequence: u64,
    pub action: Action,
}

impl PartialEq for ScheduledAction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledAction {}

impl PartialOrd for ScheduledAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledAction {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.sequence).cmp(&(other.due, other.sequence))
    }
}

/// Single logical timeline used by the reference host. Actions come back out
/// one at a time ordered by due tick, then by the order they were armed.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    now: Tick,
    next_sequence: u64,
    pending: BinaryHeap<Reverse<ScheduledAction>>,
    armed_total: usize,
    fired_total: usize,
}

impl Timeline {
    pub fn new(start: Tick) -> Self {
        Timeline {
            now: start,
            ..Timeline::default()
        }
    }

    /// Pops the earliest action due at or before `until`, moving the clock to
    /// its due tick.
    pub fn pop_due(&mut self, until: Tick) -> Option<ScheduledAction> {
        let due = self.pending.peek()?.0.due;
        if due > until {
            return None;
        }
        let Reverse(entry) = self.pending.pop()?;
        self.now = self.now.max(entry.due);
        self.fired_total += 1;
        Some(entry)
    }

    /// Moves the clock forward without firing anything. Never goes backwards.
    pub fn advance_to(&mut self, tick: Tick) {
        self.now = self.now.max(tick);
    }

    pub fn peek(&self) -> Option<&ScheduledAction> {
        self.pending.peek().map(|entry| &entry.0)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledAction> {
        self.pending.iter().map(|entry| &entry.0)
    }

    /// Number of pending actions matching `predicate`.
    pub fn count_pending(&self, predicate: impl Fn(&Action) -> bool) -> usize {
        self.pending().filter(|entry| predicate(&entry.action)).count()
    }

    pub fn armed_total(&self) -> usize {
        self.armed_total
    }

    pub fn fired_total(&self) -> usize {
        self.fired_total
    }
}

impl Scheduler for Timeline {
    fn now(&self) -> Tick {
        self.now
    }

    fn schedule(&mut self, delay: Tick, action: Action) {
        let entry = ScheduledAction {
            due: self.now.saturating_add(delay),
            sequence: self.next_sequence,
            action,
        };
        self.next_sequence += 1;
        self.armed_total += 1;
        self.pending.push(Reverse(entry));
    }
}
