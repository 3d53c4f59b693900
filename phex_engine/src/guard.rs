//! Guard tokens: state written when a delayed action is armed and re-checked
//! when it fires, so a callback can tell it has gone stale.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::scheduler::Tick;
use crate::world::EntityId;

/// Monotonic "not before" timestamp. The default (tick 0) is always ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NotBefore(Tick);

impl NotBefore {
    /// Records `now + delay` and returns it.
    pub fn arm(&mut self, now: Tick, delay: Tick) -> Tick {
        self.0 = now.saturating_add(delay);
        self.0
    }

    pub fn is_ready(&self, now: Tick) -> bool {
        now >= self.0
    }

    pub fn deadline(&self) -> Tick {
        self.0
    }

    /// Ticks left until the guard opens, zero once it has.
    pub fn remaining(&self, now: Tick) -> Tick {
        self.0.saturating_sub(now)
    }
}

/// Boolean re-entrancy latch: "no new triggers accepted".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Latch(bool);

impl Latch {
    /// Engages the latch. Returns `false` if it was already engaged, in which
    /// case the caller should drop the trigger.
    pub fn engage(&mut self) -> bool {
        !std::mem::replace(&mut self.0, true)
    }

    pub fn release(&mut self) {
        self.0 = false;
    }

    pub fn is_engaged(&self) -> bool {
        self.0
    }
}

/// Ownership check: the armed token must still be the current holder.
pub fn still_owned<T: PartialEq>(current: Option<T>, token: T) -> bool {
    current.map_or(false, |holder| holder == token)
}

/// Why a fired action was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The entity's opponent/target is no longer the one the action was armed for.
    OwnerChanged,
    /// A later trigger pushed the not-before deadline forward.
    NotYetDue,
    /// The state the action would change has already been reached.
    AlreadySettled,
    /// The session or entity the action refers to is gone.
    Missing,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StaleReason::OwnerChanged => "owner changed",
            StaleReason::NotYetDue => "not yet due",
            StaleReason::AlreadySettled => "already settled",
            StaleReason::Missing => "missing",
        })
    }
}

/// Typed per-entity properties. An entity without a record reads as
/// `T::default()`; records are created on first write and never removed.
#[derive(Debug, Clone)]
pub struct PropertyBook<T> {
    records: HashMap<EntityId, T>,
}

impl<T> Default for PropertyBook<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<T: Default + Clone> PropertyBook<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity: EntityId) -> T {
        self.records.get(&entity).cloned().unwrap_or_default()
    }

    pub fn entry(&mut self, entity: EntityId) -> &mut T {
        self.records.entry(entity).or_default()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.records.contains_key(&entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.records.keys().copied()
    }
}
