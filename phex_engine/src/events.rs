use std::fmt;

use log::debug;
use serde::Serialize;

use crate::cast::SessionId;
use crate::guard::StaleReason;
use crate::pursuit::{AbandonReason, PursuitPhase};
use crate::scheduler::{Action, Tick};
use crate::spells::SpellId;
use crate::world::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    ToggleOpened {
        item: EntityId,
        close_not_before: Tick,
    },
    ToggleClosed {
        item: EntityId,
        automatic: bool,
    },
    ToggleReset {
        item: EntityId,
    },
    PursuitAcquired {
        mobile: EntityId,
        opponent: EntityId,
    },
    PursuitPhaseChanged {
        mobile: EntityId,
        phase: PursuitPhase,
    },
    PursuitAttack {
        mobile: EntityId,
        opponent: EntityId,
    },
    PursuitAbandoned {
        mobile: EntityId,
        opponent: EntityId,
        reason: AbandonReason,
    },
    Greeted {
        mobile: EntityId,
        player: EntityId,
    },
    CastRejected {
        caster: EntityId,
        spell: SpellId,
        reason: String,
    },
    CastCommitted {
        session: SessionId,
        caster: EntityId,
        spell: SpellId,
        mana_cost: i64,
        presentation_delay: Tick,
        resolves_at: Tick,
    },
    CastResolved {
        session: SessionId,
        spell: SpellId,
        magnitude: i64,
        resisted: bool,
    },
    CastSuppressed {
        session: SessionId,
        spell: SpellId,
        reason: String,
    },
    ItemExpired {
        item: EntityId,
    },
    StaleDiscarded {
        action: Action,
        reason: StaleReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineEvent {
    pub tick: Tick,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>6}] ", self.tick)?;
        match &self.kind {
            EventKind::ToggleOpened {
                item,
                close_not_before,
            } => write!(f, "{item} opened, closes at {close_not_before}"),
            EventKind::ToggleClosed { item, automatic } => {
                let how = if *automatic { "auto" } else { "manual" };
                write!(f, "{item} closed ({how})")
            }
            EventKind::ToggleReset { item } => write!(f, "{item} forced closed on load"),
            EventKind::PursuitAcquired { mobile, opponent } => {
                write!(f, "{mobile} acquired {opponent}")
            }
            EventKind::PursuitPhaseChanged { mobile, phase } => {
                write!(f, "{mobile} is now {phase:?}")
            }
            EventKind::PursuitAttack { mobile, opponent } => {
                write!(f, "{mobile} attacks {opponent}")
            }
            EventKind::PursuitAbandoned {
                mobile,
                opponent,
                reason,
            } => write!(f, "{mobile} abandoned {opponent} ({reason:?})"),
            EventKind::Greeted { mobile, player } => write!(f, "{mobile} greeted {player}"),
            EventKind::CastRejected {
                caster,
                spell,
                reason,
            } => write!(f, "{caster} could not cast {spell:?}: {reason}"),
            EventKind::CastCommitted {
                session,
                caster,
                spell,
                mana_cost,
                presentation_delay,
                resolves_at,
            } => write!(
                f,
                "{caster} committed {spell:?} as {session} (mana {mana_cost}, cue after {presentation_delay}, resolves at {resolves_at})"
            ),
            EventKind::CastResolved {
                session,
                spell,
                magnitude,
                resisted,
            } => write!(
                f,
                "{session} {spell:?} resolved, magnitude {magnitude}{}",
                if *resisted { " (resisted)" } else { "" }
            ),
            EventKind::CastSuppressed {
                session,
                spell,
                reason,
            } => write!(f, "{session} {spell:?} suppressed: {reason}"),
            EventKind::ItemExpired { item } => write!(f, "{item} expired"),
            EventKind::StaleDiscarded { action, reason } => {
                write!(f, "discarded {action} ({reason})")
            }
        }
    }
}

/// Append-only record of everything the engine decided, in timeline order.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<EngineEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tick: Tick, kind: EventKind) {
        let event = EngineEvent { tick, kind };
        debug!("{event}");
        self.events.push(event);
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventKind> {
        self.events.iter().map(|event| &event.kind)
    }

    /// Number of events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&EventKind) -> bool) -> usize {
        self.iter().filter(|kind| predicate(kind)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::{EventKind, EventLog};
    use crate::world::EntityId;

    #[test]
    fn events_serialize_flat_with_kind_tag() {
        let mut log = EventLog::new();
        log.record(
            4_000,
            EventKind::ToggleClosed {
                item: EntityId(12),
                automatic: true,
            },
        );
        let json = serde_json::to_value(&log).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!([
                { "tick": 4000, "kind": "toggle_closed", "item": 12, "automatic": true }
            ])
        );
        assert_eq!(log.count(|kind| matches!(kind, EventKind::ToggleClosed { .. })), 1);
    }
}
