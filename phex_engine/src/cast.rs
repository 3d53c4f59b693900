//! Spell cast bar: validate, commit (mana spent, one resolution armed),
//! resolve exactly once.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::context::HostContext;
use crate::error::CastRejection;
use crate::events::EventKind;
use crate::guard::StaleReason;
use crate::scheduler::{Action, Tick};
use crate::spells::{SpellEffect, SpellId, SpellSpec, TargetKind};
use crate::world::{Attribute, EntityId, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cast#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastTarget {
    Entity(EntityId),
    Location(Location),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CastPhase {
    Committed,
    Resolved,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CastSession {
    pub id: SessionId,
    pub caster: EntityId,
    pub spell: SpellId,
    pub target: CastTarget,
    /// Where a location spell lands, fixed at commit time.
    pub location: Option<Location>,
    pub mana_cost: i64,
    pub cast_delay: Tick,
    pub presentation_delay: Tick,
    pub committed_at: Tick,
    pub phase: CastPhase,
}

impl CastSession {
    pub fn resolves_at(&self) -> Tick {
        self.committed_at.saturating_add(self.cast_delay)
    }
}

#[derive(Debug)]
pub struct CastMachine {
    spells: BTreeMap<SpellId, SpellSpec>,
    pending: BTreeMap<SessionId, CastSession>,
    next_session: u64,
    resolved_total: usize,
    aborted_total: usize,
    rng: SmallRng,
}

impl CastMachine {
    pub fn new(spells: impl IntoIterator<Item = SpellSpec>, seed: u64) -> Self {
        CastMachine {
            spells: spells.into_iter().map(|spec| (spec.id, spec)).collect(),
            pending: BTreeMap::new(),
            next_session: 1,
            resolved_total: 0,
            aborted_total: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn spell(&self, id: SpellId) -> Option<&SpellSpec> {
        self.spells.get(&id)
    }

    pub fn session(&self, id: SessionId) -> Option<&CastSession> {
        self.pending.get(&id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &CastSession> {
        self.pending.values()
    }

    pub fn resolved_total(&self) -> usize {
        self.resolved_total
    }

    pub fn aborted_total(&self) -> usize {
        self.aborted_total
    }

    /// Validates and, if everything holds, commits a cast. A rejection is
    /// reported to the caster and leaves no trace besides that message.
    pub fn begin(
        &mut self,
        cx: &mut HostContext<'_>,
        caster: EntityId,
        spell: SpellId,
        target: CastTarget,
        scroll: Option<EntityId>,
    ) -> Result<SessionId, CastRejection> {
        let validated = match self.spells.get(&spell) {
            Some(spec) => validate(cx, spec, caster, target, scroll).map(|at| (spec.clone(), at)),
            None => Err(CastRejection::UnknownSpell(spell)),
        };
        match validated {
            Ok((spec, location)) => Ok(self.commit(cx, &spec, caster, target, location, scroll)),
            Err(rejection) => {
                cx.world.send_message(caster, &rejection.to_string());
                cx.record(EventKind::CastRejected {
                    caster,
                    spell,
                    reason: rejection.to_string(),
                });
                Err(rejection)
            }
        }
    }

    fn commit(
        &mut self,
        cx: &mut HostContext<'_>,
        spec: &SpellSpec,
        caster: EntityId,
        target: CastTarget,
        location: Option<Location>,
        scroll: Option<EntityId>,
    ) -> SessionId {
        let spell = spec.id;
        let now = cx.now();
        let mana = cx.world.attribute(caster, Attribute::Mana);
        cx.world
            .set_attribute(caster, Attribute::Mana, mana - spec.mana_cost);
        if let Some(scroll) = scroll {
            cx.world.consume(scroll, 1);
        }

        let (min, max) = spec.presentation_window;
        let presentation_delay = self.rng.gen_range(min..=max.max(min));
        cx.world.animate_cast(caster, spell, presentation_delay);

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let session = CastSession {
            id,
            caster,
            spell,
            target,
            location,
            mana_cost: spec.mana_cost,
            cast_delay: spec.cast_delay,
            presentation_delay,
            committed_at: now,
            phase: CastPhase::Committed,
        };
        cx.arm(spec.cast_delay, Action::ResolveCast { session: id });
        cx.record(EventKind::CastCommitted {
            session: id,
            caster,
            spell,
            mana_cost: spec.mana_cost,
            presentation_delay,
            resolves_at: session.resolves_at(),
        });
        self.pending.insert(id, session);
        id
    }

    /// Body of the armed [`Action::ResolveCast`]. Runs the payload at most
    /// once per session; mana already spent is never refunded.
    pub fn resolve(&mut self, cx: &mut HostContext<'_>, id: SessionId) -> Option<CastPhase> {
        let action = Action::ResolveCast { session: id };
        let Some(mut session) = self.pending.remove(&id) else {
            debug!("dropping {action}: no pending session");
            cx.record(EventKind::StaleDiscarded {
                action,
                reason: StaleReason::Missing,
            });
            return None;
        };
        if let Some(reason) = invalidated(cx, &session) {
            info!("{id} ({:?}) suppressed: {reason}", session.spell);
            session.phase = CastPhase::Aborted;
            self.aborted_total += 1;
            cx.record(EventKind::CastSuppressed {
                session: id,
                spell: session.spell,
                reason: reason.to_string(),
            });
            return Some(session.phase);
        }

        let Some(spec) = self.spells.get(&session.spell) else {
            self.aborted_total += 1;
            cx.record(EventKind::CastSuppressed {
                session: id,
                spell: session.spell,
                reason: "spell is no longer defined".to_string(),
            });
            return Some(CastPhase::Aborted);
        };
        let (magnitude, resisted) = apply_effect(cx, spec, &session);
        session.phase = CastPhase::Resolved;
        self.resolved_total += 1;
        cx.record(EventKind::CastResolved {
            session: id,
            spell: session.spell,
            magnitude,
            resisted,
        });
        Some(session.phase)
    }
}

fn validate(
    cx: &HostContext<'_>,
    spec: &SpellSpec,
    caster: EntityId,
    target: CastTarget,
    scroll: Option<EntityId>,
) -> Result<Option<Location>, CastRejection> {
    let world = &*cx.world;
    if !world.is_alive(caster) {
        return Err(CastRejection::CasterUnavailable);
    }
    if let Some(scroll) = scroll {
        if !world.exists(scroll) {
            return Err(CastRejection::MissingScroll);
        }
    }

    let location = match (spec.target, target) {
        (TargetKind::Mobile, CastTarget::Entity(entity)) => {
            if !world.is_alive(entity) {
                return Err(CastRejection::InvalidTarget);
            }
            None
        }
        (TargetKind::Mobile, CastTarget::Location(_)) => {
            return Err(CastRejection::InvalidTarget)
        }
        (TargetKind::Location, CastTarget::Entity(entity)) => Some(
            world
                .location(entity)
                .ok_or(CastRejection::InvalidTarget)?,
        ),
        (TargetKind::Location, CastTarget::Location(location)) => Some(location),
    };

    if let CastTarget::Entity(entity) = target {
        if let Some(range) = spec.range {
            let distance = world
                .distance(caster, entity)
                .ok_or(CastRejection::InvalidTarget)?;
            if distance > range {
                return Err(CastRejection::OutOfRange { distance, range });
            }
        }
        if spec.requires_sight && !world.can_see(caster, entity) {
            return Err(CastRejection::NotVisible);
        }
    } else if let (Some(range), Some(at)) = (spec.range, location) {
        let origin = world.location(caster).ok_or(CastRejection::CasterUnavailable)?;
        let distance = origin.distance_to(&at);
        if distance > range {
            return Err(CastRejection::OutOfRange { distance, range });
        }
    }

    let available = world.attribute(caster, Attribute::Mana);
    if available < spec.mana_cost {
        return Err(CastRejection::InsufficientMana {
            required: spec.mana_cost,
            available,
        });
    }
    Ok(location)
}

fn invalidated(cx: &HostContext<'_>, session: &CastSession) -> Option<&'static str> {
    if !cx.world.is_alive(session.caster) {
        return Some("caster is gone");
    }
    match session.target {
        CastTarget::Entity(entity) if session.location.is_none() && !cx.world.is_alive(entity) => {
            Some("target is gone")
        }
        _ => None,
    }
}

fn apply_effect(cx: &mut HostContext<'_>, spec: &SpellSpec, session: &CastSession) -> (i64, bool) {
    let caster = session.caster;
    match &spec.effect {
        SpellEffect::Damage {
            scaling,
            resistance,
            sound,
            visual,
        } => {
            let CastTarget::Entity(target) = session.target else {
                return (0, false);
            };
            let mut damage = scaling.apply(cx.world.attribute(caster, scaling.attribute));
            let mut sound = *sound;
            let mut resisted = false;
            if let Some(resistance) = resistance {
                if cx.world.check_skill(
                    target,
                    resistance.skill,
                    resistance.min_required,
                    resistance.max_until_no_gain,
                ) {
                    cx.world.send_message(target, &resistance.message);
                    if resistance.divisor != 0 {
                        damage /= resistance.divisor;
                    }
                    sound = resistance.sound;
                    resisted = true;
                }
            }
            let damage = damage.max(1);
            if let Some(visual) = visual {
                cx.world.play_effect(caster, target, *visual);
            }
            cx.world.play_sound(caster, sound);
            cx.world.deal_damage(target, damage);
            (damage, resisted)
        }
        SpellEffect::Heal { scaling, sound } => {
            let CastTarget::Entity(target) = session.target else {
                return (0, false);
            };
            let hits = scaling.apply(cx.world.attribute(caster, scaling.attribute));
            cx.world.play_sound(target, *sound);
            cx.world.heal(target, hits);
            (hits, false)
        }
        SpellEffect::Light { graphic, duration } => {
            let Some(at) = session.location else {
                return (0, false);
            };
            let ticks = duration.apply(cx.world.attribute(caster, duration.attribute));
            let light = cx.world.create_item(at, *graphic);
            cx.arm(Tick::try_from(ticks).unwrap_or(0), Action::Expire { item: light });
            (ticks, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CastMachine, CastTarget, SessionId};
    use crate::context::HostContext;
    use crate::error::CastRejection;
    use crate::events::EventLog;
    use crate::scheduler::Timeline;
    use crate::sim_world::SimWorld;
    use crate::spells::{SpellId, SpellSpec};
    use crate::world::{Attribute, Location, World};

    #[test]
    fn presentation_delay_stays_inside_window() {
        let mut world = SimWorld::new(9);
        let caster = world.spawn_player("Mage", Location::new(0, 0, 0));
        world.set_attribute(caster, Attribute::Mana, 1_000);
        let target = world.spawn_player("Friend", Location::new(2, 0, 0));
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = CastMachine::new(SpellSpec::builtin_catalog(), 42);

        let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
        for _ in 0..20 {
            let id = machine
                .begin(&mut cx, caster, SpellId::Healing, CastTarget::Entity(target), None)
                .expect("healing accepted");
            let session = machine.session(id).expect("pending session");
            assert!((100..=200).contains(&session.presentation_delay));
            assert_eq!(session.resolves_at(), 1_000);
        }
        assert_eq!(machine.pending().count(), 20);
    }

    #[test]
    fn mobile_spell_refuses_location_target() {
        let mut world = SimWorld::new(9);
        let caster = world.spawn_player("Mage", Location::new(0, 0, 0));
        world.set_attribute(caster, Attribute::Mana, 100);
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = CastMachine::new(SpellSpec::builtin_catalog(), 1);

        let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
        let result = machine.begin(
            &mut cx,
            caster,
            SpellId::Fireball,
            CastTarget::Location(Location::new(1, 1, 0)),
            None,
        );
        assert_eq!(result, Err(CastRejection::InvalidTarget));
        assert!(timeline.is_empty());
        assert_eq!(world.attribute(caster, Attribute::Mana), 100);
    }

    #[test]
    fn resolving_unknown_session_is_stale() {
        let mut world = SimWorld::new(9);
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = CastMachine::new(SpellSpec::builtin_catalog(), 1);
        let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
        assert_eq!(machine.resolve(&mut cx, SessionId(77)), None);
        assert_eq!(machine.resolved_total(), 0);
    }
}
