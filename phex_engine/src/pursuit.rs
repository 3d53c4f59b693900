//! Mobile aggression: acquire a target, chase it on a fixed cadence, give up
//! when it gets away.
//!
//! A pursuit chain is a sequence of [`Action::Pursue`] callbacks, each armed by
//! the previous evaluation. Two guards keep chains from piling up:
//!
//! * the action carries the opponent it was armed for, and does nothing once
//!   the mobile's opponent has changed;
//! * the mobile's `next_action` not-before tick throttles evaluation, so a
//!   second chain for the same opponent collapses into the first.

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::context::HostContext;
use crate::events::EventKind;
use crate::guard::{still_owned, Latch, NotBefore, PropertyBook, StaleReason};
use crate::scheduler::{Action, Tick};
use crate::world::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggressionPolicy {
    /// Never switch targets; stop when the current one is lost.
    DefendOnly,
    /// On losing the current target, immediately look for another.
    Opportunistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    pub leash_radius: u32,
    pub cadence: Tick,
    pub policy: AggressionPolicy,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        PursuitConfig {
            leash_radius: 15,
            cadence: 500,
            policy: AggressionPolicy::Opportunistic,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PursuitPhase {
    #[default]
    Idle,
    Engaging,
    Pursuing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PursuitState {
    pub opponent: Option<EntityId>,
    pub next_action: NotBefore,
    pub ignoring_new: Latch,
    pub phase: PursuitPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    OutOfRange,
    NotVisible,
    OutOfSight,
    TargetGone,
    Blocked,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Evaluated and a follow-up is armed.
    Engaged,
    /// Guard still closed; one evaluation armed for when it opens.
    Deferred,
    /// Already chasing this opponent; the live chain covers it.
    AlreadyEngaged,
    /// Fighting someone else; first engaged wins.
    Busy,
    /// Evaluated and immediately let go (and no replacement found).
    Abandoned,
    Invalid,
    NotCapable,
}

impl AcquireOutcome {
    pub fn holds(self) -> bool {
        matches!(
            self,
            AcquireOutcome::Engaged | AcquireOutcome::Deferred | AcquireOutcome::AlreadyEngaged
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Evaluation {
    Continue,
    Throttled,
    Stale,
    Abandoned { replaced: bool },
    Terminated,
}

#[derive(Debug, Default)]
pub struct PursuitMachine {
    configs: HashMap<EntityId, PursuitConfig>,
    states: PropertyBook<PursuitState>,
}

impl PursuitMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, mobile: EntityId, config: PursuitConfig) {
        self.configs.insert(mobile, config);
    }

    pub fn is_attached(&self, mobile: EntityId) -> bool {
        self.configs.contains_key(&mobile)
    }

    pub fn state(&self, mobile: EntityId) -> PursuitState {
        self.states.get(mobile)
    }

    /// First-engaged-wins entry point for attacks and sensing.
    pub fn acquire(
        &mut self,
        cx: &mut HostContext<'_>,
        mobile: EntityId,
        candidate: EntityId,
    ) -> AcquireOutcome {
        let Some(config) = self.configs.get(&mobile).copied() else {
            return AcquireOutcome::NotCapable;
        };
        let current = self.states.get(mobile).opponent;
        if let Some(opponent) = current {
            if opponent != candidate && cx.world.is_alive(opponent) {
                debug!("{mobile} ignores {candidate}: already fighting {opponent}");
                return AcquireOutcome::Busy;
            }
        }
        if candidate == mobile || !cx.world.is_alive(candidate) || !cx.world.is_alive(mobile) {
            return AcquireOutcome::Invalid;
        }
        if current == Some(candidate) {
            return match self.evaluate(cx, mobile, candidate, &config, true) {
                Evaluation::Throttled => AcquireOutcome::AlreadyEngaged,
                other => outcome_of(other),
            };
        }
        self.install(cx, mobile, candidate);
        self.engage(cx, mobile, candidate, &config, true)
    }

    /// Enter-area trigger. With `latch` set, only the first trigger is taken
    /// until the mobile runs out of victims.
    pub fn sense(
        &mut self,
        cx: &mut HostContext<'_>,
        mobile: EntityId,
        player: EntityId,
        latch: bool,
    ) -> AcquireOutcome {
        if !self.configs.contains_key(&mobile) {
            return AcquireOutcome::NotCapable;
        }
        if latch && !self.states.entry(mobile).ignoring_new.engage() {
            return AcquireOutcome::Busy;
        }
        let outcome = self.acquire(cx, mobile, player);
        if latch && !outcome.holds() && self.states.get(mobile).opponent.is_none() {
            self.states.entry(mobile).ignoring_new.release();
        }
        outcome
    }

    /// Host-driven opponent write. Last write wins: whatever chain was running
    /// for the previous opponent goes stale.
    pub fn force_target(
        &mut self,
        cx: &mut HostContext<'_>,
        mobile: EntityId,
        candidate: EntityId,
    ) -> AcquireOutcome {
        let Some(config) = self.configs.get(&mobile).copied() else {
            return AcquireOutcome::NotCapable;
        };
        if candidate == mobile || !cx.world.is_alive(candidate) {
            return AcquireOutcome::Invalid;
        }
        if self.states.get(mobile).opponent == Some(candidate) {
            return AcquireOutcome::AlreadyEngaged;
        }
        self.install(cx, mobile, candidate);
        self.engage(cx, mobile, candidate, &config, true)
    }

    /// Drops the current opponent without looking for another.
    pub fn release(&mut self, cx: &mut HostContext<'_>, mobile: EntityId) {
        let state = self.states.entry(mobile);
        let previous = state.opponent.take();
        state.ignoring_new.release();
        let phase_changed = state.phase != PursuitPhase::Idle;
        state.phase = PursuitPhase::Idle;
        if let Some(opponent) = previous {
            cx.record(EventKind::PursuitAbandoned {
                mobile,
                opponent,
                reason: AbandonReason::Released,
            });
        }
        if phase_changed {
            cx.record(EventKind::PursuitPhaseChanged {
                mobile,
                phase: PursuitPhase::Idle,
            });
        }
    }

    /// Body of an armed [`Action::Pursue`].
    pub fn on_fire(&mut self, cx: &mut HostContext<'_>, mobile: EntityId, opponent: EntityId) {
        let action = Action::Pursue { mobile, opponent };
        let Some(config) = self.configs.get(&mobile).copied() else {
            discard(cx, action, StaleReason::Missing);
            return;
        };
        match self.evaluate(cx, mobile, opponent, &config, true) {
            Evaluation::Stale => discard(cx, action, StaleReason::OwnerChanged),
            Evaluation::Throttled => discard(cx, action, StaleReason::NotYetDue),
            _ => {}
        }
    }

    fn install(&mut self, cx: &mut HostContext<'_>, mobile: EntityId, opponent: EntityId) {
        self.states.entry(mobile).opponent = Some(opponent);
        cx.record(EventKind::PursuitAcquired { mobile, opponent });
    }

    fn engage(
        &mut self,
        cx: &mut HostContext<'_>,
        mobile: EntityId,
        opponent: EntityId,
        config: &PursuitConfig,
        allow_sweep: bool,
    ) -> AcquireOutcome {
        match self.evaluate(cx, mobile, opponent, config, allow_sweep) {
            Evaluation::Throttled => {
                let wait = self.states.get(mobile).next_action.remaining(cx.now());
                cx.arm(wait, Action::Pursue { mobile, opponent });
                AcquireOutcome::Deferred
            }
            other => outcome_of(other),
        }
    }

    fn evaluate(
        &mut self,
        cx: &mut HostContext<'_>,
        mobile: EntityId,
        opponent: EntityId,
        config: &PursuitConfig,
        allow_sweep: bool,
    ) -> Evaluation {
        let now = cx.now();
        let state = self.states.get(mobile);
        if !still_owned(state.opponent, opponent) {
            return Evaluation::Stale;
        }
        if !state.next_action.is_ready(now) {
            return Evaluation::Throttled;
        }
        if !cx.world.is_alive(mobile) {
            info!("{mobile} is gone, ending its pursuit of {opponent}");
            let state = self.states.entry(mobile);
            state.opponent = None;
            state.ignoring_new.release();
            state.phase = PursuitPhase::Idle;
            return Evaluation::Terminated;
        }
        if !cx.world.is_alive(opponent) {
            return self.abandon(cx, mobile, opponent, config, AbandonReason::TargetGone, allow_sweep);
        }

        cx.world.attack(mobile, opponent);
        cx.record(EventKind::PursuitAttack { mobile, opponent });

        let Some(distance) = cx.world.distance(mobile, opponent) else {
            return self.abandon(cx, mobile, opponent, config, AbandonReason::TargetGone, allow_sweep);
        };
        if distance > 1 {
            self.set_phase(cx, mobile, PursuitPhase::Pursuing);
        }
        let lost = if distance > config.leash_radius {
            Some(AbandonReason::OutOfRange)
        } else if !cx.world.is_visible(opponent) {
            Some(AbandonReason::NotVisible)
        } else if !cx.world.can_see(mobile, opponent) {
            Some(AbandonReason::OutOfSight)
        } else {
            None
        };
        if let Some(reason) = lost {
            return self.abandon(cx, mobile, opponent, config, reason, allow_sweep);
        }

        if distance > 1 {
            if !cx.world.step_toward(mobile, opponent) {
                return self.abandon(cx, mobile, opponent, config, AbandonReason::Blocked, allow_sweep);
            }
            if cx.world.distance(mobile, opponent).map_or(false, |d| d <= 1) {
                self.set_phase(cx, mobile, PursuitPhase::Engaging);
            }
        } else {
            self.set_phase(cx, mobile, PursuitPhase::Engaging);
        }

        self.states
            .entry(mobile)
            .next_action
            .arm(now, config.cadence);
        cx.arm(config.cadence, Action::Pursue { mobile, opponent });
        Evaluation::Continue
    }

    fn abandon(
        &mut self,
        cx: &mut HostContext<'_>,
        mobile: EntityId,
        lost: EntityId,
        config: &PursuitConfig,
        reason: AbandonReason,
        allow_sweep: bool,
    ) -> Evaluation {
        self.states.entry(mobile).opponent = None;
        self.set_phase(cx, mobile, PursuitPhase::Idle);
        cx.record(EventKind::PursuitAbandoned {
            mobile,
            opponent: lost,
            reason,
        });

        // A failed sweep candidate leaves the latch to the sweep's caller.
        if !allow_sweep {
            return Evaluation::Abandoned { replaced: false };
        }
        if config.policy == AggressionPolicy::Opportunistic && self.sweep(cx, mobile, lost, config)
        {
            return Evaluation::Abandoned { replaced: true };
        }
        self.states.entry(mobile).ignoring_new.release();
        Evaluation::Abandoned { replaced: false }
    }

    /// Looks for any eligible player around `mobile` and engages the first
    /// one that holds. Engagements made here never sweep again.
    fn sweep(
        &mut self,
        cx: &mut HostContext<'_>,
        mobile: EntityId,
        lost: EntityId,
        config: &PursuitConfig,
    ) -> bool {
        let mut candidates = cx.world.nearby_players(mobile);
        candidates.retain(|&player| {
            player != lost
                && player != mobile
                && cx.world.is_alive(player)
                && cx.world.is_visible(player)
                && cx.world.can_see(mobile, player)
                && cx
                    .world
                    .distance(mobile, player)
                    .map_or(false, |d| d <= config.leash_radius)
        });
        for player in candidates {
            self.install(cx, mobile, player);
            if self.engage(cx, mobile, player, config, false).holds() {
                return true;
            }
        }
        false
    }

    fn set_phase(&mut self, cx: &mut HostContext<'_>, mobile: EntityId, phase: PursuitPhase) {
        let state = self.states.entry(mobile);
        if state.phase != phase {
            state.phase = phase;
            cx.record(EventKind::PursuitPhaseChanged { mobile, phase });
        }
    }
}

fn outcome_of(evaluation: Evaluation) -> AcquireOutcome {
    match evaluation {
        Evaluation::Continue => AcquireOutcome::Engaged,
        Evaluation::Throttled => AcquireOutcome::Deferred,
        Evaluation::Abandoned { replaced: true } => AcquireOutcome::Engaged,
        Evaluation::Abandoned { replaced: false } => AcquireOutcome::Abandoned,
        Evaluation::Stale | Evaluation::Terminated => AcquireOutcome::Invalid,
    }
}

fn discard(cx: &mut HostContext<'_>, action: Action, reason: StaleReason) {
    debug!("dropping {action}: {reason}");
    cx.record(EventKind::StaleDiscarded { action, reason });
}

#[cfg(test)]
mod tests {
    use super::{AcquireOutcome, AggressionPolicy, PursuitConfig, PursuitMachine, PursuitPhase};
    use crate::context::HostContext;
    use crate::events::EventLog;
    use crate::scheduler::{Action, Timeline};
    use crate::sim_world::SimWorld;
    use crate::world::Location;

    #[test]
    fn adjacent_target_is_engaged_and_rearmed() {
        let mut world = SimWorld::new(3);
        let orc = world.spawn_mobile("an orc", Location::new(0, 0, 0));
        let player = world.spawn_player("Alice", Location::new(1, 0, 0));
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = PursuitMachine::new();
        machine.attach(orc, PursuitConfig::default());

        let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
        assert_eq!(machine.acquire(&mut cx, orc, player), AcquireOutcome::Engaged);

        let state = machine.state(orc);
        assert_eq!(state.opponent, Some(player));
        assert_eq!(state.phase, PursuitPhase::Engaging);
        assert_eq!(state.next_action.deadline(), 500);
        assert_eq!(
            timeline.count_pending(|action| matches!(action, Action::Pursue { .. })),
            1
        );
    }

    #[test]
    fn defend_only_stops_when_target_escapes() {
        let mut world = SimWorld::new(3);
        let guard = world.spawn_mobile("a guard", Location::new(0, 0, 0));
        let player = world.spawn_player("Alice", Location::new(2, 0, 0));
        let _bystander = world.spawn_player("Bob", Location::new(0, 2, 0));
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = PursuitMachine::new();
        machine.attach(
            guard,
            PursuitConfig {
                policy: AggressionPolicy::DefendOnly,
                ..PursuitConfig::default()
            },
        );

        {
            let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
            assert_eq!(machine.acquire(&mut cx, guard, player), AcquireOutcome::Engaged);
        }
        assert_eq!(machine.state(guard).phase, PursuitPhase::Engaging);

        world.set_visible(player, false);
        timeline.advance_to(500);
        {
            let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
            machine.on_fire(&mut cx, guard, player);
        }

        let state = machine.state(guard);
        assert_eq!(state.opponent, None, "defend-only never switches to the bystander");
        assert_eq!(state.phase, PursuitPhase::Idle);
    }

    #[test]
    fn acquire_while_busy_keeps_first_opponent() {
        let mut world = SimWorld::new(3);
        let orc = world.spawn_mobile("an orc", Location::new(0, 0, 0));
        let first = world.spawn_player("Alice", Location::new(1, 0, 0));
        let second = world.spawn_player("Bob", Location::new(0, 1, 0));
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = PursuitMachine::new();
        machine.attach(orc, PursuitConfig::default());

        let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
        assert_eq!(machine.acquire(&mut cx, orc, first), AcquireOutcome::Engaged);
        assert_eq!(machine.acquire(&mut cx, orc, second), AcquireOutcome::Busy);
        assert_eq!(machine.acquire(&mut cx, orc, first), AcquireOutcome::AlreadyEngaged);
        assert_eq!(machine.state(orc).opponent, Some(first));
    }
}
