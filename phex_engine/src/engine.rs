//! Routes world events to the state machines and fired actions back to the
//! machine that armed them.

use log::{debug, info};

use crate::behavior::{AttackReaction, BehaviorBook, ItemBehavior, MobileProfile, SenseReaction};
use crate::cast::{CastMachine, CastTarget, SessionId};
use crate::config::EngineConfig;
use crate::context::HostContext;
use crate::error::{CastRejection, EngineError};
use crate::events::{EventKind, EventLog};
use crate::guard::StaleReason;
use crate::pursuit::{AcquireOutcome, PursuitMachine};
use crate::scheduler::{Action, Scheduler, Tick, Timeline};
use crate::spells::SpellId;
use crate::toggle::{ToggleMachine, TriggerOutcome};
use crate::world::{EntityId, World};

/// What a mobile did about a world event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Ignored,
    Greeted,
    Pursuit(AcquireOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseOutcome {
    Toggled(TriggerOutcome),
    Eaten,
    OutOfReach,
    NothingHappens,
}

pub struct Engine {
    config: EngineConfig,
    pursuit: PursuitMachine,
    casts: CastMachine,
    toggles: ToggleMachine,
    behaviors: BehaviorBook,
    events: EventLog,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let casts = CastMachine::new(config.spells.iter().cloned(), config.seed);
        Engine {
            config,
            pursuit: PursuitMachine::new(),
            casts,
            toggles: ToggleMachine::new(),
            behaviors: BehaviorBook::new(),
            events: EventLog::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn pursuit(&self) -> &PursuitMachine {
        &self.pursuit
    }

    pub fn casts(&self) -> &CastMachine {
        &self.casts
    }

    pub fn toggles(&self) -> &ToggleMachine {
        &self.toggles
    }

    pub fn behaviors(&self) -> &BehaviorBook {
        &self.behaviors
    }

    /// Composes `profile` onto `mobile` and applies its starting attributes.
    pub fn attach_mobile(&mut self, world: &mut dyn World, mobile: EntityId, profile: MobileProfile) {
        for (&attribute, &value) in &profile.attributes {
            world.set_attribute(mobile, attribute, value);
        }
        if let Some(pursuit) = profile.pursuit {
            self.pursuit.attach(mobile, pursuit);
        }
        self.behaviors.set_mobile(mobile, profile);
    }

    /// Attaches a named profile from the configuration.
    pub fn attach_profile(
        &mut self,
        world: &mut dyn World,
        mobile: EntityId,
        name: &str,
    ) -> Result<(), EngineError> {
        let profile = self
            .config
            .profile(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProfile(name.to_string()))?;
        debug!("{mobile} uses profile '{name}'");
        self.attach_mobile(world, mobile, profile);
        Ok(())
    }

    pub fn attach_item(&mut self, item: EntityId, behavior: ItemBehavior) {
        if behavior == ItemBehavior::Door {
            self.toggles.attach(item, self.config.door.clone());
        }
        self.behaviors.set_item(item, behavior);
    }

    /// A player walked into `mobile`'s area.
    pub fn on_enter_area(
        &mut self,
        world: &mut dyn World,
        scheduler: &mut dyn Scheduler,
        mobile: EntityId,
        player: EntityId,
    ) -> Reaction {
        let Some(profile) = self.behaviors.mobile(mobile) else {
            return Reaction::Ignored;
        };
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        match &profile.on_sense {
            SenseReaction::Ignore => Reaction::Ignored,
            SenseReaction::Greet { text } => {
                let name = cx.world.name(player).unwrap_or_default();
                cx.world.say(mobile, &text.replace("{name}", &name));
                cx.record(EventKind::Greeted { mobile, player });
                Reaction::Greeted
            }
            SenseReaction::Engage { latch } => {
                Reaction::Pursuit(self.pursuit.sense(&mut cx, mobile, player, *latch))
            }
        }
    }

    pub fn on_attacked(
        &mut self,
        world: &mut dyn World,
        scheduler: &mut dyn Scheduler,
        mobile: EntityId,
        attacker: EntityId,
    ) -> Reaction {
        match self.behaviors.mobile(mobile).map(|profile| profile.on_attacked) {
            Some(AttackReaction::Engage) => {
                Reaction::Pursuit(self.acquire(world, scheduler, mobile, attacker))
            }
            Some(AttackReaction::Ignore) | None => Reaction::Ignored,
        }
    }

    pub fn acquire(
        &mut self,
        world: &mut dyn World,
        scheduler: &mut dyn Scheduler,
        mobile: EntityId,
        candidate: EntityId,
    ) -> AcquireOutcome {
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        self.pursuit.acquire(&mut cx, mobile, candidate)
    }

    pub fn force_target(
        &mut self,
        world: &mut dyn World,
        scheduler: &mut dyn Scheduler,
        mobile: EntityId,
        candidate: EntityId,
    ) -> AcquireOutcome {
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        self.pursuit.force_target(&mut cx, mobile, candidate)
    }

    pub fn release(&mut self, world: &mut dyn World, scheduler: &mut dyn Scheduler, mobile: EntityId) {
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        self.pursuit.release(&mut cx, mobile);
    }

    pub fn trigger(
        &mut self,
        world: &mut dyn World,
        scheduler: &mut dyn Scheduler,
        item: EntityId,
    ) -> TriggerOutcome {
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        self.toggles.trigger(&mut cx, item)
    }

    /// `user` double-clicked `item`.
    pub fn on_use(
        &mut self,
        world: &mut dyn World,
        scheduler: &mut dyn Scheduler,
        user: EntityId,
        item: EntityId,
    ) -> UseOutcome {
        match self.behaviors.item(item).cloned() {
            Some(ItemBehavior::Door) => UseOutcome::Toggled(self.trigger(world, scheduler, item)),
            Some(ItemBehavior::Food { reach }) => {
                let within = world.distance(user, item).map_or(false, |d| d <= reach);
                if !within {
                    world.send_message(user, "That is too far away.");
                    return UseOutcome::OutOfReach;
                }
                if world.consume(item, 1) {
                    world.send_message(user, "You feel less hungry");
                    UseOutcome::Eaten
                } else {
                    UseOutcome::NothingHappens
                }
            }
            None => UseOutcome::NothingHappens,
        }
    }

    pub fn begin_cast(
        &mut self,
        world: &mut dyn World,
        scheduler: &mut dyn Scheduler,
        caster: EntityId,
        spell: SpellId,
        target: CastTarget,
        scroll: Option<EntityId>,
    ) -> Result<SessionId, CastRejection> {
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        self.casts.begin(&mut cx, caster, spell, target, scroll)
    }

    /// Forces every attached door closed. Call once after the world is loaded.
    pub fn on_world_load(&mut self, world: &mut dyn World, scheduler: &mut dyn Scheduler) {
        let mut items: Vec<EntityId> = self.toggles.items().collect();
        items.sort();
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        for item in items {
            self.toggles.on_world_load(&mut cx, item);
        }
    }

    /// Runs one fired action.
    pub fn dispatch(&mut self, world: &mut dyn World, scheduler: &mut dyn Scheduler, action: Action) {
        let mut cx = HostContext::new(world, scheduler, &mut self.events);
        match action {
            Action::Pursue { mobile, opponent } => self.pursuit.on_fire(&mut cx, mobile, opponent),
            Action::ResolveCast { session } => {
                self.casts.resolve(&mut cx, session);
            }
            Action::AutoClose { item } => self.toggles.auto_close_fire(&mut cx, item),
            Action::Expire { item } => {
                if cx.world.exists(item) {
                    cx.world.delete(item);
                    cx.record(EventKind::ItemExpired { item });
                } else {
                    debug!("dropping {action}: item already gone");
                    cx.record(EventKind::StaleDiscarded {
                        action,
                        reason: StaleReason::Missing,
                    });
                }
            }
        }
    }

    /// Fires everything due up to and including `until`, then parks the clock
    /// there. Returns how many actions fired.
    pub fn run_until(&mut self, world: &mut dyn World, timeline: &mut Timeline, until: Tick) -> usize {
        let mut fired = 0;
        while let Some(entry) = timeline.pop_due(until) {
            self.dispatch(world, timeline, entry.action);
            fired += 1;
        }
        timeline.advance_to(until);
        if fired > 0 {
            info!("fired {fired} actions up to tick {until}");
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::{Engine, Reaction, UseOutcome};
    use crate::behavior::{ItemBehavior, MobileProfile};
    use crate::config::EngineConfig;
    use crate::error::EngineError;
    use crate::events::EventKind;
    use crate::pursuit::AcquireOutcome;
    use crate::scheduler::{Action, Timeline};
    use crate::sim_world::{SimWorld, WorldRecord};
    use crate::world::{Attribute, Location, World};

    #[test]
    fn guard_greets_and_only_fights_back() {
        let mut world = SimWorld::new(1);
        let mut timeline = Timeline::new(0);
        let mut engine = Engine::new(EngineConfig::default());
        let guard = world.spawn_mobile("a guard", Location::new(0, 0, 0));
        let player = world.spawn_player("Alice", Location::new(3, 0, 0));
        engine
            .attach_profile(&mut world, guard, "guard")
            .expect("guard profile exists");
        assert_eq!(world.attribute(guard, Attribute::BattleDefense), 1_000);

        assert_eq!(
            engine.on_enter_area(&mut world, &mut timeline, guard, player),
            Reaction::Greeted
        );
        assert!(world.journal().contains(&WorldRecord::Say {
            who: guard,
            text: "Greetings, citizen Alice!".to_string(),
        }));
        assert!(timeline.is_empty());

        assert_eq!(
            engine.on_attacked(&mut world, &mut timeline, guard, player),
            Reaction::Pursuit(AcquireOutcome::Engaged)
        );
        assert_eq!(engine.pursuit().state(guard).opponent, Some(player));
    }

    #[test]
    fn merchant_greets_and_never_fights() {
        let mut world = SimWorld::new(1);
        let mut timeline = Timeline::new(0);
        let mut engine = Engine::new(EngineConfig::default());
        let merchant = world.spawn_mobile("a merchant", Location::new(0, 0, 0));
        let player = world.spawn_player("Bob", Location::new(1, 0, 0));
        engine
            .attach_profile(&mut world, merchant, "merchant")
            .expect("merchant profile exists");

        assert_eq!(
            engine.on_enter_area(&mut world, &mut timeline, merchant, player),
            Reaction::Greeted
        );
        assert!(world.journal().contains(&WorldRecord::Say {
            who: merchant,
            text: "Hello, Bob".to_string(),
        }));
        assert_eq!(
            engine.on_attacked(&mut world, &mut timeline, merchant, player),
            Reaction::Ignored
        );
        assert!(timeline.is_empty());
    }

    #[test]
    fn orc_captain_is_a_tougher_orc() {
        let mut world = SimWorld::new(1);
        let mut timeline = Timeline::new(0);
        let mut engine = Engine::new(EngineConfig::default());
        let captain = world.spawn_mobile("an orc captain", Location::new(0, 0, 0));
        let player = world.spawn_player("Alice", Location::new(2, 0, 0));
        engine
            .attach_profile(&mut world, captain, "orc_captain")
            .expect("captain profile exists");
        assert_eq!(world.attribute(captain, Attribute::Strength), 150);
        assert_eq!(world.attribute(captain, Attribute::MagicDefense), 1_000);

        assert_eq!(
            engine.on_enter_area(&mut world, &mut timeline, captain, player),
            Reaction::Pursuit(AcquireOutcome::Engaged)
        );
        assert_eq!(engine.pursuit().state(captain).opponent, Some(player));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let mut world = SimWorld::new(1);
        let mut engine = Engine::new(EngineConfig::default());
        let mobile = world.spawn_mobile("a dragon", Location::default());
        assert_eq!(
            engine.attach_profile(&mut world, mobile, "dragon"),
            Err(EngineError::UnknownProfile("dragon".to_string()))
        );
    }

    #[test]
    fn food_is_eaten_only_within_reach() {
        let mut world = SimWorld::new(1);
        let mut timeline = Timeline::new(0);
        let mut engine = Engine::new(EngineConfig::default());
        let player = world.spawn_player("Alice", Location::new(0, 0, 0));
        let near = world.spawn_item("an apple", Location::new(1, 1, 0), 0x0011);
        let far = world.spawn_item("a pie", Location::new(9, 0, 0), 0x0137);
        engine.attach_item(near, ItemBehavior::Food { reach: 2 });
        engine.attach_item(far, ItemBehavior::Food { reach: 2 });

        assert_eq!(
            engine.on_use(&mut world, &mut timeline, player, near),
            UseOutcome::Eaten
        );
        assert!(!world.exists(near));
        assert_eq!(
            engine.on_use(&mut world, &mut timeline, player, far),
            UseOutcome::OutOfReach
        );
        assert!(world.exists(far));
        assert!(timeline.is_empty());
    }

    #[test]
    fn expire_deletes_once() {
        let mut world = SimWorld::new(1);
        let mut timeline = Timeline::new(0);
        let mut engine = Engine::new(EngineConfig::default());
        let light = world.spawn_item("light", Location::default(), 0x1B3);

        engine.dispatch(&mut world, &mut timeline, Action::Expire { item: light });
        engine.dispatch(&mut world, &mut timeline, Action::Expire { item: light });
        assert!(!world.exists(light));
        assert_eq!(
            engine
                .events()
                .count(|kind| matches!(kind, EventKind::ItemExpired { .. })),
            1
        );
        assert_eq!(
            engine
                .events()
                .count(|kind| matches!(kind, EventKind::StaleDiscarded { .. })),
            1
        );
    }

    #[test]
    fn profiles_without_pursuit_never_chase() {
        let mut world = SimWorld::new(1);
        let mut timeline = Timeline::new(0);
        let mut engine = Engine::new(EngineConfig::default());
        let mobile = world.spawn_mobile("a merchant", Location::default());
        let player = world.spawn_player("Alice", Location::new(1, 0, 0));
        let mut profile = MobileProfile::orc();
        profile.pursuit = None;
        engine.attach_mobile(&mut world, mobile, profile);
        assert_eq!(
            engine.on_enter_area(&mut world, &mut timeline, mobile, player),
            Reaction::Pursuit(AcquireOutcome::NotCapable)
        );
        assert!(timeline.is_empty());
    }
}
