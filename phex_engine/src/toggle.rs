//! Two-state timed devices (doors): open on use, close on use or after a
//! deadline that later re-opens push forward.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::HostContext;
use crate::events::EventKind;
use crate::guard::{NotBefore, PropertyBook, StaleReason};
use crate::scheduler::{Action, Tick};
use crate::world::EntityId;

/// Closed and open graphic of one door style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicPair {
    pub closed: u16,
    pub open: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub auto_close_delay: Tick,
    pub open_sound: u16,
    pub close_sound: u16,
    pub graphics: Vec<GraphicPair>,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        ToggleConfig {
            auto_close_delay: 4_000,
            open_sound: 0x42,
            close_sound: 0x48,
            graphics: vec![
                GraphicPair {
                    closed: 0x3D3,
                    open: 0x3D7,
                },
                GraphicPair {
                    closed: 0x3D4,
                    open: 0x3D8,
                },
            ],
        }
    }
}

impl ToggleConfig {
    /// The other half of `graphic`'s pair, or `graphic` itself when it is not
    /// a known door graphic.
    pub fn flipped(&self, graphic: u16) -> u16 {
        self.graphics
            .iter()
            .find_map(|pair| {
                if pair.closed == graphic {
                    Some(pair.open)
                } else if pair.open == graphic {
                    Some(pair.closed)
                } else {
                    None
                }
            })
            .unwrap_or(graphic)
    }

    pub fn closed_variant(&self, graphic: u16) -> u16 {
        self.graphics
            .iter()
            .find(|pair| pair.open == graphic)
            .map_or(graphic, |pair| pair.closed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToggleState {
    pub is_open: bool,
    pub close_not_before: NotBefore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Opened { close_not_before: Tick },
    Closed,
    NotToggle,
}

#[derive(Debug, Default)]
pub struct ToggleMachine {
    configs: HashMap<EntityId, ToggleConfig>,
    states: PropertyBook<ToggleState>,
}

impl ToggleMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, item: EntityId, config: ToggleConfig) {
        self.configs.insert(item, config);
    }

    pub fn is_attached(&self, item: EntityId) -> bool {
        self.configs.contains_key(&item)
    }

    pub fn state(&self, item: EntityId) -> ToggleState {
        self.states.get(item)
    }

    pub fn items(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.configs.keys().copied()
    }

    pub fn trigger(&mut self, cx: &mut HostContext<'_>, item: EntityId) -> TriggerOutcome {
        let Some(config) = self.configs.get(&item) else {
            return TriggerOutcome::NotToggle;
        };
        if self.states.get(item).is_open {
            Self::close(cx, &mut self.states, config, item, false);
            return TriggerOutcome::Closed;
        }

        let now = cx.now();
        cx.world.play_sound(item, config.open_sound);
        flip_graphic(cx, config, item);
        let state = self.states.entry(item);
        state.is_open = true;
        let close_not_before = state.close_not_before.arm(now, config.auto_close_delay);
        cx.arm(config.auto_close_delay, Action::AutoClose { item });
        cx.record(EventKind::ToggleOpened {
            item,
            close_not_before,
        });
        TriggerOutcome::Opened { close_not_before }
    }

    /// Body of the armed auto-close callback.
    pub fn auto_close_fire(&mut self, cx: &mut HostContext<'_>, item: EntityId) {
        let action = Action::AutoClose { item };
        let Some(config) = self.configs.get(&item) else {
            stale(cx, action, StaleReason::Missing);
            return;
        };
        let state = self.states.get(item);
        if !state.is_open {
            stale(cx, action, StaleReason::AlreadySettled);
            return;
        }
        if !state.close_not_before.is_ready(cx.now()) {
            stale(cx, action, StaleReason::NotYetDue);
            return;
        }
        Self::close(cx, &mut self.states, config, item, true);
    }

    /// Recovery on world load: never resume into an open state.
    pub fn on_world_load(&mut self, cx: &mut HostContext<'_>, item: EntityId) {
        let Some(config) = self.configs.get(&item) else {
            return;
        };
        if let Some(graphic) = cx.world.graphic(item) {
            let closed = config.closed_variant(graphic);
            if closed != graphic {
                cx.world.set_graphic(item, closed);
            }
        }
        self.states.entry(item).is_open = false;
        cx.record(EventKind::ToggleReset { item });
    }

    fn close(
        cx: &mut HostContext<'_>,
        states: &mut PropertyBook<ToggleState>,
        config: &ToggleConfig,
        item: EntityId,
        automatic: bool,
    ) {
        cx.world.play_sound(item, config.close_sound);
        flip_graphic(cx, config, item);
        states.entry(item).is_open = false;
        cx.record(EventKind::ToggleClosed { item, automatic });
    }
}

fn flip_graphic(cx: &mut HostContext<'_>, config: &ToggleConfig, item: EntityId) {
    if let Some(graphic) = cx.world.graphic(item) {
        let next = config.flipped(graphic);
        if next != graphic {
            cx.world.set_graphic(item, next);
        }
    }
}

fn stale(cx: &mut HostContext<'_>, action: Action, reason: StaleReason) {
    debug!("dropping {action}: {reason}");
    cx.record(EventKind::StaleDiscarded { action, reason });
}

#[cfg(test)]
mod tests {
    use super::{ToggleConfig, ToggleMachine, TriggerOutcome};
    use crate::context::HostContext;
    use crate::events::EventLog;
    use crate::scheduler::{Scheduler, Timeline};
    use crate::sim_world::{SimWorld, WorldRecord};
    use crate::world::{EntityId, Location, World};

    fn door(world: &mut SimWorld) -> EntityId {
        world.spawn_item("door", Location::new(5, 5, 0), 0x3D3)
    }

    #[test]
    fn flipped_uses_pairs_and_keeps_unknown_graphics() {
        let config = ToggleConfig::default();
        assert_eq!(config.flipped(0x3D3), 0x3D7);
        assert_eq!(config.flipped(0x3D8), 0x3D4);
        assert_eq!(config.flipped(0x123), 0x123);
        assert_eq!(config.closed_variant(0x3D7), 0x3D3);
        assert_eq!(config.closed_variant(0x3D3), 0x3D3);
    }

    #[test]
    fn open_then_close_flips_graphic_each_time() {
        let mut world = SimWorld::new(1);
        let item = door(&mut world);
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = ToggleMachine::new();
        machine.attach(item, ToggleConfig::default());

        let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
        assert_eq!(
            machine.trigger(&mut cx, item),
            TriggerOutcome::Opened {
                close_not_before: 4_000
            }
        );
        assert_eq!(cx.world.graphic(item), Some(0x3D7));
        assert_eq!(machine.trigger(&mut cx, item), TriggerOutcome::Closed);
        assert_eq!(cx.world.graphic(item), Some(0x3D3));

        assert_eq!(timeline.len(), 1, "manual close does not cancel the timer");
        let sounds: Vec<u16> = world
            .journal()
            .iter()
            .filter_map(|record| match record {
                WorldRecord::Sound { sound, .. } => Some(*sound),
                _ => None,
            })
            .collect();
        assert_eq!(sounds, vec![0x42, 0x48]);
    }

    #[test]
    fn unattached_items_are_ignored() {
        let mut world = SimWorld::new(1);
        let item = door(&mut world);
        let mut timeline = Timeline::new(0);
        let mut events = EventLog::new();
        let mut machine = ToggleMachine::new();
        let mut cx = HostContext::new(&mut world, &mut timeline, &mut events);
        assert_eq!(machine.trigger(&mut cx, item), TriggerOutcome::NotToggle);
        assert_eq!(timeline.now(), 0);
        assert!(timeline.is_empty());
        assert!(world.journal().is_empty());
    }
}
