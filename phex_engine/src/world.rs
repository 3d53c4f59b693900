//! Host-facing world interface.
//!
//! The engine never owns entities. Everything it knows about positions,
//! visibility, attributes or presentation comes through [`World`], which the
//! game host implements (see [`crate::sim_world::SimWorld`] for the in-memory
//! reference host).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scheduler::Tick;
use crate::spells::SpellId;

/// Opaque handle to a world object (player, mobile or item).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Tile distance as the world measures it: the larger of the two planar
    /// offsets. Height does not count.
    pub fn distance_to(&self, other: &Location) -> u32 {
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dy = (i64::from(self.y) - i64::from(other.y)).unsigned_abs();
        u32::try_from(dx.max(dy)).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Strength,
    Fatigue,
    Intelligence,
    Hits,
    MaxHits,
    Mana,
    MaxMana,
    Melee,
    BattleDefense,
    MagicDefense,
}

/// Visual effects the engine asks the host to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualEffect {
    Fireball,
}

/// Everything the engine needs from the game world.
///
/// Queries on unknown entities must answer with the "absent" value
/// (`false`, `None`, `0`) rather than panic; mutations on unknown entities
/// are ignored.
pub trait World {
    fn exists(&self, entity: EntityId) -> bool;
    /// Present and, for mobiles and players, not dead.
    fn is_alive(&self, entity: EntityId) -> bool;
    fn is_visible(&self, entity: EntityId) -> bool;
    fn can_see(&self, from: EntityId, to: EntityId) -> bool;
    fn distance(&self, a: EntityId, b: EntityId) -> Option<u32>;
    fn location(&self, entity: EntityId) -> Option<Location>;
    fn name(&self, entity: EntityId) -> Option<String>;

    fn attribute(&self, entity: EntityId, attribute: Attribute) -> i64;
    fn set_attribute(&mut self, entity: EntityId, attribute: Attribute, value: i64);
    /// Opposed skill check in `[min_required, max_until_no_gain]`; may train
    /// the skill as a side effect.
    fn check_skill(
        &mut self,
        entity: EntityId,
        skill: Attribute,
        min_required: i64,
        max_until_no_gain: i64,
    ) -> bool;

    /// Starts (or continues) a melee exchange. Damage resolution is the host's.
    fn attack(&mut self, attacker: EntityId, defender: EntityId);
    /// Moves `who` one step toward `target`. Returns `false` when no step was
    /// possible.
    fn step_toward(&mut self, who: EntityId, target: EntityId) -> bool;
    /// Visible players within sensing range of `who`, nearest-first order is
    /// not required.
    fn nearby_players(&self, who: EntityId) -> Vec<EntityId>;

    fn deal_damage(&mut self, target: EntityId, amount: i64);
    fn heal(&mut self, target: EntityId, amount: i64);

    fn graphic(&self, entity: EntityId) -> Option<u16>;
    fn set_graphic(&mut self, entity: EntityId, graphic: u16);
    fn play_sound(&mut self, near: EntityId, sound: u16);
    fn send_message(&mut self, to: EntityId, text: &str);
    fn say(&mut self, who: EntityId, text: &str);
    fn animate_cast(&mut self, caster: EntityId, spell: SpellId, presentation_delay: Tick);
    fn play_effect(&mut self, from: EntityId, to: EntityId, effect: VisualEffect);

    fn create_item(&mut self, at: Location, graphic: u16) -> EntityId;
    fn delete(&mut self, entity: EntityId);
    /// Removes `amount` units from a stack, deleting it when it runs out.
    /// Returns `false` if the item is missing or too small.
    fn consume(&mut self, item: EntityId, amount: u32) -> bool;
}
