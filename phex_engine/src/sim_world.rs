//! In-memory reference host. Positions are tiles, sight is a fixed radius
//! with optional blocked pairs, and every presentation call lands in a
//! journal that tests and the scenario harness can inspect.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::scheduler::Tick;
use crate::spells::SpellId;
use crate::world::{Attribute, EntityId, Location, VisualEffect, World};

/// How far anything can be seen or sensed, in tiles.
pub const VISIBLE_RANGE: u32 = 15;

const DEFAULT_HITS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Mobile,
    Item,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub location: Location,
    pub graphic: u16,
    pub visible: bool,
    pub alive: bool,
    pub amount: u32,
    pub attributes: BTreeMap<Attribute, i64>,
}

impl SimEntity {
    pub fn new(id: EntityId, kind: EntityKind, name: impl Into<String>, location: Location) -> Self {
        let mut attributes = BTreeMap::new();
        if kind != EntityKind::Item {
            attributes.insert(Attribute::Hits, DEFAULT_HITS);
            attributes.insert(Attribute::MaxHits, DEFAULT_HITS);
        }
        SimEntity {
            id,
            kind,
            name: name.into(),
            location,
            graphic: 0,
            visible: true,
            alive: true,
            amount: 1,
            attributes,
        }
    }
}

/// Everything the world was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum WorldRecord {
    Attack { attacker: EntityId, defender: EntityId },
    Moved { who: EntityId, to: Location },
    Damage { target: EntityId, amount: i64, remaining: i64 },
    Heal { target: EntityId, amount: i64, hits: i64 },
    Graphic { entity: EntityId, from: u16, to: u16 },
    Sound { near: EntityId, sound: u16 },
    Message { to: EntityId, text: String },
    Say { who: EntityId, text: String },
    CastAnimation { caster: EntityId, spell: SpellId, delay: Tick },
    Effect { from: EntityId, to: EntityId, effect: VisualEffect },
    ItemCreated { item: EntityId, graphic: u16, at: Location },
    ItemDeleted { item: EntityId },
    Consumed { item: EntityId, amount: u32 },
    SkillGain { entity: EntityId, skill: Attribute, value: i64 },
}

#[derive(Debug)]
pub struct SimWorld {
    entities: BTreeMap<EntityId, SimEntity>,
    next_id: u32,
    blocked_sight: BTreeSet<(EntityId, EntityId)>,
    rooted: BTreeSet<EntityId>,
    journal: Vec<WorldRecord>,
    rng: SmallRng,
}

impl SimWorld {
    pub fn new(seed: u64) -> Self {
        SimWorld {
            entities: BTreeMap::new(),
            next_id: 1,
            blocked_sight: BTreeSet::new(),
            rooted: BTreeSet::new(),
            journal: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Inserts a prepared entity, keeping its id. Later spawns never reuse it.
    pub fn insert(&mut self, entity: SimEntity) -> EntityId {
        let id = entity.id;
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        self.entities.insert(id, entity);
        id
    }

    fn spawn(&mut self, kind: EntityKind, name: &str, location: Location) -> EntityId {
        let id = EntityId(self.next_id);
        self.insert(SimEntity::new(id, kind, name, location))
    }

    pub fn spawn_player(&mut self, name: &str, location: Location) -> EntityId {
        self.spawn(EntityKind::Player, name, location)
    }

    pub fn spawn_mobile(&mut self, name: &str, location: Location) -> EntityId {
        self.spawn(EntityKind::Mobile, name, location)
    }

    pub fn spawn_item(&mut self, name: &str, location: Location, graphic: u16) -> EntityId {
        let id = self.spawn(EntityKind::Item, name, location);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.graphic = graphic;
        }
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&SimEntity> {
        self.entities.get(&id)
    }

    pub fn set_visible(&mut self, id: EntityId, visible: bool) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.visible = visible;
        }
    }

    pub fn set_amount(&mut self, id: EntityId, amount: u32) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.amount = amount;
        }
    }

    pub fn move_to(&mut self, id: EntityId, location: Location) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.location = location;
        }
    }

    pub fn kill(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.alive = false;
            entity.attributes.insert(Attribute::Hits, 0);
        }
    }

    /// Blocks (or clears) line of sight between two entities, both ways.
    pub fn block_sight(&mut self, a: EntityId, b: EntityId, blocked: bool) {
        let key = (a.min(b), a.max(b));
        if blocked {
            self.blocked_sight.insert(key);
        } else {
            self.blocked_sight.remove(&key);
        }
    }

    /// A rooted entity cannot step anywhere.
    pub fn set_rooted(&mut self, id: EntityId, rooted: bool) {
        if rooted {
            self.rooted.insert(id);
        } else {
            self.rooted.remove(&id);
        }
    }

    pub fn journal(&self) -> &[WorldRecord] {
        &self.journal
    }

    pub fn journal_count(&self, predicate: impl Fn(&WorldRecord) -> bool) -> usize {
        self.journal.iter().filter(|record| predicate(record)).count()
    }

    fn pair(&self, a: EntityId, b: EntityId) -> Option<(&SimEntity, &SimEntity)> {
        Some((self.entities.get(&a)?, self.entities.get(&b)?))
    }

    fn try_chance(&mut self, chance: f64) -> bool {
        self.rng.gen::<f64>() < chance
    }
}

impl World for SimWorld {
    fn exists(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.get(&entity).map_or(false, |e| e.alive)
    }

    fn is_visible(&self, entity: EntityId) -> bool {
        self.entities.get(&entity).map_or(false, |e| e.visible)
    }

    fn can_see(&self, from: EntityId, to: EntityId) -> bool {
        let Some((a, b)) = self.pair(from, to) else {
            return false;
        };
        a.location.distance_to(&b.location) <= VISIBLE_RANGE
            && !self.blocked_sight.contains(&(from.min(to), from.max(to)))
    }

    fn distance(&self, a: EntityId, b: EntityId) -> Option<u32> {
        let (a, b) = self.pair(a, b)?;
        Some(a.location.distance_to(&b.location))
    }

    fn location(&self, entity: EntityId) -> Option<Location> {
        self.entities.get(&entity).map(|e| e.location)
    }

    fn name(&self, entity: EntityId) -> Option<String> {
        self.entities.get(&entity).map(|e| e.name.clone())
    }

    fn attribute(&self, entity: EntityId, attribute: Attribute) -> i64 {
        self.entities
            .get(&entity)
            .and_then(|e| e.attributes.get(&attribute).copied())
            .unwrap_or(0)
    }

    fn set_attribute(&mut self, entity: EntityId, attribute: Attribute, value: i64) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.attributes.insert(attribute, value);
        }
    }

    fn check_skill(
        &mut self,
        entity: EntityId,
        skill: Attribute,
        min_required: i64,
        max_until_no_gain: i64,
    ) -> bool {
        if !self.exists(entity) {
            return false;
        }
        let value = self.attribute(entity, skill);
        if value < min_required {
            return false;
        }
        if value >= max_until_no_gain {
            return true;
        }

        let success_chance =
            (value - min_required) as f64 / (max_until_no_gain - min_required) as f64;
        let success = self.try_chance(success_chance);
        let gain_chance = if value < 50 && min_required == 0 {
            0.5
        } else {
            (1.0 - success_chance).max(0.025)
        };
        if self.try_chance(gain_chance) && value < 1_000 {
            self.set_attribute(entity, skill, value + 1);
            self.journal.push(WorldRecord::SkillGain {
                entity,
                skill,
                value: value + 1,
            });
        }
        debug!("{entity} checks {skill:?} {value} vs {min_required}: chance {success_chance:.2}, success {success}");
        success
    }

    fn attack(&mut self, attacker: EntityId, defender: EntityId) {
        self.journal.push(WorldRecord::Attack { attacker, defender });
    }

    fn step_toward(&mut self, who: EntityId, target: EntityId) -> bool {
        if self.rooted.contains(&who) {
            return false;
        }
        let Some((mover, goal)) = self.pair(who, target) else {
            return false;
        };
        let distance = mover.location.distance_to(&goal.location);
        if distance == 0 || distance >= VISIBLE_RANGE {
            return false;
        }
        let from = mover.location;
        let to = Location::new(
            from.x.saturating_add(goal.location.x.cmp(&from.x) as i32),
            from.y.saturating_add(goal.location.y.cmp(&from.y) as i32),
            from.z,
        );
        self.move_to(who, to);
        self.journal.push(WorldRecord::Moved { who, to });
        true
    }

    fn nearby_players(&self, who: EntityId) -> Vec<EntityId> {
        let Some(origin) = self.location(who) else {
            return Vec::new();
        };
        self.entities
            .values()
            .filter(|e| {
                e.kind == EntityKind::Player
                    && e.id != who
                    && e.visible
                    && e.alive
                    && e.location.distance_to(&origin) <= VISIBLE_RANGE
            })
            .map(|e| e.id)
            .collect()
    }

    fn deal_damage(&mut self, target: EntityId, amount: i64) {
        let Some(entity) = self.entities.get_mut(&target) else {
            return;
        };
        let hits = entity.attributes.entry(Attribute::Hits).or_insert(0);
        *hits -= amount;
        let remaining = *hits;
        if remaining <= 0 {
            entity.alive = false;
        }
        self.journal.push(WorldRecord::Damage {
            target,
            amount,
            remaining,
        });
    }

    fn heal(&mut self, target: EntityId, amount: i64) {
        let Some(entity) = self.entities.get_mut(&target) else {
            return;
        };
        let max = entity.attributes.get(&Attribute::MaxHits).copied();
        let hits = entity.attributes.entry(Attribute::Hits).or_insert(0);
        *hits = match max {
            Some(max) => (*hits + amount).min(max),
            None => *hits + amount,
        };
        let hits = *hits;
        self.journal.push(WorldRecord::Heal {
            target,
            amount,
            hits,
        });
    }

    fn graphic(&self, entity: EntityId) -> Option<u16> {
        self.entities.get(&entity).map(|e| e.graphic)
    }

    fn set_graphic(&mut self, entity: EntityId, graphic: u16) {
        if let Some(e) = self.entities.get_mut(&entity) {
            let from = std::mem::replace(&mut e.graphic, graphic);
            self.journal.push(WorldRecord::Graphic {
                entity,
                from,
                to: graphic,
            });
        }
    }

    fn play_sound(&mut self, near: EntityId, sound: u16) {
        self.journal.push(WorldRecord::Sound { near, sound });
    }

    fn send_message(&mut self, to: EntityId, text: &str) {
        self.journal.push(WorldRecord::Message {
            to,
            text: text.to_string(),
        });
    }

    fn say(&mut self, who: EntityId, text: &str) {
        self.journal.push(WorldRecord::Say {
            who,
            text: text.to_string(),
        });
    }

    fn animate_cast(&mut self, caster: EntityId, spell: SpellId, presentation_delay: Tick) {
        self.journal.push(WorldRecord::CastAnimation {
            caster,
            spell,
            delay: presentation_delay,
        });
    }

    fn play_effect(&mut self, from: EntityId, to: EntityId, effect: VisualEffect) {
        self.journal.push(WorldRecord::Effect { from, to, effect });
    }

    fn create_item(&mut self, at: Location, graphic: u16) -> EntityId {
        let item = self.spawn_item("item", at, graphic);
        self.journal.push(WorldRecord::ItemCreated { item, graphic, at });
        item
    }

    fn delete(&mut self, entity: EntityId) {
        if self.entities.remove(&entity).is_some() {
            self.journal.push(WorldRecord::ItemDeleted { item: entity });
        }
    }

    fn consume(&mut self, item: EntityId, amount: u32) -> bool {
        let Some(entity) = self.entities.get_mut(&item) else {
            return false;
        };
        if entity.amount < amount {
            return false;
        }
        entity.amount -= amount;
        let emptied = entity.amount == 0;
        self.journal.push(WorldRecord::Consumed { item, amount });
        if emptied {
            self.delete(item);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{SimWorld, WorldRecord, VISIBLE_RANGE};
    use crate::world::{Attribute, Location, World};

    #[test]
    fn step_toward_moves_one_tile_diagonally() {
        let mut world = SimWorld::new(1);
        let orc = world.spawn_mobile("an orc", Location::new(0, 0, 0));
        let player = world.spawn_player("Alice", Location::new(4, -2, 0));
        assert!(world.step_toward(orc, player));
        assert_eq!(world.location(orc), Some(Location::new(1, -1, 0)));
        assert_eq!(world.distance(orc, player), Some(3));

        world.set_rooted(orc, true);
        assert!(!world.step_toward(orc, player));
    }

    #[test]
    fn sight_is_limited_by_range_and_blocks() {
        let mut world = SimWorld::new(1);
        let a = world.spawn_player("A", Location::new(0, 0, 0));
        let b = world.spawn_player("B", Location::new(VISIBLE_RANGE as i32, 0, 0));
        let c = world.spawn_player("C", Location::new(VISIBLE_RANGE as i32 + 1, 0, 0));
        assert!(world.can_see(a, b));
        assert!(!world.can_see(a, c));
        world.block_sight(b, a, true);
        assert!(!world.can_see(a, b));
        assert_eq!(world.nearby_players(a), vec![b]);
    }

    #[test]
    fn skill_check_extremes_are_deterministic() {
        let mut world = SimWorld::new(5);
        let target = world.spawn_player("T", Location::default());
        world.set_attribute(target, Attribute::MagicDefense, 1_100);
        assert!(world.check_skill(target, Attribute::MagicDefense, 0, 1_100));
        world.set_attribute(target, Attribute::MagicDefense, 0);
        assert!(!world.check_skill(target, Attribute::MagicDefense, 0, 1_100));
    }

    #[test]
    fn lethal_damage_kills_and_consuming_last_unit_deletes() {
        let mut world = SimWorld::new(1);
        let player = world.spawn_player("A", Location::default());
        world.deal_damage(player, 60);
        assert!(!world.is_alive(player));

        let food = world.spawn_item("apple", Location::default(), 0x09D0);
        world.set_amount(food, 2);
        assert!(world.consume(food, 1));
        assert!(world.exists(food));
        assert!(world.consume(food, 1));
        assert!(!world.exists(food));
        assert!(!world.consume(food, 1));
        assert_eq!(
            world.journal_count(|r| matches!(r, WorldRecord::ItemDeleted { .. })),
            1
        );
    }
}
