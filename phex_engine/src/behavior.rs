//! Capability records attached to entities. The engine looks these up to
//! decide which machine a world event goes to.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::pursuit::{AggressionPolicy, PursuitConfig};
use crate::toggle::ToggleConfig;
use crate::world::{Attribute, EntityId};

/// What a mobile does when a player walks into its area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SenseReaction {
    Ignore,
    /// Says `text` with `{name}` replaced by the player's name.
    Greet { text: String },
    /// Starts a pursuit. With `latch`, further arrivals are ignored until the
    /// mobile runs out of victims.
    Engage {
        #[serde(default)]
        latch: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackReaction {
    Ignore,
    Engage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileProfile {
    #[serde(default)]
    pub pursuit: Option<PursuitConfig>,
    pub on_sense: SenseReaction,
    pub on_attacked: AttackReaction,
    /// Applied once when the profile is attached.
    #[serde(default)]
    pub attributes: BTreeMap<Attribute, i64>,
}

impl MobileProfile {
    pub fn orc() -> Self {
        MobileProfile {
            pursuit: Some(PursuitConfig::default()),
            on_sense: SenseReaction::Engage { latch: false },
            on_attacked: AttackReaction::Engage,
            attributes: stats(&[
                (Attribute::Strength, 125),
                (Attribute::Fatigue, 125),
                (Attribute::Intelligence, 25),
                (Attribute::Melee, 900),
                (Attribute::BattleDefense, 800),
                (Attribute::MagicDefense, 500),
            ]),
        }
    }

    pub fn guard() -> Self {
        MobileProfile {
            pursuit: Some(PursuitConfig {
                policy: AggressionPolicy::DefendOnly,
                ..PursuitConfig::default()
            }),
            on_sense: SenseReaction::Greet {
                text: "Greetings, citizen {name}!".to_string(),
            },
            on_attacked: AttackReaction::Engage,
            attributes: stats(&[
                (Attribute::Strength, 100),
                (Attribute::Fatigue, 100),
                (Attribute::Intelligence, 25),
                (Attribute::Melee, 800),
                (Attribute::BattleDefense, 1_000),
                (Attribute::MagicDefense, 500),
            ]),
        }
    }

    pub fn skeleton() -> Self {
        MobileProfile {
            pursuit: Some(PursuitConfig::default()),
            on_sense: SenseReaction::Engage { latch: true },
            on_attacked: AttackReaction::Ignore,
            attributes: stats(&[
                (Attribute::Strength, 25),
                (Attribute::Fatigue, 10),
                (Attribute::Intelligence, 25),
                (Attribute::Melee, 250),
                (Attribute::BattleDefense, 300),
            ]),
        }
    }

    pub fn orc_captain() -> Self {
        MobileProfile {
            attributes: stats(&[
                (Attribute::Strength, 150),
                (Attribute::Fatigue, 150),
                (Attribute::Intelligence, 25),
                (Attribute::Melee, 1_000),
                (Attribute::BattleDefense, 1_000),
                (Attribute::MagicDefense, 1_000),
            ]),
            ..Self::orc()
        }
    }

    /// Greets passers-by and never fights back.
    pub fn merchant() -> Self {
        MobileProfile {
            pursuit: None,
            on_sense: SenseReaction::Greet {
                text: "Hello, {name}".to_string(),
            },
            on_attacked: AttackReaction::Ignore,
            attributes: stats(&[
                (Attribute::Strength, 25),
                (Attribute::Fatigue, 10),
                (Attribute::Intelligence, 25),
            ]),
        }
    }

    pub fn builtin_profiles() -> BTreeMap<String, MobileProfile> {
        BTreeMap::from([
            ("orc".to_string(), Self::orc()),
            ("orc_captain".to_string(), Self::orc_captain()),
            ("guard".to_string(), Self::guard()),
            ("merchant".to_string(), Self::merchant()),
            ("skeleton".to_string(), Self::skeleton()),
        ])
    }
}

fn stats(values: &[(Attribute, i64)]) -> BTreeMap<Attribute, i64> {
    values.iter().copied().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemBehavior {
    Door,
    /// Edible stack; using it within `reach` tiles eats one unit.
    Food {
        #[serde(default = "default_reach")]
        reach: u32,
    },
}

fn default_reach() -> u32 {
    2
}

/// Behavior composed onto one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Behavior {
    pub mobile: Option<MobileProfile>,
    pub item: Option<ItemBehavior>,
}

#[derive(Debug, Default)]
pub struct BehaviorBook {
    entries: HashMap<EntityId, Behavior>,
}

impl BehaviorBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mobile(&mut self, entity: EntityId, profile: MobileProfile) {
        self.entries.entry(entity).or_default().mobile = Some(profile);
    }

    pub fn set_item(&mut self, entity: EntityId, behavior: ItemBehavior) {
        self.entries.entry(entity).or_default().item = Some(behavior);
    }

    pub fn mobile(&self, entity: EntityId) -> Option<&MobileProfile> {
        self.entries.get(&entity)?.mobile.as_ref()
    }

    pub fn item(&self, entity: EntityId) -> Option<&ItemBehavior> {
        self.entries.get(&entity)?.item.as_ref()
    }

    pub fn get(&self, entity: EntityId) -> Option<&Behavior> {
        self.entries.get(&entity)
    }
}

#[cfg(test)]
mod tests {
    use super::{AttackReaction, BehaviorBook, ItemBehavior, MobileProfile, SenseReaction};
    use crate::world::EntityId;

    #[test]
    fn profile_json_fills_optional_fields() {
        let raw = r#"{
            "on_sense": { "type": "engage" },
            "on_attacked": "ignore"
        }"#;
        let profile: MobileProfile = serde_json::from_str(raw).expect("valid profile json");
        assert_eq!(profile.pursuit, None);
        assert_eq!(profile.on_sense, SenseReaction::Engage { latch: false });
        assert_eq!(profile.on_attacked, AttackReaction::Ignore);
        assert!(profile.attributes.is_empty());

        let food: ItemBehavior = serde_json::from_str(r#"{ "type": "food" }"#).expect("food");
        assert_eq!(food, ItemBehavior::Food { reach: 2 });
    }

    #[test]
    fn mobile_and_item_halves_compose() {
        let mut book = BehaviorBook::new();
        let id = EntityId(7);
        book.set_mobile(id, MobileProfile::guard());
        book.set_item(id, ItemBehavior::Door);
        let behavior = book.get(id).expect("entry exists");
        assert!(behavior.mobile.is_some());
        assert_eq!(behavior.item, Some(ItemBehavior::Door));
        assert!(book.mobile(EntityId(8)).is_none());
    }
}
