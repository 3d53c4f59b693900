//! Spell definitions: immutable per-spell records the cast machine reads.

use serde::{Deserialize, Serialize};

use crate::scheduler::Tick;
use crate::world::{Attribute, VisualEffect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellId {
    Fireball,
    Healing,
    Lightsource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A live entity (player or mobile).
    Mobile,
    /// A point on the map; an entity target stands for its location.
    Location,
}

/// `attribute(caster) * multiplier / divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scaling {
    pub attribute: Attribute,
    #[serde(default = "one")]
    pub multiplier: i64,
    pub divisor: i64,
}

fn one() -> i64 {
    1
}

impl Scaling {
    pub const fn per(attribute: Attribute, divisor: i64) -> Self {
        Self {
            attribute,
            multiplier: 1,
            divisor,
        }
    }

    pub fn apply(&self, value: i64) -> i64 {
        if self.divisor == 0 {
            return 0;
        }
        value.saturating_mul(self.multiplier) / self.divisor
    }
}

/// Opposed check made by the target; success divides the magnitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resistance {
    pub skill: Attribute,
    pub min_required: i64,
    pub max_until_no_gain: i64,
    pub divisor: i64,
    pub message: String,
    pub sound: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpellEffect {
    Damage {
        scaling: Scaling,
        #[serde(default)]
        resistance: Option<Resistance>,
        sound: u16,
        #[serde(default)]
        visual: Option<VisualEffect>,
    },
    Heal {
        scaling: Scaling,
        sound: u16,
    },
    /// Creates a temporary light item that expires after `duration` ticks.
    Light {
        graphic: u16,
        duration: Scaling,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSpec {
    pub id: SpellId,
    pub mana_cost: i64,
    pub cast_delay: Tick,
    /// `[min, max]` ticks for the cast animation cue.
    pub presentation_window: (Tick, Tick),
    #[serde(default)]
    pub range: Option<u32>,
    #[serde(default)]
    pub requires_sight: bool,
    pub target: TargetKind,
    pub effect: SpellEffect,
}

impl SpellSpec {
    pub fn fireball() -> Self {
        SpellSpec {
            id: SpellId::Fireball,
            mana_cost: 20,
            cast_delay: 2_000,
            presentation_window: (100, 300),
            range: Some(10),
            requires_sight: true,
            target: TargetKind::Mobile,
            effect: SpellEffect::Damage {
                scaling: Scaling::per(Attribute::Intelligence, 5),
                resistance: Some(Resistance {
                    skill: Attribute::MagicDefense,
                    min_required: 0,
                    max_until_no_gain: 1_100,
                    divisor: 3,
                    message: "You feel yourself resisting magical energy!".to_string(),
                    sound: 0xA1,
                }),
                sound: 0xA2,
                visual: Some(VisualEffect::Fireball),
            },
        }
    }

    pub fn healing() -> Self {
        SpellSpec {
            id: SpellId::Healing,
            mana_cost: 15,
            cast_delay: 1_000,
            presentation_window: (100, 200),
            range: Some(10),
            requires_sight: true,
            target: TargetKind::Mobile,
            effect: SpellEffect::Heal {
                scaling: Scaling::per(Attribute::Intelligence, 3),
                sound: 0xA4,
            },
        }
    }

    pub fn lightsource() -> Self {
        SpellSpec {
            id: SpellId::Lightsource,
            mana_cost: 20,
            cast_delay: 2_000,
            presentation_window: (300, 500),
            range: None,
            requires_sight: false,
            target: TargetKind::Location,
            effect: SpellEffect::Light {
                graphic: 0x1B3,
                duration: Scaling {
                    attribute: Attribute::Intelligence,
                    multiplier: 1_000,
                    divisor: 3,
                },
            },
        }
    }

    pub fn builtin_catalog() -> Vec<SpellSpec> {
        vec![Self::fireball(), Self::healing(), Self::lightsource()]
    }

    pub(crate) fn divisors(&self) -> Vec<i64> {
        match &self.effect {
            SpellEffect::Damage {
                scaling,
                resistance,
                ..
            } => {
                let mut divisors = vec![scaling.divisor];
                if let Some(resistance) = resistance {
                    divisors.push(resistance.divisor);
                }
                divisors
            }
            SpellEffect::Heal { scaling, .. } => vec![scaling.divisor],
            SpellEffect::Light { duration, .. } => vec![duration.divisor],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Scaling, SpellEffect, SpellSpec};
    use crate::world::Attribute;

    #[test]
    fn scaling_divides_after_multiplying() {
        let light = Scaling {
            attribute: Attribute::Intelligence,
            multiplier: 1_000,
            divisor: 3,
        };
        assert_eq!(light.apply(30), 10_000);
        assert_eq!(Scaling::per(Attribute::Intelligence, 5).apply(24), 4);
        assert_eq!(Scaling::per(Attribute::Intelligence, 0).apply(24), 0);
    }

    #[test]
    fn spell_specs_read_with_optional_fields_missing() {
        let raw = r#"{
            "id": "healing",
            "mana_cost": 5,
            "cast_delay": 250,
            "presentation_window": [10, 20],
            "target": "mobile",
            "effect": { "type": "heal", "scaling": { "attribute": "intelligence", "divisor": 2 }, "sound": 164 }
        }"#;
        let spec: SpellSpec = serde_json::from_str(raw).expect("valid spell json");
        assert_eq!(spec.range, None);
        assert!(!spec.requires_sight);
        match spec.effect {
            SpellEffect::Heal { scaling, sound } => {
                assert_eq!(scaling.multiplier, 1);
                assert_eq!(sound, 0xA4);
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }
}
