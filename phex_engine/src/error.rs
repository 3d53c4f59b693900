use thiserror::Error;

use crate::spells::SpellId;

/// Why a cast was refused before anything was committed. The `Display` text
/// is what the caster is told.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastRejection {
    #[error("You don't know that spell.")]
    UnknownSpell(SpellId),
    #[error("You cannot cast right now.")]
    CasterUnavailable,
    #[error("The scroll is gone.")]
    MissingScroll,
    #[error("That is not a valid target.")]
    InvalidTarget,
    #[error("That is too far away.")]
    OutOfRange { distance: u32, range: u32 },
    #[error("You can't see that.")]
    NotVisible,
    #[error("You don't have enough mana.")]
    InsufficientMana { required: i64, available: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("spell {spell:?}: presentation window [{min}, {max}] is inverted")]
    InvertedWindow { spell: SpellId, min: u64, max: u64 },
    #[error("spell {spell:?}: scaling divisor must not be zero")]
    ZeroDivisor { spell: SpellId },
    #[error("spell {0:?} is defined more than once")]
    DuplicateSpell(SpellId),
    #[error("mobile profile '{0}': pursuit cadence must be positive")]
    ZeroCadence(String),
    #[error("door auto-close delay must be positive")]
    ZeroAutoClose,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown mobile profile '{0}'")]
    UnknownProfile(String),
}
