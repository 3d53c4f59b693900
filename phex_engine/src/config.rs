use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::behavior::MobileProfile;
use crate::error::ConfigError;
use crate::spells::SpellSpec;
use crate::toggle::ToggleConfig;

/// Everything tunable about the engine. Every field has a built-in default,
/// so a config file only needs the parts it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seeds the presentation-delay generator.
    pub seed: u64,
    pub door: ToggleConfig,
    pub spells: Vec<SpellSpec>,
    pub mobiles: BTreeMap<String, MobileProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            seed: 0,
            door: ToggleConfig::default(),
            spells: SpellSpec::builtin_catalog(),
            mobiles: MobileProfile::builtin_profiles(),
        }
    }
}

impl EngineConfig {
    /// Reads a config file; `None` or a missing file yields the defaults.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            warn!("config {} not found; using built-in defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config: {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse engine config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid engine config: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.door.auto_close_delay == 0 {
            return Err(ConfigError::ZeroAutoClose);
        }
        let mut seen = BTreeSet::new();
        for spell in &self.spells {
            if !seen.insert(spell.id) {
                return Err(ConfigError::DuplicateSpell(spell.id));
            }
            let (min, max) = spell.presentation_window;
            if min > max {
                return Err(ConfigError::InvertedWindow {
                    spell: spell.id,
                    min,
                    max,
                });
            }
            if spell.divisors().contains(&0) {
                return Err(ConfigError::ZeroDivisor { spell: spell.id });
            }
        }
        for (name, profile) in &self.mobiles {
            if profile.pursuit.map_or(false, |pursuit| pursuit.cadence == 0) {
                return Err(ConfigError::ZeroCadence(name.clone()));
            }
        }
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Option<&MobileProfile> {
        self.mobiles.get(name)
    }
}
