//! Personnel archetypes: stationed combatants, heroes, and fiefdom officials.
//!
//! Instances store only a template key and a level; every stat is derived here.

use std::collections::BTreeMap;

use contracts::{DamageProfile, OfficialRole, OfficialStats, ResourceAmounts, ResourceKind};
use serde::Deserialize;

use crate::progression::{clamped_at_level, extrapolate_f64, extrapolate_with_cap};

fn default_max_level() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Combatants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CombatantTemplate {
    pub name: String,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    #[serde(default)]
    pub morale_boost: Vec<f64>,
    #[serde(default)]
    pub damage: Vec<DamageProfile>,
    #[serde(default)]
    pub defense: Vec<Option<DamageProfile>>,
    #[serde(default)]
    pub movement_speed: Vec<f64>,
    #[serde(default)]
    pub costs: Vec<BTreeMap<ResourceKind, i64>>,
}

impl CombatantTemplate {
    pub fn damage_at(&self, level: u32) -> DamageProfile {
        profile_at(&self.damage, level)
    }

    /// Defense for `level`. A missing entry in either of the last two
    /// configured levels leaves extrapolated levels without defense.
    pub fn defense_at(&self, level: u32) -> Option<DamageProfile> {
        let index = level.max(1) as usize - 1;
        if index < self.defense.len() {
            return self.defense[index];
        }
        let tail = &self.defense[self.defense.len().saturating_sub(2)..];
        let profiles = tail.iter().copied().collect::<Option<Vec<_>>>()?;
        if profiles.is_empty() {
            return None;
        }
        let first_tail_level = (self.defense.len() - profiles.len()) as u32;
        Some(profile_at(&profiles, level - first_tail_level))
    }

    pub fn movement_speed_at(&self, level: u32) -> f64 {
        extrapolate_f64(&self.movement_speed, level)
    }

    pub fn cost_at(&self, level: u32) -> ResourceAmounts {
        ResourceKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let column = self
                    .costs
                    .iter()
                    .map(|entry| entry.get(&kind).copied().unwrap_or(0))
                    .collect::<Vec<_>>();
                let amount = extrapolate_with_cap(&column, level, 0);
                (amount > 0).then_some((kind, amount))
            })
            .collect()
    }

    pub fn morale_at(&self, level: u32) -> f64 {
        clamped_at_level(&self.morale_boost, level)
    }
}

fn profile_at(profiles: &[DamageProfile], level: u32) -> DamageProfile {
    let component = |pick: fn(&DamageProfile) -> i64| {
        let column = profiles.iter().map(pick).collect::<Vec<_>>();
        extrapolate_with_cap(&column, level, 0)
    };
    DamageProfile {
        melee: component(|profile| profile.melee),
        ranged: component(|profile| profile.ranged),
        magical: component(|profile| profile.magical),
    }
}

// ---------------------------------------------------------------------------
// Heroes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EquipmentSlots {
    #[serde(default)]
    pub slots: Vec<i64>,
    #[serde(default)]
    pub max: i64,
}

impl EquipmentSlots {
    pub fn slots_at(&self, level: u32) -> i64 {
        extrapolate_with_cap(&self.slots, level, self.max)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HeroSkill {
    pub name: String,
    #[serde(default)]
    pub damage: Vec<i64>,
    #[serde(default)]
    pub damage_max: i64,
    #[serde(default)]
    pub defense: Vec<i64>,
    #[serde(default)]
    pub defense_max: i64,
    #[serde(default)]
    pub healing: Vec<i64>,
    #[serde(default)]
    pub healing_max: i64,
}

impl HeroSkill {
    pub fn damage_at(&self, level: u32) -> i64 {
        extrapolate_with_cap(&self.damage, level, self.damage_max)
    }

    pub fn defense_at(&self, level: u32) -> i64 {
        extrapolate_with_cap(&self.defense, level, self.defense_max)
    }

    pub fn healing_at(&self, level: u32) -> i64 {
        extrapolate_with_cap(&self.healing, level, self.healing_max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffectKind {
    Stun,
    Mute,
    Confuse,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HeroStatusEffect {
    pub name: String,
    #[serde(rename = "type", default)]
    pub effect_type: String,
    #[serde(default)]
    pub effect: Vec<i64>,
    #[serde(default)]
    pub max: i64,
}

impl HeroStatusEffect {
    /// Unrecognised effect types behave as a stun.
    pub fn kind(&self) -> StatusEffectKind {
        match self.effect_type.as_str() {
            "mute" => StatusEffectKind::Mute,
            "confuse" => StatusEffectKind::Confuse,
            _ => StatusEffectKind::Stun,
        }
    }

    pub fn effect_at(&self, level: u32) -> i64 {
        extrapolate_with_cap(&self.effect, level, self.max)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HeroTemplate {
    pub name: String,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    #[serde(default)]
    pub morale_boost: Vec<f64>,
    #[serde(default)]
    pub equipment: BTreeMap<String, EquipmentSlots>,
    #[serde(default)]
    pub skills: BTreeMap<String, HeroSkill>,
    #[serde(default)]
    pub status_effects: BTreeMap<String, HeroStatusEffect>,
}

impl HeroTemplate {
    pub fn morale_at(&self, level: u32) -> f64 {
        clamped_at_level(&self.morale_boost, level)
    }

    pub fn equipment_slots_at(&self, level: u32) -> BTreeMap<String, i64> {
        self.equipment
            .iter()
            .map(|(slot, config)| (slot.clone(), config.slots_at(level)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Officials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct OfficialStatArrays {
    #[serde(default)]
    pub intelligence: Vec<i64>,
    #[serde(default)]
    pub intelligence_max: i64,
    #[serde(default)]
    pub charisma: Vec<i64>,
    #[serde(default)]
    pub charisma_max: i64,
    #[serde(default)]
    pub wisdom: Vec<i64>,
    #[serde(default)]
    pub wisdom_max: i64,
    #[serde(default)]
    pub diligence: Vec<i64>,
    #[serde(default)]
    pub diligence_max: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OfficialTemplate {
    pub name: String,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub portrait_id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stats: OfficialStatArrays,
    #[serde(default)]
    pub morale_boost: Vec<f64>,
}

impl OfficialTemplate {
    pub fn stats_at(&self, level: u32) -> OfficialStats {
        let stats = &self.stats;
        OfficialStats {
            intelligence: extrapolate_with_cap(&stats.intelligence, level, stats.intelligence_max),
            charisma: extrapolate_with_cap(&stats.charisma, level, stats.charisma_max),
            wisdom: extrapolate_with_cap(&stats.wisdom, level, stats.wisdom_max),
            diligence: extrapolate_with_cap(&stats.diligence, level, stats.diligence_max),
        }
    }

    pub fn eligible_for(&self, role: OfficialRole) -> bool {
        self.roles.iter().any(|candidate| candidate == role.as_str())
    }

    pub fn morale_at(&self, level: u32) -> f64 {
        clamped_at_level(&self.morale_boost, level)
    }
}
