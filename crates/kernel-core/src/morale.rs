//! Fiefdom morale derived from structures and personnel.

use std::collections::BTreeMap;

use contracts::{BuildingSnapshot, WallSnapshot, MORALE_MAX, MORALE_MIN};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigRegistry, MoraleEffectMode};

/// A personnel instance reduced to what morale needs: its template and level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonnelEntry {
    pub template_id: String,
    pub level: u32,
}

impl PersonnelEntry {
    pub fn new(template_id: impl Into<String>, level: u32) -> Self {
        Self {
            template_id: template_id.into(),
            level,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub officials: Vec<PersonnelEntry>,
    pub heroes: Vec<PersonnelEntry>,
    pub combatants: Vec<PersonnelEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoraleBreakdown {
    pub buildings: f64,
    pub walls: f64,
    pub officials: f64,
    pub heroes: f64,
    pub combatants: f64,
    pub total: f64,
}

pub fn clamp_morale(value: f64) -> f64 {
    value.clamp(MORALE_MIN, MORALE_MAX)
}

pub fn building_morale(mode: MoraleEffectMode, boost: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    match mode {
        MoraleEffectMode::Add => boost * count as f64,
        MoraleEffectMode::Max => boost,
        MoraleEffectMode::Multiply => (0..count).fold(1.0, |product, _| product * boost),
    }
}

/// Per-source contributions and the clamped total. Every building row counts,
/// including ones still under construction; walls count from level 1.
/// Unknown templates add nothing.
pub fn morale_breakdown(
    config: &ConfigRegistry,
    buildings: &[BuildingSnapshot],
    walls: &[WallSnapshot],
    roster: &Roster,
) -> MoraleBreakdown {
    let mut counts = BTreeMap::<&str, usize>::new();
    for building in buildings {
        *counts.entry(building.building_type.as_str()).or_insert(0) += 1;
    }
    let building_total = counts
        .into_iter()
        .filter_map(|(key, count)| {
            let building_type = config.building(key).ok()?;
            Some(building_morale(
                building_type.morale_effect_mode,
                building_type.morale_boost,
                count,
            ))
        })
        .sum::<f64>();

    let wall_total = walls
        .iter()
        .filter(|wall| wall.level > 0)
        .filter_map(|wall| {
            config
                .wall_generation(wall.generation)
                .ok()
                .map(|generation| generation.morale_at(wall.level))
        })
        .sum::<f64>();

    let official_total = roster
        .officials
        .iter()
        .filter_map(|entry| {
            config
                .official(&entry.template_id)
                .ok()
                .map(|template| template.morale_at(entry.level))
        })
        .sum::<f64>();
    let hero_total = roster
        .heroes
        .iter()
        .filter_map(|entry| {
            config
                .hero(&entry.template_id)
                .ok()
                .map(|template| template.morale_at(entry.level))
        })
        .sum::<f64>();
    let combatant_total = roster
        .combatants
        .iter()
        .filter_map(|entry| {
            config
                .combatant(&entry.template_id)
                .ok()
                .map(|template| template.morale_at(entry.level))
        })
        .sum::<f64>();

    MoraleBreakdown {
        buildings: building_total,
        walls: wall_total,
        officials: official_total,
        heroes: hero_total,
        combatants: combatant_total,
        total: clamp_morale(
            building_total + wall_total + official_total + hero_total + combatant_total,
        ),
    }
}

pub fn aggregate_morale(
    config: &ConfigRegistry,
    buildings: &[BuildingSnapshot],
    walls: &[WallSnapshot],
    roster: &Roster,
) -> f64 {
    morale_breakdown(config, buildings, walls, roster).total
}
