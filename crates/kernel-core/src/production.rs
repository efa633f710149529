//! Elapsed-time effects for one fiefdom: construction completion, wall
//! reinforcement, resource production, and the resulting morale shift.
//!
//! Planning is pure. The store applies a [`CatchUpPlan`] inside the
//! fiefdom's own transaction.

use contracts::{
    BuildingSnapshot, CompletionEvent, MoraleChange, ProductionUpdate, ResourceAmounts,
    ResourceKind, StructureKind, WallSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ConfigRegistry, ProductionDescriptor};
use crate::morale::{aggregate_morale, Roster};
use crate::progression::construction_seconds;

pub const SECONDS_PER_HOUR: f64 = 3600.0;
/// Catch-up windows shorter than this are skipped entirely.
pub const MIN_CATCH_UP_HOURS: f64 = 0.001;

pub fn hours_between(from_ts: i64, to_ts: i64) -> f64 {
    (to_ts - from_ts) as f64 / SECONDS_PER_HOUR
}

/// Full cycles elapsed and the closed-form amount produced over `hours`.
///
/// Only the amount multiplier compounds; periodicity is held constant across
/// the window.
pub fn production_total(descriptor: &ProductionDescriptor, hours: f64) -> (u64, f64) {
    if descriptor.periodicity <= 0.0 || hours <= 0.0 {
        return (0, 0.0);
    }
    let cycles = (hours / descriptor.periodicity).floor() as u64;
    if cycles == 0 {
        return (0, 0.0);
    }
    let multiplier = descriptor.amount_multiplier;
    let total = if multiplier == 1.0 {
        descriptor.amount * cycles as f64
    } else {
        let exponent = i32::try_from(cycles).unwrap_or(i32::MAX);
        descriptor.amount * (multiplier.powi(exponent) - 1.0) / (multiplier - 1.0)
    };
    (cycles, total)
}

/// Everything catch-up needs to know about one fiefdom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiefdomState {
    pub fiefdom_id: i64,
    pub resources: ResourceAmounts,
    pub morale: f64,
    pub last_update_time: i64,
    pub buildings: Vec<BuildingSnapshot>,
    pub walls: Vec<WallSnapshot>,
    pub roster: Roster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingCompletion {
    pub building_id: i64,
    pub new_level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallCompletion {
    pub wall_id: i64,
    pub new_level: u32,
    pub hp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatchUpPlan {
    pub fiefdom_id: i64,
    pub now: i64,
    pub building_completions: Vec<BuildingCompletion>,
    pub wall_completions: Vec<WallCompletion>,
    pub completions: Vec<CompletionEvent>,
    pub productions: Vec<ProductionUpdate>,
    /// Floored totals per resource, accumulated across buildings.
    pub resource_deltas: ResourceAmounts,
    pub morale: Option<MoraleChange>,
}

impl CatchUpPlan {
    pub fn is_empty(&self) -> bool {
        self.building_completions.is_empty()
            && self.wall_completions.is_empty()
            && self.resource_deltas.is_empty()
            && self.morale.is_none()
    }
}

fn construction_done(times: &[f64], level: u32, started_at: i64, now: i64) -> bool {
    let required = construction_seconds(times, level);
    (now - started_at) as f64 >= required
}

/// Plans the effects of `hours` elapsed up to `now`.
///
/// Each structure advances at most one level per call: the single stored
/// start timestamp is tested against the current level's threshold only.
pub fn plan_catch_up(
    config: &ConfigRegistry,
    state: &FiefdomState,
    now: i64,
    hours: f64,
) -> CatchUpPlan {
    let mut plan = CatchUpPlan {
        fiefdom_id: state.fiefdom_id,
        now,
        ..CatchUpPlan::default()
    };
    let mut buildings = state.buildings.clone();
    let mut walls = state.walls.clone();

    for building in buildings
        .iter_mut()
        .filter(|building| building.is_under_construction())
    {
        let Ok(building_type) = config.building(&building.building_type) else {
            warn!(
                fiefdom_id = state.fiefdom_id,
                building_id = building.id,
                building_type = %building.building_type,
                "skipping construction of unconfigured building"
            );
            continue;
        };
        if !construction_done(
            &building_type.construction_times,
            building.level,
            building.construction_start_ts,
            now,
        ) {
            continue;
        }
        building.level += 1;
        building.construction_start_ts = 0;
        plan.building_completions.push(BuildingCompletion {
            building_id: building.id,
            new_level: building.level,
        });
        plan.completions.push(CompletionEvent {
            fiefdom_id: state.fiefdom_id,
            source_type: StructureKind::Building,
            source_id: building.id,
            name: building.building_type.clone(),
            new_level: building.level,
        });
    }

    for wall in walls.iter_mut().filter(|wall| wall.construction_start_ts > 0) {
        let Ok(generation) = config.wall_generation(wall.generation) else {
            warn!(
                fiefdom_id = state.fiefdom_id,
                wall_id = wall.id,
                generation = wall.generation,
                "skipping construction of unconfigured wall generation"
            );
            continue;
        };
        if !construction_done(
            &generation.construction_times,
            wall.level,
            wall.construction_start_ts,
            now,
        ) {
            continue;
        }
        // Completion adds a level on top of the one the upgrade granted,
        // never past the last configured hp entry.
        let new_level = (wall.level + 1).min(generation.max_level().max(wall.level));
        wall.level = new_level;
        wall.hp = generation.hp_at(new_level);
        wall.construction_start_ts = 0;
        plan.wall_completions.push(WallCompletion {
            wall_id: wall.id,
            new_level,
            hp: wall.hp,
        });
        plan.completions.push(CompletionEvent {
            fiefdom_id: state.fiefdom_id,
            source_type: StructureKind::Wall,
            source_id: wall.id,
            name: format!("wall_gen_{}", wall.generation),
            new_level,
        });
    }

    for building in buildings.iter().filter(|building| building.is_complete()) {
        let Ok(building_type) = config.building(&building.building_type) else {
            continue;
        };
        for (kind, descriptor) in &building_type.production {
            let (cycles, amount) = production_total(descriptor, hours);
            if cycles == 0 {
                continue;
            }
            *plan.resource_deltas.entry(*kind).or_insert(0) += amount.floor() as i64;
            plan.productions.push(ProductionUpdate {
                fiefdom_id: state.fiefdom_id,
                building_id: building.id,
                building_type: building.building_type.clone(),
                resource: *kind,
                cycles,
                amount,
            });
        }
    }
    plan.resource_deltas.retain(|_, delta| *delta != 0);

    let morale = aggregate_morale(config, &buildings, &walls, &state.roster);
    if morale != state.morale {
        plan.morale = Some(MoraleChange {
            fiefdom_id: state.fiefdom_id,
            from: state.morale,
            to: morale,
        });
    }

    plan
}

/// Resource counters after applying a plan's deltas, never below zero.
pub fn apply_deltas(resources: &ResourceAmounts, deltas: &ResourceAmounts) -> ResourceAmounts {
    let mut next = resources.clone();
    for (kind, delta) in deltas {
        let entry = next.entry(*kind).or_insert(0);
        *entry = (*entry + delta).max(0);
    }
    next
}

pub fn resource_or_zero(resources: &ResourceAmounts, kind: ResourceKind) -> i64 {
    resources.get(&kind).copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morale::PersonnelEntry;
    use serde_json::json;

    const HOUR: i64 = 3600;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::empty()
            .with_building_types(&json!({
                "home_base": {"width": 4, "height": 4, "morale_boost": 1.0},
                "farm": {
                    "width": 2, "height": 2, "max_level": 3,
                    "construction_times": [600, 1200],
                    "grain": {"amount": 10, "amount_multiplier": 1.2, "periodicity": 60},
                    "gold": {"amount": 2.5, "periodicity": 1}
                },
                "shed": {"construction_times": []}
            }))
            .and_then(|registry| {
                registry.with_walls(&json!({"walls": {"1": {
                    "width": 40, "length": 40, "thickness": 2,
                    "hp": [100, 180, 260], "construction_times": [60, 300],
                    "morale_boost": [2.0, 4.0]
                }}}))
            })
            .and_then(|registry| {
                registry.with_officials(&json!({"tom": {"name": "Tom", "morale_boost": [1.0]}}))
            })
            .expect("registry")
    }

    fn building(id: i64, building_type: &str, level: u32, started: i64) -> BuildingSnapshot {
        BuildingSnapshot {
            id,
            fiefdom_id: 1,
            building_type: building_type.to_string(),
            level,
            x: id * 5,
            y: 0,
            width: 1,
            height: 1,
            construction_start_ts: started,
            action_start_ts: 0,
            action_tag: None,
        }
    }

    fn wall(level: u32, started: i64) -> WallSnapshot {
        WallSnapshot {
            id: 50,
            fiefdom_id: 1,
            generation: 1,
            level,
            hp: 100,
            width: 40,
            length: 40,
            thickness: 2,
            construction_start_ts: started,
        }
    }

    fn state(buildings: Vec<BuildingSnapshot>, walls: Vec<WallSnapshot>) -> FiefdomState {
        FiefdomState {
            fiefdom_id: 1,
            resources: ResourceAmounts::new(),
            morale: 0.0,
            last_update_time: 0,
            buildings,
            walls,
            roster: Roster::default(),
        }
    }

    #[test]
    fn geometric_series_matches_closed_form() {
        let descriptor = ProductionDescriptor {
            amount: 10.0,
            amount_multiplier: 1.2,
            periodicity: 60.0,
            periodicity_multiplier: 1.0,
        };
        let (cycles, total) = production_total(&descriptor, 120.0);
        assert_eq!(cycles, 2);
        assert!((total - 22.0).abs() < 1e-9);
        assert_eq!(production_total(&descriptor, 59.9), (0, 0.0));
    }

    #[test]
    fn linear_production_and_bad_periodicity() {
        let linear = ProductionDescriptor {
            amount: 3.0,
            amount_multiplier: 1.0,
            periodicity: 2.0,
            periodicity_multiplier: 1.0,
        };
        assert_eq!(production_total(&linear, 7.0), (3, 9.0));
        let broken = ProductionDescriptor {
            periodicity: 0.0,
            ..linear
        };
        assert_eq!(production_total(&broken, 100.0), (0, 0.0));
    }

    #[test]
    fn construction_completes_one_level_per_call() {
        let config = registry();
        let now = 10 * HOUR;
        let fiefdom = state(
            vec![
                building(1, "farm", 0, now - 600),
                building(2, "farm", 1, now - 1199),
                building(3, "shed", 0, now),
                building(4, "farm", 0, now - 100_000),
            ],
            Vec::new(),
        );

        let plan = plan_catch_up(&config, &fiefdom, now, 0.5);
        assert_eq!(
            plan.building_completions,
            vec![
                BuildingCompletion { building_id: 1, new_level: 1 },
                BuildingCompletion { building_id: 3, new_level: 1 },
                BuildingCompletion { building_id: 4, new_level: 1 },
            ]
        );
        assert_eq!(plan.completions[0].name, "farm");
        assert_eq!(plan.completions[0].source_type, StructureKind::Building);
    }

    #[test]
    fn production_accumulates_across_buildings_and_floors() {
        let config = registry();
        let now = 200 * HOUR;
        let fiefdom = state(
            vec![
                building(1, "farm", 1, 0),
                building(2, "farm", 2, 0),
                building(3, "farm", 0, now),
            ],
            Vec::new(),
        );

        let plan = plan_catch_up(&config, &fiefdom, now, 120.0);
        assert_eq!(plan.resource_deltas.get(&ResourceKind::Grain), Some(&44));
        assert_eq!(plan.resource_deltas.get(&ResourceKind::Gold), Some(&600));
        assert_eq!(plan.productions.len(), 4);
        assert!(plan
            .productions
            .iter()
            .all(|update| update.building_id != 3));
    }

    #[test]
    fn wall_completion_raises_the_level_and_its_hp() {
        let config = registry();
        let now = HOUR;

        // Level 2 needs the extrapolated third time: 300 + (300 - 60) = 540s.
        let mut damaged = wall(2, now - 540);
        damaged.hp = 12;
        let plan = plan_catch_up(&config, &state(Vec::new(), vec![damaged]), now, 1.0);
        assert_eq!(
            plan.wall_completions,
            vec![WallCompletion { wall_id: 50, new_level: 3, hp: 260 }]
        );
        assert_eq!(plan.completions[0].name, "wall_gen_1");
        assert_eq!(plan.completions[0].new_level, 3);

        let waiting = plan_catch_up(&config, &state(Vec::new(), vec![wall(2, now - 539)]), now, 1.0);
        assert!(waiting.wall_completions.is_empty());
    }

    #[test]
    fn wall_completion_at_the_last_level_only_clears_the_timer() {
        let config = registry();
        let now = HOUR;

        let mut topped = wall(3, now - 780);
        topped.hp = 40;
        let plan = plan_catch_up(&config, &state(Vec::new(), vec![topped]), now, 1.0);
        assert_eq!(
            plan.wall_completions,
            vec![WallCompletion { wall_id: 50, new_level: 3, hp: 260 }]
        );
    }

    #[test]
    fn morale_change_is_reported_only_when_it_moves() {
        let config = registry();
        let now = HOUR;
        let mut fiefdom = state(vec![building(1, "home_base", 0, now - 5)], Vec::new());
        fiefdom.roster.officials.push(PersonnelEntry::new("tom", 1));

        let plan = plan_catch_up(&config, &fiefdom, now, 1.0);
        let change = plan.morale.expect("morale moved");
        assert_eq!(change.from, 0.0);
        assert_eq!(change.to, 2.0);

        fiefdom.buildings[0].level = 1;
        fiefdom.buildings[0].construction_start_ts = 0;
        fiefdom.morale = 2.0;
        let steady = plan_catch_up(&config, &fiefdom, now, 1.0);
        assert!(steady.morale.is_none());
        assert!(steady.is_empty());
    }

    #[test]
    fn deltas_never_drive_counters_negative() {
        let resources = ResourceAmounts::from([(ResourceKind::Grain, 5)]);
        let deltas = ResourceAmounts::from([(ResourceKind::Grain, -9), (ResourceKind::Mana, 4)]);
        let next = apply_deltas(&resources, &deltas);
        assert_eq!(next.get(&ResourceKind::Grain), Some(&0));
        assert_eq!(next.get(&ResourceKind::Mana), Some(&4));
    }
}
