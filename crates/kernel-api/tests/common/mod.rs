#![allow(dead_code)]

use std::sync::Arc;

use contracts::{ActionContext, ActionPayload, ActionResult, FiefdomSnapshot, ResourceAmounts, ResourceKind};
use kernel_api::{FiefdomEngine, ManualClock};
use kernel_core::ConfigRegistry;
use serde_json::json;

pub const T0: i64 = 1_700_000_000;
pub const HOUR: i64 = 3_600;
pub const OWNER: i64 = 7;
pub const RIVAL: i64 = 8;

pub fn registry() -> ConfigRegistry {
    ConfigRegistry::empty()
        .with_building_types(&json!({
            "home_base": {
                "width": 4, "height": 4, "max_level": 3,
                "gold_cost": [0, 50, 100],
                "construction_times": [10, 20, 30],
                "morale_boost": 5.0
            },
            "farm": {
                "width": 2, "height": 2, "max_level": 5,
                "gold_cost": [100, 200, 300],
                "wood_cost": [10, 20, 30],
                "construction_times": [60],
                "grain": {"amount": 10, "amount_multiplier": 1.2, "periodicity": 60}
            },
            "cottage": {"gold_cost": [30], "construction_times": [5]}
        }))
        .and_then(|registry| {
            registry.with_walls(&json!({"walls": {
                "1": {
                    "width": 40, "length": 40, "thickness": 2,
                    "hp": [100, 150, 200], "gold_cost": [50, 80, 120],
                    "construction_times": [60, 120, 180], "morale_boost": [1.0, 2.0, 3.0]
                },
                "2": {"width": 60, "length": 60, "thickness": 2, "hp": [200], "stone_cost": [10]}
            }}))
        })
        .and_then(|registry| {
            registry.with_officials(&json!({
                "tom": {
                    "name": "Tom Reed", "roles": ["steward", "reeve"], "portrait_id": 12,
                    "stats": {"wisdom": [3, 5], "wisdom_max": 8},
                    "morale_boost": [1.0, 2.0]
                }
            }))
        })
        .and_then(|registry| {
            registry.with_heroes(&json!({
                "ada": {
                    "name": "Ada the Bold",
                    "equipment": {"ring": {"slots": [1, 2], "max": 3}},
                    "skills": {"cleave": {"name": "Cleave", "damage": [10, 15]}}
                }
            }))
        })
        .and_then(|registry| {
            registry.with_combatants(&json!({
                "pike": {"name": "Pikeman", "damage": [{"melee": 4}], "movement_speed": [1.5]}
            }))
        })
        .expect("test registry")
}

pub struct Harness {
    pub engine: FiefdomEngine,
    pub clock: Arc<ManualClock>,
    pub fiefdom_id: i64,
}

impl Harness {
    /// A fresh fiefdom owned by [`OWNER`] at `T0`.
    pub fn new(resources: &[(ResourceKind, i64)]) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let mut engine =
            FiefdomEngine::in_memory(Arc::new(registry()), clock.clone()).expect("engine");
        let fiefdom_id = engine
            .found_fiefdom(OWNER, "Ravenest", 12, -3, resources.iter().copied().collect())
            .expect("found fiefdom");
        Self {
            engine,
            clock,
            fiefdom_id,
        }
    }

    /// Same as [`Harness::new`] with a completed home base at the origin.
    pub fn settled(resources: &[(ResourceKind, i64)]) -> Self {
        let mut harness = Self::new(resources);
        let result = harness.act("build", ActionPayload::build(harness.fiefdom_id, "home_base", 0, 0));
        assert!(result.is_ok(), "{result}");
        harness.clock.advance(60);
        harness.snapshot();
        harness
    }

    pub fn owner(&self) -> ActionContext {
        ActionContext::new(OWNER)
    }

    pub fn act(&mut self, kind: &str, payload: ActionPayload) -> ActionResult {
        let ctx = self.owner();
        self.engine.submit_action(kind, &ctx, &payload)
    }

    pub fn act_as(&mut self, character_id: i64, kind: &str, payload: ActionPayload) -> ActionResult {
        self.engine
            .submit_action(kind, &ActionContext::new(character_id), &payload)
    }

    pub fn snapshot(&mut self) -> FiefdomSnapshot {
        self.engine.get_fiefdom(self.fiefdom_id).expect("fiefdom")
    }

    pub fn resource(&mut self, kind: ResourceKind) -> i64 {
        self.snapshot().resource(kind)
    }

    /// Builds a structure and lets enough time pass for it to complete.
    pub fn build_completed(&mut self, building_type: &str, x: i64, y: i64) -> i64 {
        let result = self.act("build", ActionPayload::build(self.fiefdom_id, building_type, x, y));
        assert!(result.is_ok(), "{result}");
        self.clock.advance(HOUR);
        self.snapshot();
        result_id(&result, "building_id")
    }
}

pub fn result_id(result: &ActionResult, key: &str) -> i64 {
    result
        .result
        .get(key)
        .and_then(|value| value.as_i64())
        .unwrap_or_else(|| panic!("{key} missing from {result}"))
}

pub fn amounts(pairs: &[(ResourceKind, i64)]) -> ResourceAmounts {
    pairs.iter().copied().collect()
}
