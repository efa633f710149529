//! Storage-free fiefdom rules: config tables, placement geometry, ledger
//! arithmetic, elapsed-time catch-up math, and morale aggregation.

pub mod config;
pub mod economy;
pub mod lint;
pub mod morale;
pub mod placement;
pub mod production;
pub mod progression;
pub mod templates;

pub use config::{
    BuildingType, ConfigError, ConfigRegistry, MoraleEffectMode, ProductionDescriptor,
    WallGeneration,
};
pub use economy::{EconomyError, FiefdomLedger};
pub use morale::{aggregate_morale, morale_breakdown, MoraleBreakdown, PersonnelEntry, Roster};
pub use placement::{check_placement, PlacementCheck, PlacementRejection, PlacementRequest, Rect};
pub use production::{plan_catch_up, CatchUpPlan, FiefdomState};
pub use progression::CostTable;
