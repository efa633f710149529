//! Grid placement and collision over axis-aligned building and wall rectangles.
//!
//! Coordinates are integer grid cells with the footprint origin at the
//! bottom-left corner. Walls are centered on the fiefdom's local origin.

use contracts::{BuildingSnapshot, HOME_BASE_TYPE, PLACEMENT_BOUND};

use crate::config::{ConfigRegistry, WallGeneration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

pub fn within_bounds(x: i64, y: i64) -> bool {
    (-PLACEMENT_BOUND..=PLACEMENT_BOUND).contains(&x)
        && (-PLACEMENT_BOUND..=PLACEMENT_BOUND).contains(&y)
}

/// Footprint of an existing building as the engine sees it.
pub fn footprint(config: &ConfigRegistry, building: &BuildingSnapshot) -> Rect {
    let (width, height) = config.building_dimensions(&building.building_type);
    Rect::new(building.x, building.y, width, height)
}

// ---------------------------------------------------------------------------
// Building placement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementRejection {
    OutOfBounds,
    HomeBaseOrigin,
    UnknownType,
    Overlap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementCheck {
    pub valid: bool,
    pub overlapping_ids: Vec<i64>,
    pub message: String,
    pub rejection: Option<PlacementRejection>,
}

impl PlacementCheck {
    fn accepted() -> Self {
        Self {
            valid: true,
            overlapping_ids: Vec::new(),
            message: String::new(),
            rejection: None,
        }
    }

    fn rejected(rejection: PlacementRejection, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            overlapping_ids: Vec::new(),
            message: message.into(),
            rejection: Some(rejection),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRequest<'a> {
    pub building_type: &'a str,
    pub x: i64,
    pub y: i64,
    pub enforce_home_base_origin: bool,
    pub exclude_building_id: Option<i64>,
}

impl<'a> PlacementRequest<'a> {
    pub fn new(building_type: &'a str, x: i64, y: i64) -> Self {
        Self {
            building_type,
            x,
            y,
            enforce_home_base_origin: false,
            exclude_building_id: None,
        }
    }

    pub fn enforcing_home_base_origin(mut self) -> Self {
        self.enforce_home_base_origin = true;
        self
    }

    pub fn excluding(mut self, building_id: i64) -> Self {
        self.exclude_building_id = Some(building_id);
        self
    }
}

/// Decides whether `request` may occupy its cells given the fiefdom's other
/// buildings. Buildings still under construction occupy their footprint.
pub fn check_placement(
    config: &ConfigRegistry,
    existing: &[BuildingSnapshot],
    request: &PlacementRequest<'_>,
) -> PlacementCheck {
    if !within_bounds(request.x, request.y) {
        return PlacementCheck::rejected(
            PlacementRejection::OutOfBounds,
            "Position is outside the valid range",
        );
    }

    if request.enforce_home_base_origin
        && request.building_type == HOME_BASE_TYPE
        && (request.x, request.y) != (0, 0)
    {
        return PlacementCheck::rejected(
            PlacementRejection::HomeBaseOrigin,
            "Manor House (home_base) must be built at location (0, 0)",
        );
    }

    let Ok(building_type) = config.building(request.building_type) else {
        return PlacementCheck::rejected(
            PlacementRejection::UnknownType,
            format!("Unknown building type: {}", request.building_type),
        );
    };

    let (width, height) = building_type.dimensions();
    let candidate = Rect::new(request.x, request.y, width, height);
    let overlapping_ids = existing
        .iter()
        .filter(|building| Some(building.id) != request.exclude_building_id)
        .filter(|building| footprint(config, building).overlaps(&candidate))
        .map(|building| building.id)
        .collect::<Vec<_>>();

    if overlapping_ids.is_empty() {
        return PlacementCheck::accepted();
    }
    PlacementCheck {
        overlapping_ids,
        ..PlacementCheck::rejected(
            PlacementRejection::Overlap,
            "Location overlaps with existing buildings",
        )
    }
}

// ---------------------------------------------------------------------------
// Wall perimeter
// ---------------------------------------------------------------------------

/// North, south, east and west strips of a wall generation, in that order.
/// Each strip lies just inside the generation's outer boundary.
pub fn wall_segments(wall: &WallGeneration) -> [Rect; 4] {
    let half_width = wall.width / 2;
    let half_length = wall.length / 2;
    let thickness = wall.thickness;
    [
        Rect::new(-half_width, half_length - thickness, wall.width, thickness),
        Rect::new(-half_width, -half_length, wall.width, thickness),
        Rect::new(half_width - thickness, -half_length, thickness, wall.length),
        Rect::new(-half_width, -half_length, thickness, wall.length),
    ]
}

pub fn overlaps_wall(wall: &WallGeneration, footprint: &Rect) -> bool {
    wall_segments(wall)
        .iter()
        .any(|segment| segment.overlaps(footprint))
}

/// Completed buildings whose footprint intersects the wall's perimeter.
/// The home base is never swept, even when the perimeter crosses it.
pub fn buildings_under_wall<'a>(
    config: &ConfigRegistry,
    wall: &WallGeneration,
    buildings: &'a [BuildingSnapshot],
) -> Vec<&'a BuildingSnapshot> {
    buildings
        .iter()
        .filter(|building| building.is_complete() && building.building_type != HOME_BASE_TYPE)
        .filter(|building| overlaps_wall(wall, &footprint(config, building)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::empty()
            .with_building_types(&json!({
                "home_base": {"width": 4, "height": 4},
                "cottage": {"width": 2, "height": 2},
                "well": {}
            }))
            .and_then(|registry| {
                registry.with_walls(&json!({
                    "walls": {"1": {"width": 20, "length": 20, "thickness": 2, "hp": [100]}}
                }))
            })
            .expect("registry")
    }

    fn building(id: i64, building_type: &str, x: i64, y: i64, level: u32) -> BuildingSnapshot {
        BuildingSnapshot {
            id,
            fiefdom_id: 1,
            building_type: building_type.to_string(),
            level,
            x,
            y,
            width: 0,
            height: 0,
            construction_start_ts: 0,
            action_start_ts: 0,
            action_tag: None,
        }
    }

    #[test]
    fn overlapping_two_by_two_is_rejected_adjacent_is_not() {
        let config = registry();
        let existing = vec![building(1, "cottage", 0, 0, 1)];

        let clash = check_placement(&config, &existing, &PlacementRequest::new("cottage", 1, 1));
        assert!(!clash.valid);
        assert_eq!(clash.rejection, Some(PlacementRejection::Overlap));
        assert_eq!(clash.overlapping_ids, vec![1]);
        assert_eq!(clash.message, "Location overlaps with existing buildings");

        let beside = check_placement(&config, &existing, &PlacementRequest::new("cottage", 2, 0));
        assert!(beside.valid, "{}", beside.message);
    }

    #[test]
    fn bounds_are_checked_before_anything_else() {
        let config = registry();
        let check = check_placement(&config, &[], &PlacementRequest::new("nonsense", 1001, 0));
        assert_eq!(check.rejection, Some(PlacementRejection::OutOfBounds));

        let edge = check_placement(&config, &[], &PlacementRequest::new("well", -1000, 1000));
        assert!(edge.valid);
    }

    #[test]
    fn home_base_origin_only_when_enforced() {
        let config = registry();
        let enforced = PlacementRequest::new(HOME_BASE_TYPE, 1, 0).enforcing_home_base_origin();
        let check = check_placement(&config, &[], &enforced);
        assert_eq!(check.rejection, Some(PlacementRejection::HomeBaseOrigin));
        assert_eq!(
            check.message,
            "Manor House (home_base) must be built at location (0, 0)"
        );

        let relaxed = check_placement(&config, &[], &PlacementRequest::new(HOME_BASE_TYPE, 1, 0));
        assert!(relaxed.valid);
    }

    #[test]
    fn unknown_type_is_reported_with_its_name() {
        let check = check_placement(&registry(), &[], &PlacementRequest::new("castle", 0, 0));
        assert_eq!(check.rejection, Some(PlacementRejection::UnknownType));
        assert_eq!(check.message, "Unknown building type: castle");
    }

    #[test]
    fn excluded_building_does_not_block_its_own_move() {
        let config = registry();
        let existing = vec![building(7, "cottage", 5, 5, 1)];
        let request = PlacementRequest::new("cottage", 6, 5).excluding(7);
        assert!(check_placement(&config, &existing, &request).valid);
    }

    #[test]
    fn unresolvable_existing_building_occupies_one_cell() {
        let config = registry();
        let existing = vec![building(3, "retired_type", 10, 10, 1)];
        let near = check_placement(&config, &existing, &PlacementRequest::new("cottage", 11, 11));
        assert!(near.valid);
        let on_top = check_placement(&config, &existing, &PlacementRequest::new("cottage", 9, 9));
        assert!(!on_top.valid);
    }

    #[test]
    fn wall_strips_hug_the_outer_boundary() {
        let config = registry();
        let wall = config.wall_generation(1).expect("wall");
        let [north, south, east, west] = wall_segments(wall);
        assert_eq!(north, Rect::new(-10, 8, 20, 2));
        assert_eq!(south, Rect::new(-10, -10, 20, 2));
        assert_eq!(east, Rect::new(8, -10, 2, 20));
        assert_eq!(west, Rect::new(-10, -10, 2, 20));

        assert!(!overlaps_wall(wall, &Rect::new(-2, -2, 4, 4)));
        assert!(overlaps_wall(wall, &Rect::new(7, 0, 2, 2)));
        assert!(!overlaps_wall(wall, &Rect::new(10, 0, 2, 2)));
    }

    #[test]
    fn only_completed_buildings_are_swept_by_a_new_wall() {
        let config = registry();
        let wall = config.wall_generation(1).expect("wall");
        let buildings = vec![
            building(1, HOME_BASE_TYPE, 7, 4, 1),
            building(2, "cottage", 8, 0, 1),
            building(3, "cottage", -10, 0, 0),
        ];
        let swept = buildings_under_wall(&config, wall, &buildings)
            .into_iter()
            .map(|building| building.id)
            .collect::<Vec<_>>();
        assert_eq!(swept, vec![2]);
    }

    #[test]
    fn home_base_under_the_perimeter_survives_the_sweep() {
        let config = registry();
        let wall = config.wall_generation(1).expect("wall");
        let buildings = vec![
            building(1, HOME_BASE_TYPE, -11, -2, 1),
            building(2, "cottage", -10, 5, 1),
        ];
        assert!(overlaps_wall(wall, &footprint(&config, &buildings[0])));

        let swept = buildings_under_wall(&config, wall, &buildings)
            .into_iter()
            .map(|building| building.id)
            .collect::<Vec<_>>();
        assert_eq!(swept, vec![2]);
    }

    #[test]
    fn outside_wall_flag_does_not_restrict_placement() {
        let config = registry();
        assert!(!config.building("cottage").expect("cottage").can_build_outside_wall);
        let far_out = check_placement(&config, &[], &PlacementRequest::new("cottage", 500, 500));
        assert!(far_out.valid, "{}", far_out.message);
    }
}
