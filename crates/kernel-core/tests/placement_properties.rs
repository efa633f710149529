use contracts::{BuildingSnapshot, HOME_BASE_TYPE, PLACEMENT_BOUND};
use kernel_core::placement::{overlaps_wall, wall_segments};
use kernel_core::{check_placement, ConfigRegistry, PlacementRejection, PlacementRequest, Rect};
use proptest::prelude::*;
use serde_json::json;

fn registry() -> ConfigRegistry {
    ConfigRegistry::empty()
        .with_building_types(&json!({
            "home_base": {"width": 4, "height": 4},
            "farm": {"width": 2, "height": 3},
            "well": {}
        }))
        .and_then(|registry| {
            registry.with_walls(&json!({"walls": {
                "1": {"width": 30, "length": 24, "thickness": 3, "hp": [10]}
            }}))
        })
        .expect("registry")
}

fn existing(id: i64, building_type: &str, x: i64, y: i64) -> BuildingSnapshot {
    BuildingSnapshot {
        id,
        fiefdom_id: 1,
        building_type: building_type.to_string(),
        level: 1,
        x,
        y,
        width: 1,
        height: 1,
        construction_start_ts: 0,
        action_start_ts: 0,
        action_tag: None,
    }
}

fn rect_strategy() -> impl Strategy<Value = Rect> {
    (-40_i64..40, -40_i64..40, 1_i64..8, 1_i64..8)
        .prop_map(|(x, y, width, height)| Rect::new(x, y, width, height))
}

proptest! {
    #[test]
    fn overlap_is_symmetric(a in rect_strategy(), b in rect_strategy()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
    }

    #[test]
    fn rectangle_always_overlaps_itself(a in rect_strategy()) {
        prop_assert!(a.overlaps(&a));
    }

    #[test]
    fn out_of_bounds_wins_over_everything(
        x in (PLACEMENT_BOUND + 1)..(PLACEMENT_BOUND * 3),
        y in -PLACEMENT_BOUND..=PLACEMENT_BOUND,
        negate in any::<bool>(),
    ) {
        let config = registry();
        let x = if negate { -x } else { x };
        let check = check_placement(&config, &[], &PlacementRequest::new("no_such_type", x, y));
        prop_assert!(!check.valid);
        prop_assert_eq!(check.rejection, Some(PlacementRejection::OutOfBounds));
    }

    #[test]
    fn placement_matches_pairwise_overlap(
        x in -20_i64..20,
        y in -20_i64..20,
        others in prop::collection::vec((-20_i64..20, -20_i64..20), 0..6),
    ) {
        let config = registry();
        let buildings = others
            .iter()
            .enumerate()
            .map(|(index, (ox, oy))| existing(index as i64 + 1, "farm", *ox, *oy))
            .collect::<Vec<_>>();
        let candidate = Rect::new(x, y, 2, 3);
        let expected = buildings
            .iter()
            .filter(|building| Rect::new(building.x, building.y, 2, 3).overlaps(&candidate))
            .map(|building| building.id)
            .collect::<Vec<_>>();

        let check = check_placement(&config, &buildings, &PlacementRequest::new("farm", x, y));
        prop_assert_eq!(check.valid, expected.is_empty());
        prop_assert_eq!(check.overlapping_ids, expected);
    }

    #[test]
    fn excluded_building_never_blocks_itself(x in -20_i64..20, y in -20_i64..20, dx in -1_i64..=1) {
        let config = registry();
        let buildings = vec![existing(5, "farm", x, y)];
        let request = PlacementRequest::new("farm", x + dx, y).excluding(5);
        prop_assert!(check_placement(&config, &buildings, &request).valid);
    }

    #[test]
    fn home_base_only_fits_the_origin(x in -5_i64..5, y in -5_i64..5) {
        let config = registry();
        let request = PlacementRequest::new(HOME_BASE_TYPE, x, y).enforcing_home_base_origin();
        let check = check_placement(&config, &[], &request);
        prop_assert_eq!(check.valid, (x, y) == (0, 0));
    }

    #[test]
    fn wall_overlap_matches_its_segments(rect in rect_strategy()) {
        let config = registry();
        let wall = config.wall_generation(1).expect("wall");
        let by_segment = wall_segments(wall).iter().any(|segment| segment.overlaps(&rect));
        prop_assert_eq!(overlaps_wall(wall, &rect), by_segment);
    }

    #[test]
    fn footprints_strictly_inside_the_wall_are_safe(x in -11_i64..11, y in -8_i64..8) {
        // Interior of a 30x24 wall with thickness 3 spans x in [-12, 12) and y in [-9, 9).
        let config = registry();
        let wall = config.wall_generation(1).expect("wall");
        let footprint = Rect::new(x, y, 1, 1);
        prop_assert!(!overlaps_wall(wall, &footprint));
    }
}
