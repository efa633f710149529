mod common;

use common::{Harness, HOUR};
use contracts::{ActionPayload, BuildingSnapshot, ResourceKind};
use kernel_core::Rect;
use proptest::prelude::*;
use proptest::sample::Index;

#[derive(Debug, Clone)]
enum Step {
    Build(&'static str, i64, i64),
    Demolish(Index),
    Move(Index, i64, i64),
    Wait(i64),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let coord = -12_i64..12;
    prop_oneof![
        3 => (prop_oneof![Just("farm"), Just("cottage")], coord.clone(), coord.clone())
            .prop_map(|(kind, x, y)| Step::Build(kind, x, y)),
        1 => any::<Index>().prop_map(Step::Demolish),
        1 => (any::<Index>(), coord.clone(), coord).prop_map(|(pick, x, y)| Step::Move(pick, x, y)),
        1 => (1_i64..48).prop_map(|hours| Step::Wait(hours * HOUR)),
    ]
}

fn footprint(building: &BuildingSnapshot) -> Rect {
    Rect::new(building.x, building.y, building.width, building.height)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn stock_stays_non_negative_and_footprints_stay_disjoint(
        steps in prop::collection::vec(step_strategy(), 1..20),
    ) {
        let mut harness = Harness::settled(&[(ResourceKind::Gold, 600), (ResourceKind::Wood, 60)]);
        let fiefdom_id = harness.fiefdom_id;

        for step in steps {
            let buildings = harness.snapshot().buildings;
            let pick = |index: &Index| {
                (!buildings.is_empty()).then(|| buildings[index.index(buildings.len())].id)
            };
            match step {
                Step::Build(kind, x, y) => {
                    harness.act("build", ActionPayload::build(fiefdom_id, kind, x, y));
                }
                Step::Demolish(index) => {
                    if let Some(id) = pick(&index) {
                        harness.act("demolish", ActionPayload::demolish(id));
                    }
                }
                Step::Move(index, x, y) => {
                    if let Some(id) = pick(&index) {
                        harness.act("move", ActionPayload::relocate(id, x, y));
                    }
                }
                Step::Wait(seconds) => {
                    harness.clock.advance(seconds);
                }
            }

            let snapshot = harness.snapshot();
            for (kind, amount) in &snapshot.resources {
                prop_assert!(*amount >= 0, "{kind} went negative: {amount}");
            }
            prop_assert!(snapshot.home_base().is_some());
            for (index, a) in snapshot.buildings.iter().enumerate() {
                for b in &snapshot.buildings[index + 1..] {
                    prop_assert!(
                        !footprint(a).overlaps(&footprint(b)),
                        "{} and {} overlap",
                        a.id,
                        b.id
                    );
                }
            }
        }
    }
}
