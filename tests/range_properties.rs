//! Property tests for range overlap detection and memory layout

mod common;

use common::builders::{ranges, ApplicationBuilder};
use proptest::prelude::*;
use rtapp_builder::builder::database::Direction;
use rtapp_builder::signal::ranges_intersect;
use rtapp_builder::{Range, Value};

/// Split `0..total` at sorted cut points into alternating owners
fn partition(total: u32, cuts: &[u32]) -> (Vec<Range>, Vec<Range>) {
    let mut bounds: Vec<u32> = cuts.iter().map(|c| c % total).filter(|&c| c > 0).collect();
    bounds.sort_unstable();
    bounds.dedup();
    bounds.insert(0, 0);
    bounds.push(total);

    let (mut first, mut second) = (Vec::new(), Vec::new());
    for (i, pair) in bounds.windows(2).enumerate() {
        let range = Range::new(pair[0], pair[1] - 1);
        if i % 2 == 0 {
            first.push(range);
        } else {
            second.push(range);
        }
    }
    (first, second)
}

proptest! {
    #[test]
    fn prop_partitioned_ranges_never_overlap(
        total in 2u32..256,
        cuts in prop::collection::vec(any::<u32>(), 1..8),
    ) {
        let (first, second) = partition(total, &cuts);
        prop_assert!(!ranges_intersect(&first, &second));
        let covered: u32 = first.iter().chain(&second).map(Range::len).sum();
        prop_assert_eq!(covered, total);
    }

    #[test]
    fn prop_shared_index_always_overlaps(
        a in 0u32..100,
        b in 0u32..100,
        shared in 0u32..100,
    ) {
        let first = vec![Range::new(a.min(shared), a.max(shared))];
        let second = vec![Range::new(b.min(shared), b.max(shared))];
        prop_assert!(ranges_intersect(&first, &second));
    }

    #[test]
    fn prop_disjoint_writers_build(
        total in 2u32..64,
        cuts in prop::collection::vec(any::<u32>(), 1..6),
    ) {
        let (first, second) = partition(total, &cuts);
        prop_assume!(!second.is_empty());
        let pairs = |rs: &[Range]| rs.iter().map(|r| (r.min, r.max)).collect::<Vec<_>>();

        let app = ApplicationBuilder::new()
            .default_data_source("DDB1")
            .data_source("DDB1", "GAMDataSource")
            .data_signal(
                "DDB1",
                "S",
                &[
                    ("Type", Value::from("uint16")),
                    ("NumberOfElements", Value::from(total)),
                    ("NumberOfDimensions", Value::from(1u32)),
                ],
            )
            .output("GAM1", "S", &[("Ranges", ranges(&pairs(&first)))])
            .output("GAM2", "S", &[("Ranges", ranges(&pairs(&second)))])
            .thread("Run", "T1", &["GAM1", "GAM2"]);
        let output = app.build().unwrap();

        // Both writers together move the whole signal once
        let bytes: u32 = output
            .functions
            .iter()
            .map(|f| f.signals(Direction::Output)[0].memory_size())
            .sum();
        prop_assert_eq!(bytes, total * 2);
    }

    #[test]
    fn prop_function_offsets_are_cumulative(
        counts in prop::collection::vec(1u32..16, 1..12),
    ) {
        let mut app = ApplicationBuilder::new()
            .default_data_source("DDB1")
            .data_source("DDB1", "GAMDataSource")
            .thread("Run", "T1", &["GAM1"]);
        for (i, count) in counts.iter().enumerate() {
            app = app.input(
                "GAM1",
                &format!("S{}", i),
                &[
                    ("Type", Value::from("float64")),
                    ("NumberOfElements", Value::from(*count)),
                ],
            );
        }
        let output = app.build().unwrap();

        let gam1 = output.functions.by_name("GAM1").unwrap();
        let mut expected = 0u32;
        for (fs, count) in gam1.signals(Direction::Input).iter().zip(&counts) {
            prop_assert_eq!(fs.offset, Some(expected));
            prop_assert_eq!(fs.memory_size(), count * 8);
            expected += count * 8;
        }
        prop_assert_eq!(gam1.inputs.memory.size, expected);
    }
}
