//! Property tests for the interval refinement predicates.

use confopt::services::refinement::{
    enclosed_integer_count, enumerate_integers, refine_linear, refine_log_scale,
};
use confopt::Interval;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const EPS: f64 = 1e-6;

fn assert_exact_cover(parent: Interval, pieces: &[Interval]) -> Result<(), TestCaseError> {
    prop_assert!(!pieces.is_empty());
    prop_assert!((pieces[0].lo - parent.lo).abs() < EPS);
    prop_assert!((pieces.last().unwrap().hi - parent.hi).abs() < EPS);
    for pair in pieces.windows(2) {
        prop_assert!(
            (pair[0].hi - pair[1].lo).abs() < EPS,
            "gap or overlap between {} and {}",
            pair[0],
            pair[1]
        );
    }
    Ok(())
}

proptest! {
    /// Property: a linear split exactly covers its input interval.
    #[test]
    fn prop_linear_split_covers_exactly(
        lo in -1000.0f64..1000.0,
        length in 0.01f64..500.0,
        branches in 2usize..12,
        min_length in 0.001f64..10.0,
    ) {
        let parent = Interval::new(lo, lo + length);
        let pieces = refine_linear(parent, branches, min_length);
        assert_exact_cover(parent, &pieces)?;
    }

    /// Property: a linear split never exceeds the branching factor and never
    /// produces pieces finer than the configured floor allows.
    #[test]
    fn prop_linear_split_respects_branch_and_floor_limits(
        lo in -1000.0f64..1000.0,
        length in 0.01f64..500.0,
        branches in 2usize..12,
        min_length in 0.001f64..10.0,
    ) {
        let parent = Interval::new(lo, lo + length);
        let pieces = refine_linear(parent, branches, min_length);
        prop_assert!(pieces.len() <= branches);
        if pieces.len() > 1 {
            // Fewer pieces than allowed only happens when the floor binds.
            let expected = ((length / min_length).ceil() as usize).min(branches);
            prop_assert_eq!(pieces.len(), expected);
        }
    }

    /// Property: refining at or below the floor returns the interval itself.
    #[test]
    fn prop_refinement_is_idempotent_at_the_floor(
        lo in -1000.0f64..1000.0,
        length in 0.001f64..10.0,
        branches in 2usize..12,
    ) {
        let parent = Interval::new(lo, lo + length);
        let pieces = refine_linear(parent, branches, length + EPS);
        prop_assert_eq!(pieces, vec![parent]);
    }

    /// Property: a log-scale split with any focus exactly covers its input
    /// and never exceeds the branching factor.
    #[test]
    fn prop_log_split_covers_exactly(
        lo in -100.0f64..100.0,
        length in 0.1f64..200.0,
        branches in 2usize..10,
        base in 1.1f64..4.0,
        focus_ratio in -0.5f64..1.5,
    ) {
        let parent = Interval::new(lo, lo + length);
        let focus = lo + focus_ratio * length;
        let pieces = refine_log_scale(parent, branches, base, focus);
        assert_exact_cover(parent, &pieces)?;
        prop_assert!(pieces.len() <= branches);
    }

    /// Property: with the focus on the lower bound, widths grow
    /// monotonically away from it.
    #[test]
    fn prop_log_split_is_finest_at_the_focused_bound(
        lo in -100.0f64..100.0,
        length in 0.1f64..200.0,
        branches in 2usize..10,
        base in 1.1f64..4.0,
    ) {
        let parent = Interval::new(lo, lo + length);
        let pieces = refine_log_scale(parent, branches, base, lo);
        for pair in pieces.windows(2) {
            prop_assert!(pair[0].width() <= pair[1].width() + EPS);
        }
    }

    /// Property: integer enumeration yields one degenerate interval per
    /// enclosed integer, in ascending order.
    #[test]
    fn prop_integer_enumeration_matches_the_count(
        lo in -500.0f64..500.0,
        length in 0.0f64..50.0,
    ) {
        let parent = Interval::new(lo, lo + length);
        let pieces = enumerate_integers(parent);
        prop_assert_eq!(pieces.len(), enclosed_integer_count(parent));
        for pair in pieces.windows(2) {
            prop_assert!((pair[1].lo - pair[0].lo - 1.0).abs() < EPS);
        }
        for piece in &pieces {
            prop_assert!(piece.lo >= parent.lo - EPS && piece.hi <= parent.hi + EPS);
            prop_assert!((piece.lo - piece.lo.round()).abs() < EPS);
            prop_assert!(piece.width() < EPS);
        }
    }
}
