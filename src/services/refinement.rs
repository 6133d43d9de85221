//! Refinement predicates for numeric parameter intervals.
//!
//! Pure functions: given a live interval and its refinement configuration,
//! compute the sub-intervals the search may descend into, and decide when an
//! interval is narrow enough to stop. All splits cover the input exactly,
//! with adjacent sub-intervals sharing only their boundary.

use crate::domain::models::{
    ComponentInstance, ComponentRepository, Interval, ParameterValue,
};

/// Linear split of `interval` into at most `max_branches` equal-width pieces
/// no finer than `min_length`. An interval already at or below `min_length`
/// is returned unchanged as a singleton list, never an error.
pub fn refine_linear(interval: Interval, max_branches: usize, min_length: f64) -> Vec<Interval> {
    let length = interval.width();
    if length <= min_length {
        return vec![interval];
    }
    let pieces = ((length / min_length).ceil() as usize).min(max_branches).max(1);
    let step = length / pieces as f64;
    (0..pieces)
        .map(|i| {
            let lo = interval.lo + i as f64 * step;
            // Snap the last bound to avoid floating-point shortfall.
            let hi = if i + 1 == pieces { interval.hi } else { interval.lo + (i + 1) as f64 * step };
            Interval::new(lo, hi)
        })
        .collect()
}

/// Log-scale split concentrating resolution near `focus`.
///
/// With the focus at or outside a bound, the `branches` sub-interval widths
/// grow geometrically (ratio `base`) away from the bound nearest the focus,
/// so the finest piece touches that bound. With the focus strictly inside,
/// the interval is cut at the focus and both sides are refined recursively
/// with branch budgets proportional to their share of the width.
pub fn refine_log_scale(
    interval: Interval,
    branches: usize,
    base: f64,
    focus: f64,
) -> Vec<Interval> {
    let length = interval.width();
    if branches <= 1 || length <= 0.0 {
        return vec![interval];
    }
    let n = branches as f64;

    if focus <= interval.lo || focus >= interval.hi {
        // Geometric series: shortest piece sized so the n pieces sum to length.
        let shortest = length * (1.0 - base) / (1.0 - base.powf(n));
        let mut out = Vec::with_capacity(branches);
        if focus <= interval.lo {
            let mut cursor = interval.lo;
            for i in 0..branches {
                let start = cursor;
                cursor = if i + 1 == branches { interval.hi } else { start + base.powi(i as i32) * shortest };
                out.push(Interval::new(start, cursor));
            }
        } else {
            let mut cursor = interval.hi;
            for i in 0..branches {
                let end = cursor;
                cursor = if i + 1 == branches { interval.lo } else { end - base.powi(i as i32) * shortest };
                out.push(Interval::new(cursor, end));
            }
            out.reverse();
        }
        return out;
    }

    // Inner focus: split there and allocate branches proportionally, at
    // least one per side.
    let distance_to_focus = focus - interval.lo;
    let segments_left =
        ((n * distance_to_focus / length).round() as usize).clamp(1, branches - 1);
    let segments_right = branches - segments_left;
    let mut out = refine_log_scale(Interval::new(interval.lo, focus), segments_left, base, focus);
    out.extend(refine_log_scale(Interval::new(focus, interval.hi), segments_right, base, focus));
    out
}

/// Degenerate `[i, i]` intervals for every integer in `interval`. Used when
/// an integer parameter encloses no more values than the branching factor:
/// the ultimate refinement level enumerates them directly.
pub fn enumerate_integers(interval: Interval) -> Vec<Interval> {
    let first = interval.lo.ceil() as i64;
    let last = interval.hi.floor() as i64;
    (first..=last).map(|i| Interval::new(i as f64, i as f64)).collect()
}

/// Number of integers enclosed by `interval`.
pub fn enclosed_integer_count(interval: Interval) -> usize {
    let first = interval.lo.ceil();
    let last = interval.hi.floor();
    if last < first {
        0
    } else {
        (last - first) as usize + 1
    }
}

/// True iff every numeric parameter's live interval across the whole
/// instance tree has width at or below its configured threshold. Parameters
/// already closed to a concrete value trivially satisfy the predicate.
pub fn is_refinement_complete(repository: &ComponentRepository, root: &ComponentInstance) -> bool {
    root.iter_tree().iter().all(|inst| {
        inst.parameter_values.iter().all(|(param, value)| {
            match value {
                ParameterValue::Range(iv) => repository
                    .refinement_config(&inst.component_name, param)
                    .is_some_and(|cfg| iv.width() <= cfg.interval_length),
                _ => true,
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(parent: Interval, pieces: &[Interval]) {
        assert!(!pieces.is_empty());
        assert!((pieces[0].lo - parent.lo).abs() < 1e-9);
        assert!((pieces.last().unwrap().hi - parent.hi).abs() < 1e-9);
        for pair in pieces.windows(2) {
            assert!(
                (pair[0].hi - pair[1].lo).abs() < 1e-9,
                "gap or overlap between {} and {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn linear_refinement_covers_exactly() {
        let parent = Interval::new(0.0, 10.0);
        let pieces = refine_linear(parent, 4, 1.0);
        assert_eq!(pieces.len(), 4);
        assert_exact_cover(parent, &pieces);
    }

    #[test]
    fn linear_refinement_is_bounded_by_min_length() {
        // length 3, min 1 -> ceil(3/1)=3 pieces even though 8 are allowed
        let pieces = refine_linear(Interval::new(0.0, 3.0), 8, 1.0);
        assert_eq!(pieces.len(), 3);
    }

    #[test]
    fn linear_refinement_is_idempotent_at_the_floor() {
        let parent = Interval::new(0.0, 0.5);
        let pieces = refine_linear(parent, 4, 1.0);
        assert_eq!(pieces, vec![parent]);
    }

    #[test]
    fn log_refinement_with_focus_on_lower_bound_is_finest_at_that_bound() {
        let parent = Interval::new(0.0, 15.0);
        let pieces = refine_log_scale(parent, 4, 2.0, 0.0);
        assert_eq!(pieces.len(), 4);
        assert_exact_cover(parent, &pieces);
        // widths 1, 2, 4, 8
        assert!((pieces[0].width() - 1.0).abs() < 1e-9);
        assert!((pieces[3].width() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn log_refinement_with_focus_on_upper_bound_is_mirrored() {
        let parent = Interval::new(0.0, 15.0);
        let pieces = refine_log_scale(parent, 4, 2.0, 15.0);
        assert_exact_cover(parent, &pieces);
        assert!(pieces[0].width() > pieces[3].width());
        assert!((pieces[3].width() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn log_refinement_with_inner_focus_covers_exactly() {
        let parent = Interval::new(0.0, 10.0);
        let pieces = refine_log_scale(parent, 6, 2.0, 2.5);
        assert_exact_cover(parent, &pieces);
        // The cut at the focus must be one of the boundaries.
        assert!(pieces.iter().any(|p| (p.hi - 2.5).abs() < 1e-9));
    }

    #[test]
    fn integer_enumeration_yields_degenerate_intervals() {
        let pieces = enumerate_integers(Interval::new(1.2, 4.9));
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], Interval::new(2.0, 2.0));
        assert_eq!(pieces[2], Interval::new(4.0, 4.0));
        assert_eq!(enclosed_integer_count(Interval::new(1.2, 4.9)), 3);
        assert_eq!(enclosed_integer_count(Interval::new(1.2, 1.3)), 0);
    }

    mod completeness {
        use super::*;
        use crate::domain::models::{
            Component, Parameter, ParameterDefault, ParameterDomain, ParameterRefinementConfig,
        };
        use std::collections::HashMap;

        fn repo(threshold: f64) -> ComponentRepository {
            let component = Component {
                name: "c".into(),
                provided_interfaces: vec!["root".into()],
                required_interfaces: vec![],
                parameters: vec![Parameter {
                    name: "p".into(),
                    default: ParameterDefault::Number(0.0),
                    domain: ParameterDomain::Numeric { min: 0.0, max: 10.0, integer: false },
                }],
            };
            let mut configs = HashMap::new();
            configs.insert(
                ("c".to_string(), "p".to_string()),
                ParameterRefinementConfig::linear(threshold, 2),
            );
            ComponentRepository::new(vec![component], configs)
        }

        #[test]
        fn wide_interval_is_incomplete_and_narrow_is_complete() {
            let repository = repo(1.0);
            let mut inst = ComponentInstance::new("c");
            inst.parameter_values
                .insert("p".into(), ParameterValue::Range(Interval::new(0.0, 10.0)));
            assert!(!is_refinement_complete(&repository, &inst));

            inst.parameter_values
                .insert("p".into(), ParameterValue::Range(Interval::new(4.0, 4.5)));
            assert!(is_refinement_complete(&repository, &inst));
        }

        #[test]
        fn closed_values_are_always_complete() {
            let repository = repo(1.0);
            let mut inst = ComponentInstance::new("c");
            inst.parameter_values.insert("p".into(), ParameterValue::Number(3.0));
            assert!(is_refinement_complete(&repository, &inst));
        }
    }
}
