use proptest::prelude::*;
use tensor_lower::lowering::{compute_slice_bounds, normalize_dim, ShapeError};

/// Indices visited by `range(len)[start:stop:step]` in Python.
fn python_slice(len: i64, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<i64> {
    let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
    let adjust = |bound: i64| {
        if bound < 0 {
            (bound + len).max(lower)
        } else {
            bound.min(upper)
        }
    };
    let start = start.map_or(if step < 0 { upper } else { lower }, adjust);
    let stop = stop.map_or(if step < 0 { lower } else { upper }, adjust);

    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i);
        i += step;
    }
    out
}

fn lowered_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<i64> {
    let bounds = compute_slice_bounds(len, start, end, step).expect("non-zero step");
    bounds.indices().collect()
}

proptest! {
    #[test]
    fn positive_steps_match_python(
        len in 0usize..12,
        start in proptest::option::of(-20i64..20),
        end in proptest::option::of(-20i64..20),
        step in 1i64..5,
    ) {
        prop_assert_eq!(
            lowered_indices(len, start, end, step),
            python_slice(len as i64, start, end, step)
        );
    }

    #[test]
    fn negative_steps_with_in_range_start_match_python(
        len in 1usize..12,
        start_seed in 0i64..24,
        end in -30i64..30,
        step in -4i64..0,
    ) {
        let dim = len as i64;
        let start = start_seed % (2 * dim) - dim;
        prop_assert_eq!(
            lowered_indices(len, Some(start), Some(end), step),
            python_slice(dim, Some(start), Some(end), step)
        );
    }

    #[test]
    fn length_never_exceeds_extent(
        len in 0usize..16,
        start in proptest::option::of(-40i64..40),
        end in proptest::option::of(-40i64..40),
        step in 1i64..6,
    ) {
        let bounds = compute_slice_bounds(len, start, end, step).expect("non-zero step");
        prop_assert!(bounds.length <= len);
        for index in bounds.indices() {
            prop_assert!((0..len as i64).contains(&index));
        }
    }
}

#[test]
fn full_slice_is_identity() {
    let bounds = compute_slice_bounds(7, Some(0), Some(7), 1).unwrap();
    assert_eq!(bounds.offset, 0);
    assert_eq!(bounds.length, 7);
    assert_eq!(bounds.stride, 1);

    let open = compute_slice_bounds(7, None, None, 1).unwrap();
    assert_eq!(open, bounds);
}

#[test]
fn reversed_full_range_reaches_index_zero() {
    let bounds = compute_slice_bounds(5, Some(-1), Some(-6), -1).unwrap();
    assert_eq!(bounds.offset, 4);
    assert_eq!(bounds.length, 5);
    assert_eq!(bounds.indices().collect::<Vec<_>>(), vec![4, 3, 2, 1, 0]);
}

#[test]
fn out_of_range_bounds_are_clamped() {
    let bounds = compute_slice_bounds(4, Some(-100), Some(100), 2).unwrap();
    assert_eq!(bounds.indices().collect::<Vec<_>>(), vec![0, 2]);

    let empty = compute_slice_bounds(4, Some(3), Some(1), 1).unwrap();
    assert_eq!(empty.length, 0);
}

#[test]
fn zero_step_is_rejected() {
    assert_eq!(
        compute_slice_bounds(4, None, None, 0),
        Err(ShapeError::ZeroStep)
    );
}

#[test]
fn normalize_dim_wraps_negative_axes_once() {
    assert_eq!(normalize_dim(-1, 3), Ok(2));
    assert_eq!(normalize_dim(2, 3), Ok(2));
    assert!(matches!(
        normalize_dim(-4, 3),
        Err(ShapeError::InvalidDim { dim: -4, rank: 3 })
    ));
    assert!(normalize_dim(3, 3).is_err());
}
