use tensor_lower::{
    ir_utils::{shape_mixed, shape_static},
    lowering::{
        common_broadcast_shape, expand_dims_shape, expand_like_pytorch, rank_extension_axes,
        RankBias, ShapeError, TargetDim,
    },
    spec::Dimension,
};

fn targets(values: &[i64]) -> Vec<TargetDim> {
    values.iter().copied().map(TargetDim::Static).collect()
}

#[test]
fn new_leading_dim_is_broadcast() {
    let plan = expand_like_pytorch(&shape_static(&[3]), &targets(&[2, 3])).unwrap();
    assert_eq!(plan.leading_dims, 1);
    assert_eq!(plan.axes, vec![0]);
}

#[test]
fn unit_dim_is_broadcast_to_target() {
    let plan = expand_like_pytorch(&shape_static(&[1, 3]), &targets(&[4, 3])).unwrap();
    assert_eq!(plan.leading_dims, 0);
    assert_eq!(plan.axes, vec![0]);
}

#[test]
fn minus_one_keeps_input_extent() {
    let plan = expand_like_pytorch(&shape_static(&[3, 3]), &targets(&[-1, 3])).unwrap();
    assert!(plan.is_identity());
}

#[test]
fn dynamic_target_only_broadcasts_unit_dims() {
    let plan = expand_like_pytorch(
        &shape_static(&[1, 3]),
        &[TargetDim::Dynamic, TargetDim::Dynamic],
    )
    .unwrap();
    assert_eq!(plan.axes, vec![0]);
}

#[test]
fn dynamic_input_dim_is_not_broadcast() {
    let plan = expand_like_pytorch(&shape_mixed(&[None, Some(1)]), &targets(&[-1, 5])).unwrap();
    assert_eq!(plan.axes, vec![1]);
}

#[test]
fn fewer_targets_than_input_rank_is_rejected() {
    let err = expand_like_pytorch(&shape_static(&[2, 3]), &targets(&[3])).unwrap_err();
    assert_eq!(err, ShapeError::RankMismatch { input: 2, target: 1 });
}

#[test]
fn negative_extent_on_new_dim_is_rejected() {
    let err = expand_like_pytorch(&shape_static(&[3]), &targets(&[-1, 3])).unwrap_err();
    assert_eq!(err, ShapeError::InvalidExtent { extent: -1 });
}

#[test]
fn rank_extension_respects_bias() {
    assert_eq!(rank_extension_axes(2, 4, RankBias::Leading), vec![0, 1]);
    assert_eq!(rank_extension_axes(2, 4, RankBias::Trailing), vec![2, 3]);
    assert!(rank_extension_axes(3, 2, RankBias::Leading).is_empty());
}

#[test]
fn expand_dims_shape_inserts_unit_axes() {
    let shape = expand_dims_shape(&shape_static(&[4, 5]), &[0, 2]);
    assert_eq!(shape, shape_static(&[1, 4, 1, 5]));
}

#[test]
fn common_shape_aligns_trailing_dims() {
    let common =
        common_broadcast_shape(&[shape_static(&[2, 1]), shape_static(&[3]), shape_static(&[])])
            .unwrap();
    assert_eq!(common, shape_static(&[2, 3]));
}

#[test]
fn common_shape_reports_static_mismatch() {
    let err = common_broadcast_shape(&[shape_static(&[2]), shape_static(&[3])]).unwrap_err();
    assert!(matches!(err, ShapeError::BroadcastMismatch { .. }));
}

#[test]
fn common_shape_keeps_matching_symbols_and_declines_others() {
    let same = common_broadcast_shape(&[shape_mixed(&[None]), shape_static(&[1])]).unwrap();
    assert!(matches!(same.dims()[0], Dimension::Dynamic(_)));

    let err = common_broadcast_shape(&[shape_mixed(&[None]), shape_static(&[4])]).unwrap_err();
    assert!(matches!(err, ShapeError::Unresolved { .. }));
}
