//! Rank and shape alignment under explicit broadcast.
//!
//! Planning functions are pure; the emitting helpers insert `expand_dims` and `broadcast`
//! instructions ahead of the operation being lowered.

use crate::{
    conversion::{ConversionError, DeclineReason, RewriteFailure},
    spec::{BroadcastSpec, CoreOp, Dimension, ExpandDimsSpec, Shape, ValueId},
};

use super::{
    shape_math::{broadcast_dims, ShapeError},
    utils::Emitter,
};

/// Side on which unit dimensions are added when extending rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBias {
    Leading,
    Trailing,
}

/// Result positions of the unit axes that extend `rank` to `target_rank`.
pub fn rank_extension_axes(rank: usize, target_rank: usize, bias: RankBias) -> Vec<usize> {
    if target_rank <= rank {
        return Vec::new();
    }
    match bias {
        RankBias::Leading => (0..target_rank - rank).collect(),
        RankBias::Trailing => (rank..target_rank).collect(),
    }
}

/// Shape after inserting unit dimensions at result positions `axes`.
pub fn expand_dims_shape(shape: &Shape, axes: &[usize]) -> Shape {
    let rank = shape.rank() + axes.len();
    let mut source = shape.dims().iter();
    let dims = (0..rank)
        .map(|axis| {
            if axes.contains(&axis) {
                Dimension::Static(1)
            } else {
                source.next().cloned().unwrap_or(Dimension::Static(1))
            }
        })
        .collect::<Vec<_>>();
    Shape::new(dims)
}

/// Trailing-aligned common shape of `shapes`.
///
/// Fails with `BroadcastMismatch` for two different static extents and with `Unresolved`
/// whenever a dynamic extent cannot be proven compatible.
pub fn common_broadcast_shape(shapes: &[Shape]) -> Result<Shape, ShapeError> {
    let rank = shapes.iter().map(Shape::rank).max().unwrap_or(0);
    let mut dims = vec![Dimension::Static(1); rank];
    for shape in shapes {
        let offset = rank - shape.rank();
        for (axis, dim) in shape.dims().iter().enumerate() {
            let slot = &mut dims[offset + axis];
            *slot = broadcast_dims(slot, dim)?;
        }
    }
    Ok(Shape::new(dims))
}

/// One entry of a broadcast/expand size list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDim {
    /// A constant extent; `-1` keeps the input extent.
    Static(i64),
    /// A runtime value whose extent is unknown while lowering.
    Dynamic,
}

/// Rank extension and broadcast axes needed to expand an input to a size list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandPlan {
    pub leading_dims: usize,
    pub axes: Vec<usize>,
}

impl ExpandPlan {
    pub fn is_identity(&self) -> bool {
        self.leading_dims == 0 && self.axes.is_empty()
    }
}

/// Plans `expand`/`broadcast_to` with PyTorch semantics.
///
/// For target index `i`: a new leading dimension always broadcasts; a dynamic target is
/// broadcastable; `-1` keeps the input extent; otherwise the axis broadcasts when the aligned
/// input extent is 1 and the target differs. New-dim and dynamic status are decided before any
/// input extent is read.
pub fn expand_like_pytorch(input: &Shape, new_dims: &[TargetDim]) -> Result<ExpandPlan, ShapeError> {
    if new_dims.len() < input.rank() {
        return Err(ShapeError::RankMismatch {
            input: input.rank(),
            target: new_dims.len(),
        });
    }
    let leading_dims = new_dims.len() - input.rank();

    let mut axes = Vec::new();
    for (i, target) in new_dims.iter().enumerate() {
        let is_new_dim = i < leading_dims;
        let output_broadcastable = match *target {
            TargetDim::Dynamic => true,
            TargetDim::Static(extent) if is_new_dim => {
                if extent < 0 {
                    return Err(ShapeError::InvalidExtent { extent });
                }
                true
            }
            TargetDim::Static(-1) => false,
            TargetDim::Static(extent) => match input.dim(i - leading_dims) {
                Some(Dimension::Static(size)) => extent != *size as i64,
                _ => true,
            },
        };
        let input_broadcastable =
            is_new_dim || matches!(input.dim(i - leading_dims), Some(Dimension::Static(1)));
        if input_broadcastable && output_broadcastable {
            axes.push(i);
        }
    }

    Ok(ExpandPlan { leading_dims, axes })
}

/// Emits `expand_dims`; identity when `axes` is empty.
pub(crate) fn expand_dims(
    em: &mut Emitter,
    value: ValueId,
    axes: Vec<usize>,
) -> Result<ValueId, RewriteFailure> {
    if axes.is_empty() {
        return Ok(value);
    }
    let spec = em
        .tensor_spec(value)
        .ok_or(DeclineReason::MalformedOperands)?;
    let output = spec.with_shape(expand_dims_shape(&spec.shape, &axes));
    Ok(em.tensor(CoreOp::ExpandDims(ExpandDimsSpec { axes }), &[value], output)?)
}

/// Adds unit dimensions on `bias` until `value` has `target_rank` dimensions.
pub(crate) fn align_rank(
    em: &mut Emitter,
    value: ValueId,
    target_rank: usize,
    bias: RankBias,
) -> Result<ValueId, RewriteFailure> {
    let spec = em
        .tensor_spec(value)
        .ok_or(DeclineReason::MalformedOperands)?;
    expand_dims(em, value, rank_extension_axes(spec.rank(), target_rank, bias))
}

/// Emits one `broadcast` over explicit `axes`; identity when `axes` is empty.
pub(crate) fn broadcast_axes(
    em: &mut Emitter,
    value: ValueId,
    axes: Vec<usize>,
    sizes: Vec<Dimension>,
) -> Result<ValueId, RewriteFailure> {
    if axes.is_empty() {
        return Ok(value);
    }
    let spec = em
        .tensor_spec(value)
        .ok_or(DeclineReason::MalformedOperands)?;
    let mut dims = spec.shape.dims().to_vec();
    for (axis, size) in axes.iter().zip(sizes.iter()) {
        match dims.get_mut(*axis) {
            Some(slot) => *slot = size.clone(),
            None => return Err(DeclineReason::MalformedOperands.into()),
        }
    }
    let output = spec.with_shape(Shape::new(dims));
    Ok(em.tensor(
        CoreOp::Broadcast(BroadcastSpec { axes, sizes }),
        &[value],
        output,
    )?)
}

/// Broadcasts unit axes of `value` to `reference`, skipping `excluded` axes. Ranks must match.
pub(crate) fn broadcast_except_dims(
    em: &mut Emitter,
    value: ValueId,
    reference: &Shape,
    excluded: &[usize],
) -> Result<ValueId, RewriteFailure> {
    let spec = em
        .tensor_spec(value)
        .ok_or(DeclineReason::MalformedOperands)?;
    if spec.rank() != reference.rank() {
        return Err(DeclineReason::UnsupportedRank {
            expected: reference.rank(),
            found: spec.rank(),
        }
        .into());
    }
    let mut axes = Vec::new();
    let mut sizes = Vec::new();
    for (axis, (dim, target)) in spec.shape.dims().iter().zip(reference.dims()).enumerate() {
        if excluded.contains(&axis) {
            continue;
        }
        if dim.is_unit() && !target.is_unit() {
            axes.push(axis);
            sizes.push(target.clone());
        }
    }
    broadcast_axes(em, value, axes, sizes)
}

/// Rank-extends (leading) and broadcasts `value` to exactly `target`.
pub(crate) fn broadcast_to_shape(
    em: &mut Emitter,
    value: ValueId,
    target: &Shape,
) -> Result<ValueId, RewriteFailure> {
    let aligned = align_rank(em, value, target.rank(), RankBias::Leading)?;
    broadcast_except_dims(em, aligned, target, &[])
}

/// Brings every value in `values` to their common broadcast shape.
///
/// The common shape is planned before anything is emitted, so a failure leaves no partial
/// broadcasts behind. A static mismatch is fatal; an unprovable dynamic pair declines.
pub(crate) fn broadcast_many_to_common_shape(
    em: &mut Emitter,
    values: &[ValueId],
) -> Result<Vec<ValueId>, RewriteFailure> {
    let shapes = values
        .iter()
        .map(|value| em.tensor_spec(*value).map(|spec| spec.shape))
        .collect::<Option<Vec<_>>>()
        .ok_or(DeclineReason::MalformedOperands)?;
    let common = common_broadcast_shape(&shapes).map_err(|err| match err {
        ShapeError::Unresolved { .. } => RewriteFailure::Declined(DeclineReason::UnresolvedBroadcast),
        other => RewriteFailure::Fatal(ConversionError::BroadcastMismatch(other.to_string())),
    })?;

    values
        .iter()
        .map(|value| broadcast_to_shape(em, *value, &common))
        .collect()
}

