use std::sync::Arc;

use crate::{
    conversion::{DeclineReason, RewriteOutcome, TypeConverter},
    pattern::{OpRewritePattern, SliceOpView},
    rewriter::ProgramRewriter,
    spec::{CoreOp, Dimension, SliceSpec, ValueId, ValueType},
};

use super::{
    shape_math::compute_slice_bounds,
    utils::{
        constant_axis, constant_int, converted_tensor, is_none, is_optional, tensor_operand,
        Emitter, LowerResult,
    },
};

/// `slice(self, dim, start, end, step)` to one strided core `slice`.
pub struct ConvertSliceOp {
    converter: Arc<dyn TypeConverter>,
}

impl ConvertSliceOp {
    pub fn new(converter: Arc<dyn TypeConverter>) -> Self {
        Self { converter }
    }
}

impl OpRewritePattern<SliceOpView> for ConvertSliceOp {
    fn match_and_rewrite(&self, op: SliceOpView, rewriter: &mut ProgramRewriter) -> RewriteOutcome {
        lower_slice(&op, rewriter, self.converter.as_ref()).into()
    }
}

fn lower_slice(
    op: &SliceOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
) -> LowerResult {
    let (input, input_spec) = tensor_operand(rewriter, op.operand(0))?;
    let rank = input_spec.rank();
    let axis = constant_axis(rewriter, op.operand(1), rank)?;

    let start = op.operand(2).ok_or(DeclineReason::MalformedOperands)?;
    let end = op.operand(3).ok_or(DeclineReason::MalformedOperands)?;
    let step = op.operand(4).ok_or(DeclineReason::MalformedOperands)?;
    if is_optional(rewriter, start) {
        return Err(DeclineReason::OptionalOperand { operand: "start" }.into());
    }
    if is_optional(rewriter, end) {
        return Err(DeclineReason::OptionalOperand { operand: "end" }.into());
    }
    let start = optional_bound(rewriter, start, "start")?;
    let end = optional_bound(rewriter, end, "end")?;
    let step = constant_int(rewriter, step)
        .ok_or(DeclineReason::NonConstantOperand { operand: "step" })?;

    let dim_size = input_spec
        .shape
        .dim(axis)
        .and_then(Dimension::as_static)
        .ok_or(DeclineReason::DynamicShape { axis })?;
    let bounds =
        compute_slice_bounds(dim_size, start, end, step).map_err(|_| DeclineReason::ZeroStep)?;
    let result_spec = converted_tensor(converter, &op.result_type)?;

    let mut offsets = vec![0usize; rank];
    let mut sizes = input_spec.shape.dims().to_vec();
    let mut strides = vec![1i64; rank];
    offsets[axis] = bounds.offset;
    sizes[axis] = Dimension::Static(bounds.length);
    strides[axis] = bounds.stride;

    let spec = SliceSpec {
        offsets,
        sizes,
        strides,
    };
    Ok(Emitter::new(rewriter, op.root).replace_with(
        CoreOp::Slice(spec),
        &[input],
        ValueType::Tensor(result_spec),
    )?)
}

/// A `None`-typed bound is absent; anything else must be an integer constant.
fn optional_bound(
    rewriter: &ProgramRewriter,
    value: ValueId,
    operand: &'static str,
) -> Result<Option<i64>, DeclineReason> {
    if is_none(rewriter, value) {
        return Ok(None);
    }
    constant_int(rewriter, value)
        .map(Some)
        .ok_or(DeclineReason::NonConstantOperand { operand })
}
