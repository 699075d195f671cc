use std::{marker::PhantomData, ops::Deref, sync::Arc};

use crate::{
    conversion::{DeclineReason, RewriteFailure, RewriteOutcome, TypeConverter},
    pattern::{
        BindSymbolicShapeOpView, FrontendOpView, OpRewritePattern, SizeOpView, SymbolicIntOpView,
        TensorLiteralOpView,
    },
    rewriter::ProgramRewriter,
    spec::{
        BroadcastSpec, CoreOp, DType, DimSpec, Dimension, Literal, Shape, TensorLiteral, TensorSpec,
        ValueId, ValueType,
    },
};

use super::{
    broadcast::{broadcast_to_shape, expand_dims, expand_like_pytorch, TargetDim},
    shape_math::ShapeError,
    utils::{
        constant_bool, constant_int, converted_tensor, is_none, list_elements, tensor_operand,
        Emitter, LowerResult,
    },
};

/// `broadcast_to(self, size)` and `expand(self, size, implicit)`.
pub struct ConvertBroadcastLikeOp<V> {
    converter: Arc<dyn TypeConverter>,
    _view: PhantomData<fn() -> V>,
}

impl<V> ConvertBroadcastLikeOp<V> {
    pub fn new(converter: Arc<dyn TypeConverter>) -> Self {
        Self {
            converter,
            _view: PhantomData,
        }
    }
}

impl<V> OpRewritePattern<V> for ConvertBroadcastLikeOp<V>
where
    V: Deref<Target = FrontendOpView>,
{
    fn match_and_rewrite(&self, op: V, rewriter: &mut ProgramRewriter) -> RewriteOutcome {
        lower_broadcast_like(&op, rewriter, self.converter.as_ref()).into()
    }
}

fn lower_broadcast_like(
    op: &FrontendOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
) -> LowerResult {
    let (input, input_spec) = tensor_operand(rewriter, op.operand(0))?;
    let list = op.operand(1).ok_or(DeclineReason::MalformedOperands)?;
    let sizes = list_elements(rewriter, list).ok_or(DeclineReason::NonLiteralList)?;
    let targets = sizes
        .iter()
        .map(|size| constant_int(rewriter, *size).map_or(TargetDim::Dynamic, TargetDim::Static))
        .collect::<Vec<_>>();

    let result_spec = converted_tensor(converter, &op.result_type)?;
    if result_spec.rank() != targets.len() {
        return Err(DeclineReason::UnsupportedRank {
            expected: targets.len(),
            found: result_spec.rank(),
        }
        .into());
    }
    let plan = expand_like_pytorch(&input_spec.shape, &targets).map_err(|err| match err {
        ShapeError::RankMismatch { input, target } => DeclineReason::UnsupportedRank {
            expected: input,
            found: target,
        },
        _ => DeclineReason::UnsupportedAttribute { attribute: "size" },
    })?;

    let mut broadcast_sizes = Vec::with_capacity(plan.axes.len());
    for axis in &plan.axes {
        let size = match targets[*axis] {
            TargetDim::Static(extent) if extent >= 0 => Dimension::Static(extent as usize),
            TargetDim::Static(_) => {
                return Err(DeclineReason::UnsupportedAttribute { attribute: "size" }.into())
            }
            TargetDim::Dynamic => result_spec
                .shape
                .dim(*axis)
                .cloned()
                .ok_or(DeclineReason::MalformedOperands)?,
        };
        broadcast_sizes.push(size);
    }

    let mut em = Emitter::new(rewriter, op.root);
    let input = expand_dims(&mut em, input, (0..plan.leading_dims).collect())?;
    if plan.axes.is_empty() {
        return Ok(em.replace_root(input)?);
    }
    Ok(em.replace_with(
        CoreOp::Broadcast(BroadcastSpec {
            axes: plan.axes,
            sizes: broadcast_sizes,
        }),
        &[input],
        ValueType::Tensor(result_spec),
    )?)
}

/// `zeros`/`ones(size, dtype, layout, device, pin_memory)`, filled with `FILL`.
pub struct ConvertZerosOnesOp<V, const FILL: i64> {
    converter: Arc<dyn TypeConverter>,
    _view: PhantomData<fn() -> V>,
}

impl<V, const FILL: i64> ConvertZerosOnesOp<V, FILL> {
    pub fn new(converter: Arc<dyn TypeConverter>) -> Self {
        Self {
            converter,
            _view: PhantomData,
        }
    }
}

impl<V, const FILL: i64> OpRewritePattern<V> for ConvertZerosOnesOp<V, FILL>
where
    V: Deref<Target = FrontendOpView>,
{
    fn match_and_rewrite(&self, op: V, rewriter: &mut ProgramRewriter) -> RewriteOutcome {
        lower_zeros_ones(&op, rewriter, self.converter.as_ref(), FILL).into()
    }
}

/// `zeros_like`/`ones_like(self, dtype, layout, device, pin_memory, memory_format)`.
pub struct ConvertZerosOnesLikeOp<V, const FILL: i64> {
    converter: Arc<dyn TypeConverter>,
    _view: PhantomData<fn() -> V>,
}

impl<V, const FILL: i64> ConvertZerosOnesLikeOp<V, FILL> {
    pub fn new(converter: Arc<dyn TypeConverter>) -> Self {
        Self {
            converter,
            _view: PhantomData,
        }
    }
}

impl<V, const FILL: i64> OpRewritePattern<V> for ConvertZerosOnesLikeOp<V, FILL>
where
    V: Deref<Target = FrontendOpView>,
{
    fn match_and_rewrite(&self, op: V, rewriter: &mut ProgramRewriter) -> RewriteOutcome {
        lower_zeros_ones_like(&op, rewriter, self.converter.as_ref(), FILL).into()
    }
}

/// Layout must be strided (absent or 0) and pin_memory absent or false.
fn check_fill_attributes(
    rewriter: &ProgramRewriter,
    layout: Option<ValueId>,
    pin_memory: Option<ValueId>,
    result_spec: &TensorSpec,
) -> Result<(), DeclineReason> {
    if !result_spec.dtype.is_numeric() {
        return Err(DeclineReason::UnsupportedType {
            ty: format!("{:?}", result_spec.dtype),
        });
    }
    let layout = layout.ok_or(DeclineReason::MalformedOperands)?;
    if !is_none(rewriter, layout) && constant_int(rewriter, layout) != Some(0) {
        return Err(DeclineReason::UnsupportedAttribute {
            attribute: "layout",
        });
    }
    let pin_memory = pin_memory.ok_or(DeclineReason::MalformedOperands)?;
    if !is_none(rewriter, pin_memory) && constant_bool(rewriter, pin_memory) != Some(false) {
        return Err(DeclineReason::UnsupportedAttribute {
            attribute: "pin_memory",
        });
    }
    Ok(())
}

fn fill_scalar(result_spec: &TensorSpec, fill: i64) -> Result<TensorLiteral, DeclineReason> {
    let spec = TensorSpec::new(result_spec.dtype, Shape::scalar());
    TensorLiteral::splat(spec, Literal::Signed(fill)).ok_or_else(|| DeclineReason::UnsupportedType {
        ty: format!("{:?}", result_spec.dtype),
    })
}

fn lower_zeros_ones(
    op: &FrontendOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
    fill: i64,
) -> LowerResult {
    let result_spec = converted_tensor(converter, &op.result_type)?;
    check_fill_attributes(rewriter, op.operand(2), op.operand(4), &result_spec)?;
    let scalar = fill_scalar(&result_spec, fill)?;

    let list = op.operand(0).ok_or(DeclineReason::MalformedOperands)?;
    let sizes = list_elements(rewriter, list).ok_or(DeclineReason::NonLiteralList)?;
    if sizes.len() != result_spec.rank() {
        return Err(DeclineReason::UnsupportedRank {
            expected: sizes.len(),
            found: result_spec.rank(),
        }
        .into());
    }
    let mut dims = Vec::with_capacity(sizes.len());
    for (axis, size) in sizes.iter().enumerate() {
        let dim = match constant_int(rewriter, *size) {
            Some(extent) if extent >= 0 => Dimension::Static(extent as usize),
            Some(_) => return Err(DeclineReason::UnsupportedAttribute { attribute: "size" }.into()),
            None => result_spec
                .shape
                .dim(axis)
                .cloned()
                .ok_or(DeclineReason::MalformedOperands)?,
        };
        dims.push(dim);
    }

    let mut em = Emitter::new(rewriter, op.root);
    let scalar = em.constant(scalar)?;
    let filled = broadcast_to_shape(&mut em, scalar, &Shape::new(dims))?;
    Ok(em.replace_root(filled)?)
}

fn lower_zeros_ones_like(
    op: &FrontendOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
    fill: i64,
) -> LowerResult {
    let (_, input_spec) = tensor_operand(rewriter, op.operand(0))?;
    let memory_format = op.operand(5).ok_or(DeclineReason::MalformedOperands)?;
    if !is_none(rewriter, memory_format) {
        return Err(DeclineReason::UnsupportedAttribute {
            attribute: "memory_format",
        }
        .into());
    }
    let result_spec = converted_tensor(converter, &op.result_type)?;
    check_fill_attributes(rewriter, op.operand(2), op.operand(4), &result_spec)?;
    let scalar = fill_scalar(&result_spec, fill)?;

    let mut em = Emitter::new(rewriter, op.root);
    let scalar = em.constant(scalar)?;
    let filled = broadcast_to_shape(&mut em, scalar, &input_spec.shape)?;
    Ok(em.replace_root(filled)?)
}

/// `size(self, dim)` to `dim` plus an index cast to the converted integer type.
pub struct ConvertSizeOp {
    converter: Arc<dyn TypeConverter>,
}

impl ConvertSizeOp {
    pub fn new(converter: Arc<dyn TypeConverter>) -> Self {
        Self { converter }
    }
}

impl OpRewritePattern<SizeOpView> for ConvertSizeOp {
    fn match_and_rewrite(&self, op: SizeOpView, rewriter: &mut ProgramRewriter) -> RewriteOutcome {
        lower_size(&op, rewriter, self.converter.as_ref()).into()
    }
}

fn lower_size(
    op: &SizeOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
) -> LowerResult {
    let (input, input_spec) = tensor_operand(rewriter, op.operand(0))?;
    let dim = op.operand(1).ok_or(DeclineReason::MalformedOperands)?;
    let dim = constant_int(rewriter, dim).ok_or(DeclineReason::NonConstantAxis)?;
    let rank = input_spec.rank();
    if dim < 0 || dim >= rank as i64 {
        return Err(DeclineReason::InvalidAxis { dim, rank }.into());
    }
    let dtype = match converter.convert(&op.result_type) {
        Some(ValueType::Scalar(dtype)) if dtype.is_integer() => dtype,
        _ => {
            return Err(DeclineReason::UnsupportedType {
                ty: op.result_type.to_string(),
            }
            .into())
        }
    };

    let mut em = Emitter::new(rewriter, op.root);
    let extent = em.core(
        CoreOp::Dim(DimSpec { axis: dim as usize }),
        &[input],
        ValueType::Scalar(DType::Index),
    )?;
    Ok(em.replace_with(CoreOp::IndexCast(dtype), &[extent], ValueType::Scalar(dtype))?)
}

/// Re-emits a symbolic integer with its name and bounds.
pub struct ConvertSymbolicIntOp {
    converter: Arc<dyn TypeConverter>,
}

impl ConvertSymbolicIntOp {
    pub fn new(converter: Arc<dyn TypeConverter>) -> Self {
        Self { converter }
    }
}

impl OpRewritePattern<SymbolicIntOpView> for ConvertSymbolicIntOp {
    fn match_and_rewrite(
        &self,
        op: SymbolicIntOpView,
        rewriter: &mut ProgramRewriter,
    ) -> RewriteOutcome {
        let Some(result_type) = self.converter.convert(&op.base.result_type) else {
            return RewriteOutcome::Declined(DeclineReason::UnsupportedType {
                ty: op.base.result_type.to_string(),
            });
        };
        let outcome = Emitter::new(rewriter, op.base.root).replace_with(
            CoreOp::SymbolicInt(op.spec),
            &[],
            result_type,
        );
        outcome.map_err(RewriteFailure::from).into()
    }
}

/// Re-emits a dimension binding with the same operands and shape expression.
pub struct ConvertBindSymbolicShapeOp;

impl OpRewritePattern<BindSymbolicShapeOpView> for ConvertBindSymbolicShapeOp {
    fn match_and_rewrite(
        &self,
        op: BindSymbolicShapeOpView,
        rewriter: &mut ProgramRewriter,
    ) -> RewriteOutcome {
        let outcome = Emitter::new(rewriter, op.base.root).replace_with(
            CoreOp::BindSymbolicShape(op.spec),
            &op.base.operands,
            ValueType::None,
        );
        outcome.map_err(RewriteFailure::from).into()
    }
}

/// Materializes a frontend tensor literal as a core constant of the converted type.
pub struct ConvertTensorLiteralOp {
    converter: Arc<dyn TypeConverter>,
}

impl ConvertTensorLiteralOp {
    pub fn new(converter: Arc<dyn TypeConverter>) -> Self {
        Self { converter }
    }
}

impl OpRewritePattern<TensorLiteralOpView> for ConvertTensorLiteralOp {
    fn match_and_rewrite(
        &self,
        op: TensorLiteralOpView,
        rewriter: &mut ProgramRewriter,
    ) -> RewriteOutcome {
        lower_tensor_literal(&op, rewriter, self.converter.as_ref()).into()
    }
}

fn lower_tensor_literal(
    op: &TensorLiteralOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
) -> LowerResult {
    let result_spec = converted_tensor(converter, &op.base.result_type)?;
    let literal = &op.literal;
    let unsupported = || DeclineReason::UnsupportedType {
        ty: ValueType::Tensor(result_spec.clone()).to_string(),
    };

    let converted = if literal.spec == result_spec {
        literal.clone()
    } else if literal.spec.shape == result_spec.shape
        && literal.spec.dtype.is_integer()
        && result_spec.dtype.is_integer()
    {
        // Integers are re-encoded at the converted width with sign extension.
        let values = literal.to_i64_values().ok_or_else(unsupported)?;
        TensorLiteral::from_i64_values(result_spec.clone(), &values).ok_or_else(unsupported)?
    } else {
        return Err(unsupported().into());
    };

    let mut em = Emitter::new(rewriter, op.base.root);
    let constant = em.constant(converted)?;
    Ok(em.replace_root(constant)?)
}
