use crate::{
    conversion::{DeclineReason, RewriteFailure, TypeConverter},
    index::InstId,
    rewriter::{ProgramRewriter, RewriteError},
    spec::{
        CastSpec, CoreOp, DType, FrontendOp, Operand, Operation, Signedness, TensorLiteral,
        TensorSpec, ValueId, ValueType,
    },
};

/// Inserts core instructions ahead of a root operation and tracks what it created.
pub(crate) struct Emitter<'r, 'a> {
    rewriter: &'r mut ProgramRewriter<'a>,
    anchor: InstId,
    created: Vec<InstId>,
}

impl<'r, 'a> Emitter<'r, 'a> {
    pub(crate) fn new(rewriter: &'r mut ProgramRewriter<'a>, anchor: InstId) -> Self {
        Self {
            rewriter,
            anchor,
            created: Vec::new(),
        }
    }

    pub(crate) fn tensor_spec(&self, value: ValueId) -> Option<TensorSpec> {
        tensor_spec_of(self.rewriter, value)
    }

    pub(crate) fn core(
        &mut self,
        op: CoreOp,
        inputs: &[ValueId],
        output: ValueType,
    ) -> Result<ValueId, RewriteError> {
        let operands = inputs.iter().copied().map(Operand::Value).collect();
        let (inst, value) =
            self.rewriter
                .insert_before(self.anchor, Operation::Core(op), operands, output)?;
        self.created.push(inst);
        Ok(value)
    }

    pub(crate) fn tensor(
        &mut self,
        op: CoreOp,
        inputs: &[ValueId],
        output: TensorSpec,
    ) -> Result<ValueId, RewriteError> {
        self.core(op, inputs, ValueType::Tensor(output))
    }

    pub(crate) fn constant(&mut self, literal: TensorLiteral) -> Result<ValueId, RewriteError> {
        let (inst, value) = self.rewriter.materialize_constant(self.anchor, literal)?;
        self.created.push(inst);
        Ok(value)
    }

    /// Replaces the anchor with `replacement` and returns the created instructions.
    pub(crate) fn replace_root(self, replacement: ValueId) -> Result<Vec<InstId>, RewriteError> {
        self.rewriter.replace_op(self.anchor, replacement)?;
        Ok(self.created)
    }

    /// Emits the final op and replaces the anchor with its result.
    pub(crate) fn replace_with(
        mut self,
        op: CoreOp,
        inputs: &[ValueId],
        output: ValueType,
    ) -> Result<Vec<InstId>, RewriteError> {
        let value = self.core(op, inputs, output)?;
        self.replace_root(value)
    }
}

/// Emits a `cast` of `value` to `dtype`; identity when the element type already matches.
pub(crate) fn cast_element_type(
    em: &mut Emitter,
    value: ValueId,
    dtype: DType,
    input_signedness: Signedness,
    output_signedness: Signedness,
) -> Result<ValueId, RewriteFailure> {
    let spec = em
        .tensor_spec(value)
        .ok_or(DeclineReason::MalformedOperands)?;
    if spec.dtype == dtype {
        return Ok(value);
    }
    let cast = CastSpec {
        dtype,
        input_signedness,
        output_signedness,
    };
    Ok(em.tensor(CoreOp::Cast(cast), &[value], spec.with_dtype(dtype))?)
}

pub(crate) fn tensor_spec_of(rewriter: &ProgramRewriter, value: ValueId) -> Option<TensorSpec> {
    match rewriter.type_of(value) {
        Some(ValueType::Tensor(spec)) => Some(spec.clone()),
        _ => None,
    }
}

/// Operand that must be a tensor, declining otherwise.
pub(crate) fn tensor_operand(
    rewriter: &ProgramRewriter,
    value: Option<ValueId>,
) -> Result<(ValueId, TensorSpec), DeclineReason> {
    let value = value.ok_or(DeclineReason::MalformedOperands)?;
    let spec = tensor_spec_of(rewriter, value).ok_or(DeclineReason::MalformedOperands)?;
    Ok((value, spec))
}

/// Converts `ty` to a core tensor type, declining when the converter cannot.
pub(crate) fn converted_tensor(
    converter: &dyn TypeConverter,
    ty: &ValueType,
) -> Result<TensorSpec, DeclineReason> {
    converter
        .convert_tensor(ty)
        .ok_or_else(|| DeclineReason::UnsupportedType { ty: ty.to_string() })
}

pub(crate) fn constant_int(rewriter: &ProgramRewriter, value: ValueId) -> Option<i64> {
    match rewriter.defining_op(value)? {
        Operation::Frontend(FrontendOp::ConstantInt(v)) => Some(*v),
        _ => None,
    }
}

pub(crate) fn constant_bool(rewriter: &ProgramRewriter, value: ValueId) -> Option<bool> {
    match rewriter.defining_op(value)? {
        Operation::Frontend(FrontendOp::ConstantBool(v)) => Some(*v),
        _ => None,
    }
}

pub(crate) fn is_none(rewriter: &ProgramRewriter, value: ValueId) -> bool {
    matches!(rewriter.type_of(value), Some(ValueType::None))
}

pub(crate) fn is_optional(rewriter: &ProgramRewriter, value: ValueId) -> bool {
    matches!(rewriter.type_of(value), Some(ValueType::Optional(_)))
}

/// Elements of a literal `ListConstruct`; `None` for any other producer.
pub(crate) fn list_elements(rewriter: &ProgramRewriter, value: ValueId) -> Option<Vec<ValueId>> {
    let inst = rewriter.inst_of(value)?;
    match rewriter.op(inst) {
        Operation::Frontend(FrontendOp::ListConstruct) => Some(
            rewriter
                .operands(inst)
                .iter()
                .map(Operand::value)
                .collect(),
        ),
        _ => None,
    }
}

/// Constant axis operand, normalized against `rank`.
pub(crate) fn constant_axis(
    rewriter: &ProgramRewriter,
    value: Option<ValueId>,
    rank: usize,
) -> Result<usize, DeclineReason> {
    let value = value.ok_or(DeclineReason::MalformedOperands)?;
    let dim = constant_int(rewriter, value).ok_or(DeclineReason::NonConstantAxis)?;
    super::shape_math::normalize_dim(dim, rank)
        .map_err(|_| DeclineReason::InvalidAxis { dim, rank })
}

pub(crate) type LowerResult = Result<Vec<InstId>, RewriteFailure>;
