use crate::{
    conversion::{DeclineReason, TypeConverter},
    pattern::{CatOpView, GatherOpView, IndexOpView, IndexSelectOpView},
    rewriter::ProgramRewriter,
    spec::{
        ConcatSpec, CoreOp, DType, Dimension, GatherSpec, Shape, Signedness, TensorSpec, ValueId,
        ValueType,
    },
};

use super::{
    broadcast::{broadcast_except_dims, broadcast_many_to_common_shape, expand_dims},
    utils::{
        cast_element_type, constant_axis, constant_bool, converted_tensor, list_elements,
        tensor_operand, Emitter, LowerResult,
    },
};

converting_pattern!(ConvertCatOp, CatOpView, lower_cat);
converting_pattern!(ConvertGatherOp, GatherOpView, lower_gather);
converting_pattern!(ConvertIndexSelectOp, IndexSelectOpView, lower_index_select);
converting_pattern!(ConvertIndexTensorOp, IndexOpView, lower_index_tensor);

fn lower_cat(op: &CatOpView, rewriter: &mut ProgramRewriter, converter: &dyn TypeConverter) -> LowerResult {
    let list = op.operand(0).ok_or(DeclineReason::MalformedOperands)?;
    let elements = list_elements(rewriter, list).ok_or(DeclineReason::NonLiteralList)?;
    let result_spec = converted_tensor(converter, &op.result_type)?;
    let rank = result_spec.rank();
    let axis = constant_axis(rewriter, op.operand(1), rank)?;

    let mut operands = Vec::with_capacity(elements.len());
    for element in elements {
        let (value, spec) = tensor_operand(rewriter, Some(element))?;
        if spec.rank() != rank {
            return Err(DeclineReason::UnsupportedRank {
                expected: rank,
                found: spec.rank(),
            }
            .into());
        }
        operands.push((value, spec));
    }
    if operands.is_empty() {
        return Err(DeclineReason::MalformedOperands.into());
    }

    // Zero-extent operands contribute nothing along the axis; keep one if all are empty.
    let non_empty = operands
        .iter()
        .filter(|(_, spec)| spec.shape.dim(axis) != Some(&Dimension::Static(0)))
        .cloned()
        .collect::<Vec<_>>();
    let kept = if non_empty.is_empty() {
        operands.truncate(1);
        operands
    } else {
        non_empty
    };

    let mut em = Emitter::new(rewriter, op.root);
    let mut inputs = Vec::with_capacity(kept.len());
    for (value, spec) in kept {
        inputs.push(cast_element_type(
            &mut em,
            value,
            result_spec.dtype,
            spec.dtype.signedness(),
            result_spec.dtype.signedness(),
        )?);
    }
    Ok(em.replace_with(
        CoreOp::Concat(ConcatSpec { axis }),
        &inputs,
        ValueType::Tensor(result_spec),
    )?)
}

fn lower_gather(
    op: &GatherOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
) -> LowerResult {
    let (input, input_spec) = tensor_operand(rewriter, op.operand(0))?;
    let axis = constant_axis(rewriter, op.operand(1), input_spec.rank())?;
    let (index, _) = tensor_operand(rewriter, op.operand(2))?;

    let sparse_grad = op.operand(3).ok_or(DeclineReason::MalformedOperands)?;
    let sparse_grad = constant_bool(rewriter, sparse_grad).ok_or(
        DeclineReason::NonConstantOperand {
            operand: "sparse_grad",
        },
    )?;
    if sparse_grad {
        return Err(DeclineReason::UnsupportedAttribute {
            attribute: "sparse_grad",
        }
        .into());
    }

    let result_spec = converted_tensor(converter, &op.result_type)?;
    Ok(Emitter::new(rewriter, op.root).replace_with(
        CoreOp::Gather(GatherSpec { axis }),
        &[input, index],
        ValueType::Tensor(result_spec),
    )?)
}

fn lower_index_select(
    op: &IndexSelectOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
) -> LowerResult {
    let (input, input_spec) = tensor_operand(rewriter, op.operand(0))?;
    let (index, index_spec) = tensor_operand(rewriter, op.operand(2))?;
    if index_spec.rank() != 1 {
        return Err(DeclineReason::UnsupportedRank {
            expected: 1,
            found: index_spec.rank(),
        }
        .into());
    }
    let result_spec = converted_tensor(converter, &op.result_type)?;
    let rank = input_spec.rank();
    let axis = constant_axis(rewriter, op.operand(1), rank)?;

    // [k] -> [1, .., k, .., 1] with k at `axis`, then match the input on every other axis.
    let mut em = Emitter::new(rewriter, op.root);
    let unit_axes = (0..rank).filter(|candidate| *candidate != axis).collect();
    let index = expand_dims(&mut em, index, unit_axes)?;
    let index = broadcast_except_dims(&mut em, index, &input_spec.shape, &[axis])?;
    Ok(em.replace_with(
        CoreOp::Gather(GatherSpec { axis }),
        &[input, index],
        ValueType::Tensor(result_spec),
    )?)
}

/// Advanced indexing: broadcast the index tensors together, stack them on a new trailing axis
/// and gather with the resulting `[..., K]` coordinates.
fn lower_index_tensor(
    op: &IndexOpView,
    rewriter: &mut ProgramRewriter,
    converter: &dyn TypeConverter,
) -> LowerResult {
    let (input, input_spec) = tensor_operand(rewriter, op.operand(0))?;
    let list = op.operand(1).ok_or(DeclineReason::MalformedOperands)?;
    let indices = list_elements(rewriter, list).ok_or(DeclineReason::NonLiteralList)?;
    if indices.is_empty() {
        return Err(DeclineReason::MalformedOperands.into());
    }
    if indices.len() > input_spec.rank() {
        return Err(DeclineReason::UnsupportedRank {
            expected: input_spec.rank(),
            found: indices.len(),
        }
        .into());
    }
    for index in &indices {
        tensor_operand(rewriter, Some(*index))?;
    }
    let result_spec = converted_tensor(converter, &op.result_type)?;

    let mut em = Emitter::new(rewriter, op.root);
    let broadcasted = broadcast_many_to_common_shape(&mut em, &indices)?;
    let coordinate_dtype = coordinate_dtype(&em, &broadcasted);

    let mut coordinates = Vec::with_capacity(broadcasted.len());
    let mut common: Option<Shape> = None;
    for index in broadcasted {
        let spec = em
            .tensor_spec(index)
            .ok_or(DeclineReason::MalformedOperands)?;
        let index = expand_dims(&mut em, index, vec![spec.rank()])?;
        let index = cast_element_type(
            &mut em,
            index,
            coordinate_dtype,
            spec.dtype.signedness(),
            Signedness::Signless,
        )?;
        common.get_or_insert(spec.shape);
        coordinates.push(index);
    }
    let common = common.ok_or(DeclineReason::MalformedOperands)?;

    let mut coordinate_dims = common.into_dims();
    let concat_axis = coordinate_dims.len();
    coordinate_dims.push(Dimension::Static(coordinates.len()));
    let coordinate_spec = TensorSpec::new(coordinate_dtype, Shape::new(coordinate_dims));
    let coordinates = em.tensor(
        CoreOp::Concat(ConcatSpec { axis: concat_axis }),
        &coordinates,
        coordinate_spec,
    )?;

    Ok(em.replace_with(
        CoreOp::GatherNd,
        &[input, coordinates],
        ValueType::Tensor(result_spec),
    )?)
}

/// 64-bit indices of one dtype are used as they are; anything else is widened to `si64`.
fn coordinate_dtype(em: &Emitter, indices: &[ValueId]) -> DType {
    let mut dtypes = indices
        .iter()
        .map(|index| em.tensor_spec(*index).map(|spec| spec.dtype));
    let Some(first) = dtypes.next().flatten() else {
        return DType::Si64;
    };
    if matches!(first, DType::Si64 | DType::Ui64) && dtypes.all(|dtype| dtype == Some(first)) {
        first
    } else {
        DType::Si64
    }
}
