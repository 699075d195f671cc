//! Small constructors for types and functions, shared by callers and tests.

use crate::spec::{
    DType, DimSymbol, Dimension, FunctionBuilder, Shape, TensorSpec, ValueId, ValueType,
};

/// Builds a static shape from explicit dimensions.
pub fn shape_static(dims: &[usize]) -> Shape {
    Shape::from_static(dims)
}

/// Builds a mixed shape; `None` entries become symbols named `s{axis}`.
pub fn shape_mixed(dims: &[Option<usize>]) -> Shape {
    Shape::new(
        dims.iter()
            .enumerate()
            .map(|(idx, dim)| match dim {
                Some(value) => Dimension::Static(*value),
                None => Dimension::Dynamic(DimSymbol::new(format!("s{idx}"))),
            })
            .collect::<Vec<_>>(),
    )
}

pub fn tensor_spec_static(dtype: DType, dims: &[usize]) -> TensorSpec {
    TensorSpec::new(dtype, shape_static(dims))
}

pub fn tensor_spec_mixed(dtype: DType, dims: &[Option<usize>]) -> TensorSpec {
    TensorSpec::new(dtype, shape_mixed(dims))
}

/// Tensor value type with static dimensions.
pub fn tensor_type(dtype: DType, dims: &[usize]) -> ValueType {
    ValueType::Tensor(tensor_spec_static(dtype, dims))
}

/// Tensor value type with mixed static/dynamic dimensions.
pub fn tensor_type_mixed(dtype: DType, dims: &[Option<usize>]) -> ValueType {
    ValueType::Tensor(tensor_spec_mixed(dtype, dims))
}

/// Adds one tensor parameter per entry of `specs` and returns their ids.
pub fn tensor_parameters(builder: &mut FunctionBuilder, specs: &[TensorSpec]) -> Vec<ValueId> {
    specs
        .iter()
        .cloned()
        .map(|spec| builder.add_parameter(ValueType::Tensor(spec)))
        .collect()
}
