use crate::spec::{DType, TensorSpec, ValueType};

/// Maps frontend value types onto their core counterparts.
///
/// Returning `None` means the type has no core representation; lowerers decline in that case.
pub trait TypeConverter: Send + Sync {
    fn convert(&self, ty: &ValueType) -> Option<ValueType>;

    /// Converts `ty` and requires the result to be a tensor.
    fn convert_tensor(&self, ty: &ValueType) -> Option<TensorSpec> {
        match self.convert(ty)? {
            ValueType::Tensor(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Tensors keep their type; boxed scalars become core builtin scalars.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTypeConverter;

impl TypeConverter for BuiltinTypeConverter {
    fn convert(&self, ty: &ValueType) -> Option<ValueType> {
        match ty {
            ValueType::Tensor(_) | ValueType::Scalar(_) => Some(ty.clone()),
            ValueType::Int => Some(ValueType::Scalar(DType::Si64)),
            ValueType::Float => Some(ValueType::Scalar(DType::F64)),
            ValueType::Bool => Some(ValueType::Scalar(DType::I1)),
            ValueType::None | ValueType::List(_) | ValueType::Optional(_) => None,
        }
    }
}
