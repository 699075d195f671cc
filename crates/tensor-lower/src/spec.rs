use std::{collections::HashMap, fmt, sync::Arc};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use thiserror::Error;

/// Enumerates scalar element types shared by the frontend and core vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum DType {
    I1,
    Si8,
    Ui8,
    Si16,
    Ui16,
    Si32,
    Ui32,
    Si64,
    Ui64,
    Bf16,
    F16,
    F32,
    F64,
    Cf32,
    Cf64,
    /// Target-sized index scalar produced by `dim` queries. Has no storage layout.
    Index,
}

impl DType {
    /// Returns `true` when the dtype is any signed or unsigned integer.
    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(self, DType::Si8 | DType::Si16 | DType::Si32 | DType::Si64)
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, DType::Ui8 | DType::Ui16 | DType::Ui32 | DType::Ui64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Bf16 | DType::F16 | DType::F32 | DType::F64)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::Cf32 | DType::Cf64)
    }

    /// Returns `true` for the integer-or-float family (booleans included) that fill ops accept.
    pub fn is_numeric(self) -> bool {
        self == DType::I1 || self.is_integer() || self.is_float()
    }

    /// Returns the storage bit-width when well-defined for the logical scalar.
    pub fn bitwidth(self) -> Option<usize> {
        match self {
            DType::I1 => Some(1),
            DType::Si8 | DType::Ui8 => Some(8),
            DType::Si16 | DType::Ui16 | DType::Bf16 | DType::F16 => Some(16),
            DType::Si32 | DType::Ui32 | DType::F32 => Some(32),
            DType::Si64 | DType::Ui64 | DType::F64 | DType::Cf32 => Some(64),
            DType::Cf64 => Some(128),
            DType::Index => None,
        }
    }

    /// Returns the size in bytes of one element in a dense literal.
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            DType::I1 => Some(1),
            DType::Index => None,
            other => other.bitwidth().map(|bits| bits / 8),
        }
    }

    /// Returns the signedness carried by the dtype itself, if any.
    pub fn signedness(self) -> Signedness {
        if self.is_signed_integer() {
            Signedness::Signed
        } else if self.is_unsigned_integer() {
            Signedness::Unsigned
        } else {
            Signedness::Signless
        }
    }
}

/// Interpretation of integer bits across a `cast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signedness {
    Signed,
    Unsigned,
    Signless,
}

/// Names a symbolic dynamic dimension (e.g. `?B`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimSymbol(Arc<str>);

impl DimSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for DimSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DimSymbol::new(name))
    }
}

/// Represents a single axis extent in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

impl Dimension {
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dimension::Static(value) => Some(*value),
            Dimension::Dynamic(_) => None,
        }
    }

    /// Returns `true` only for a statically known unit extent.
    pub fn is_unit(&self) -> bool {
        matches!(self, Dimension::Static(1))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(value) => write!(f, "{value}"),
            Dimension::Dynamic(symbol) => write!(f, "?{}", symbol.as_str()),
        }
    }
}

/// Logical tensor shape as an ordered list of dimensions. The rank is always known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(Dimension::Static).collect::<Vec<_>>())
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> Option<&Dimension> {
        self.dims.get(axis)
    }

    pub fn into_dims(self) -> Vec<Dimension> {
        self.dims
    }

    /// Returns static dimensions when all dims are static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(Dimension::as_static).collect()
    }

    /// Returns element count when all dims are static.
    pub fn element_count(&self) -> Option<usize> {
        let mut count = 1usize;
        for dim in self.static_dims()? {
            count = count.checked_mul(dim)?;
        }
        Some(count)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("[]");
        }
        let dims = self
            .dims
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        f.write_str(&dims.join("x"))
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn element_count(&self) -> Option<usize> {
        self.shape.element_count()
    }

    /// Returns total byte length when shape is static and dtype size is known.
    pub fn byte_len(&self) -> Option<usize> {
        let elem_count = self.element_count()?;
        let elem_size = self.dtype.size_in_bytes()?;
        elem_count.checked_mul(elem_size)
    }

    pub fn with_dtype(&self, dtype: DType) -> Self {
        Self::new(dtype, self.shape.clone())
    }

    pub fn with_shape(&self, shape: Shape) -> Self {
        Self::new(self.dtype, shape)
    }
}

/// Scalar literal used for fill values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    I1(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Literal {
    fn as_i64(self) -> i64 {
        match self {
            Literal::I1(value) => i64::from(value),
            Literal::Signed(value) => value,
            Literal::Unsigned(value) => value as i64,
            Literal::Float(value) => value as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Literal::I1(value) => f64::from(u8::from(value)),
            Literal::Signed(value) => value as f64,
            Literal::Unsigned(value) => value as f64,
            Literal::Float(value) => value,
        }
    }
}

/// Dense literal tensor payload, little-endian element storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLiteral {
    pub spec: TensorSpec,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(spec: TensorSpec, bytes: Arc<[u8]>) -> Self {
        Self { spec, bytes }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Builds a literal where every element equals `value`. Requires a static shape.
    pub fn splat(spec: TensorSpec, value: Literal) -> Option<Self> {
        let count = spec.element_count()?;
        let element = encode_scalar(spec.dtype, value)?;
        let mut bytes = Vec::with_capacity(element.len() * count);
        for _ in 0..count {
            bytes.extend_from_slice(&element);
        }
        Some(Self::new(spec, Arc::from(bytes)))
    }

    /// Encodes integer values (truncating two's complement) into an integer or bool literal.
    pub fn from_i64_values(spec: TensorSpec, values: &[i64]) -> Option<Self> {
        if spec.element_count()? != values.len() {
            return None;
        }
        if spec.dtype != DType::I1 && !spec.dtype.is_integer() {
            return None;
        }
        let mut bytes = Vec::with_capacity(spec.byte_len()?);
        for value in values {
            bytes.extend_from_slice(&encode_scalar(spec.dtype, Literal::Signed(*value))?);
        }
        Some(Self::new(spec, Arc::from(bytes)))
    }

    /// Decodes an integer or bool literal to 64 bits. Integer elements are sign-extended from
    /// their width whatever their signedness (`ui8` 255 reads as -1); bools read as 0 or 1.
    pub fn to_i64_values(&self) -> Option<Vec<i64>> {
        let dtype = self.spec.dtype;
        if dtype != DType::I1 && !dtype.is_integer() {
            return None;
        }
        let width = dtype.size_in_bytes()?;
        if self.bytes.len() % width != 0 {
            return None;
        }
        let values = self
            .bytes
            .chunks_exact(width)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw[..width].copy_from_slice(chunk);
                let unsigned = u64::from_le_bytes(raw);
                if dtype.is_integer() && width < 8 {
                    let shift = 64 - 8 * width as u32;
                    ((unsigned << shift) as i64) >> shift
                } else {
                    unsigned as i64
                }
            })
            .collect();
        Some(values)
    }
}

impl Serialize for TensorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TensorLiteral", 2)?;
        state.serialize_field("spec", &self.spec)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for TensorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorLiteralHelper {
            spec: TensorSpec,
            bytes: Vec<u8>,
        }

        let helper = TensorLiteralHelper::deserialize(deserializer)?;
        Ok(TensorLiteral {
            spec: helper.spec,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}

fn encode_scalar(dtype: DType, value: Literal) -> Option<Vec<u8>> {
    let bytes = match dtype {
        DType::I1 => vec![u8::from(value.as_i64() != 0)],
        DType::Si8 | DType::Ui8 => value.as_i64().to_le_bytes()[..1].to_vec(),
        DType::Si16 | DType::Ui16 => value.as_i64().to_le_bytes()[..2].to_vec(),
        DType::Si32 | DType::Ui32 => value.as_i64().to_le_bytes()[..4].to_vec(),
        DType::Si64 | DType::Ui64 => value.as_i64().to_le_bytes().to_vec(),
        DType::Bf16 => bf16_bits(value.as_f64() as f32).to_le_bytes().to_vec(),
        DType::F16 => f16_bits(value.as_f64() as f32).to_le_bytes().to_vec(),
        DType::F32 => (value.as_f64() as f32).to_le_bytes().to_vec(),
        DType::F64 => value.as_f64().to_le_bytes().to_vec(),
        DType::Cf32 => {
            let mut bytes = (value.as_f64() as f32).to_le_bytes().to_vec();
            bytes.extend_from_slice(&0f32.to_le_bytes());
            bytes
        }
        DType::Cf64 => {
            let mut bytes = value.as_f64().to_le_bytes().to_vec();
            bytes.extend_from_slice(&0f64.to_le_bytes());
            bytes
        }
        DType::Index => return None,
    };
    Some(bytes)
}

// Round-to-nearest-even truncation of the f32 mantissa.
fn bf16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    if value.is_nan() {
        return ((bits >> 16) as u16) | 0x0040;
    }
    let rounding = 0x7fff + ((bits >> 16) & 1);
    (bits.wrapping_add(rounding) >> 16) as u16
}

fn f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        let nan_bit = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan_bit;
    }

    let rebiased = exponent - 127 + 15;
    if rebiased >= 0x1f {
        return sign | 0x7c00;
    }
    if rebiased <= 0 {
        if rebiased < -10 {
            return sign;
        }
        let mantissa = mantissa | 0x0080_0000;
        let shift = (14 - rebiased) as u32;
        let half = mantissa >> shift;
        let round = (mantissa >> (shift - 1)) & 1;
        return sign | (half + round) as u16;
    }

    let half = sign | ((rebiased as u16) << 10) | (mantissa >> 13) as u16;
    let round_bit = 0x0000_1000;
    if mantissa & round_bit != 0 && mantissa & (3 * round_bit - 1) != 0 {
        half + 1
    } else {
        half
    }
}

/// Unique identifier for SSA values in a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Typing information for SSA values.
///
/// `Int`, `Float`, `Bool`, `None`, `List` and `Optional` are the frontend's boxed scalar and
/// container types; `Scalar` is a core builtin scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Tensor(TensorSpec),
    Scalar(DType),
    Int,
    Float,
    Bool,
    None,
    List(Box<ValueType>),
    Optional(Box<ValueType>),
}

impl ValueType {
    pub fn list_of(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn optional(inner: ValueType) -> Self {
        ValueType::Optional(Box::new(inner))
    }

    pub fn as_tensor(&self) -> Option<&TensorSpec> {
        match self {
            ValueType::Tensor(spec) => Some(spec),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor(spec) => write!(f, "tensor<{:?} x {}>", spec.dtype, spec.shape),
            ValueType::Scalar(dtype) => write!(f, "{dtype:?}"),
            ValueType::Int => f.write_str("!int"),
            ValueType::Float => f.write_str("!float"),
            ValueType::Bool => f.write_str("!bool"),
            ValueType::None => f.write_str("!none"),
            ValueType::List(element) => write!(f, "!list<{element}>"),
            ValueType::Optional(inner) => write!(f, "!optional<{inner}>"),
        }
    }
}

/// Operand reference in an instruction. Constants are instructions of their own, so every
/// operand names an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Value(ValueId),
}

impl Operand {
    pub fn value(&self) -> ValueId {
        match self {
            Operand::Value(value) => *value,
        }
    }
}

/// Metadata of a symbolic integer: its name and inclusive value range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolicIntSpec {
    pub name: String,
    pub min: i64,
    pub max: i64,
}

/// Binds tensor dimensions to symbols through an affine shape expression
/// (e.g. `[s0] -> (s0, 3)`). Operands are the tensor followed by the symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindShapeSpec {
    pub expression: String,
}

/// High-level operations. Operand layouts are positional and listed per variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrontendOp {
    /// `() -> Int`
    ConstantInt(i64),
    /// `() -> Float`
    ConstantFloat(f64),
    /// `() -> Bool`
    ConstantBool(bool),
    /// `() -> None`
    ConstantNone,
    /// `(elements...) -> List`
    ListConstruct,
    /// `() -> Tensor`
    TensorLiteral(TensorLiteral),
    /// `(self, dim, start, end, step)`
    Slice,
    /// `(tensors: List, dim)`
    Cat,
    /// `(self, dim, index, sparse_grad)`
    Gather,
    /// `(self, dim, index)`
    IndexSelect,
    /// `(self, indices: List)`
    Index,
    /// `(self, size: List)`
    BroadcastTo,
    /// `(self, size: List, implicit)`
    Expand,
    /// `(size: List, dtype, layout, device, pin_memory)`
    Zeros,
    /// `(size: List, dtype, layout, device, pin_memory)`
    Ones,
    /// `(self, dtype, layout, device, pin_memory, memory_format)`
    ZerosLike,
    /// `(self, dtype, layout, device, pin_memory, memory_format)`
    OnesLike,
    /// `(self, dim) -> Int`
    Size,
    /// `() -> Int`
    SymbolicInt(SymbolicIntSpec),
    /// `(self, symbols...) -> None`
    BindSymbolicShape(BindShapeSpec),
}

/// Attribute payload for the strided core `slice`. Unsliced axes keep their extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSpec {
    pub offsets: Vec<usize>,
    pub sizes: Vec<Dimension>,
    pub strides: Vec<i64>,
}

/// Attribute payload for `concat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatSpec {
    pub axis: usize,
}

/// Attribute payload for single-axis `gather`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherSpec {
    pub axis: usize,
}

/// Broadcasts unit `axes` of the operand to `sizes` (one entry per axis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSpec {
    pub axes: Vec<usize>,
    pub sizes: Vec<Dimension>,
}

/// Inserts unit dimensions at `axes`, given as positions in the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandDimsSpec {
    pub axes: Vec<usize>,
}

/// Attribute payload for `cast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastSpec {
    pub dtype: DType,
    pub input_signedness: Signedness,
    pub output_signedness: Signedness,
}

/// Reads the extent of `axis` as an index scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimSpec {
    pub axis: usize,
}

/// Explicit, fixed-rank operations the lowering targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoreOp {
    Constant(TensorLiteral),
    /// `(input)`
    Slice(SliceSpec),
    /// `(inputs...)`
    Concat(ConcatSpec),
    /// `(input, indices)`
    Gather(GatherSpec),
    /// `(input, coordinates)`; the last coordinate axis enumerates leading input axes.
    GatherNd,
    /// `(input)`
    Broadcast(BroadcastSpec),
    /// `(input)`
    ExpandDims(ExpandDimsSpec),
    /// `(input)`
    Cast(CastSpec),
    /// `(input) -> Scalar(Index)`
    Dim(DimSpec),
    /// `(index) -> Scalar(dtype)`
    IndexCast(DType),
    /// `() -> Scalar`
    SymbolicInt(SymbolicIntSpec),
    /// `(tensor, symbols...) -> None`
    BindSymbolicShape(BindShapeSpec),
}

/// Vocabulary an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vocabulary {
    Frontend,
    Core,
}

/// Declarative form of an operation in either vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Frontend(FrontendOp),
    Core(CoreOp),
}

impl Operation {
    pub fn vocabulary(&self) -> Vocabulary {
        match self {
            Operation::Frontend(_) => Vocabulary::Frontend,
            Operation::Core(_) => Vocabulary::Core,
        }
    }

    pub fn is_frontend(&self) -> bool {
        self.vocabulary() == Vocabulary::Frontend
    }

    /// Dimension-binding annotations carry shape facts even without uses.
    pub fn is_shape_binding(&self) -> bool {
        matches!(
            self,
            Operation::Frontend(FrontendOp::BindSymbolicShape(_))
                | Operation::Core(CoreOp::BindSymbolicShape(_))
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Operation::Frontend(op) => match op {
                FrontendOp::ConstantInt(_) => "frontend.constant.int",
                FrontendOp::ConstantFloat(_) => "frontend.constant.float",
                FrontendOp::ConstantBool(_) => "frontend.constant.bool",
                FrontendOp::ConstantNone => "frontend.constant.none",
                FrontendOp::ListConstruct => "frontend.list_construct",
                FrontendOp::TensorLiteral(_) => "frontend.tensor_literal",
                FrontendOp::Slice => "frontend.slice",
                FrontendOp::Cat => "frontend.cat",
                FrontendOp::Gather => "frontend.gather",
                FrontendOp::IndexSelect => "frontend.index_select",
                FrontendOp::Index => "frontend.index",
                FrontendOp::BroadcastTo => "frontend.broadcast_to",
                FrontendOp::Expand => "frontend.expand",
                FrontendOp::Zeros => "frontend.zeros",
                FrontendOp::Ones => "frontend.ones",
                FrontendOp::ZerosLike => "frontend.zeros_like",
                FrontendOp::OnesLike => "frontend.ones_like",
                FrontendOp::Size => "frontend.size",
                FrontendOp::SymbolicInt(_) => "frontend.symbolic_int",
                FrontendOp::BindSymbolicShape(_) => "frontend.bind_symbolic_shape",
            },
            Operation::Core(op) => match op {
                CoreOp::Constant(_) => "core.constant",
                CoreOp::Slice(_) => "core.slice",
                CoreOp::Concat(_) => "core.concat",
                CoreOp::Gather(_) => "core.gather",
                CoreOp::GatherNd => "core.gather_nd",
                CoreOp::Broadcast(_) => "core.broadcast",
                CoreOp::ExpandDims(_) => "core.expand_dims",
                CoreOp::Cast(_) => "core.cast",
                CoreOp::Dim(_) => "core.dim",
                CoreOp::IndexCast(_) => "core.index_cast",
                CoreOp::SymbolicInt(_) => "core.symbolic_int",
                CoreOp::BindSymbolicShape(_) => "core.bind_symbolic_shape",
            },
        }
    }

    fn attributes(&self) -> Option<String> {
        let attrs = match self {
            Operation::Frontend(op) => match op {
                FrontendOp::ConstantInt(value) => value.to_string(),
                FrontendOp::ConstantFloat(value) => value.to_string(),
                FrontendOp::ConstantBool(value) => value.to_string(),
                FrontendOp::TensorLiteral(literal) => format!("{} bytes", literal.byte_len()),
                FrontendOp::SymbolicInt(spec) => format!("{spec:?}"),
                FrontendOp::BindSymbolicShape(spec) => format!("{spec:?}"),
                _ => return None,
            },
            Operation::Core(op) => match op {
                CoreOp::Constant(literal) => format!("{} bytes", literal.byte_len()),
                CoreOp::Slice(spec) => format!("{spec:?}"),
                CoreOp::Concat(spec) => format!("{spec:?}"),
                CoreOp::Gather(spec) => format!("{spec:?}"),
                CoreOp::Broadcast(spec) => format!("{spec:?}"),
                CoreOp::ExpandDims(spec) => format!("{spec:?}"),
                CoreOp::Cast(spec) => format!("{spec:?}"),
                CoreOp::Dim(spec) => format!("{spec:?}"),
                CoreOp::IndexCast(dtype) => format!("{dtype:?}"),
                CoreOp::SymbolicInt(spec) => format!("{spec:?}"),
                CoreOp::BindSymbolicShape(spec) => format!("{spec:?}"),
                CoreOp::GatherNd => return None,
            },
        };
        Some(attrs)
    }
}

/// Single SSA instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: ValueId,
    pub op: Operation,
    pub operands: Vec<Operand>,
    pub output: ValueType,
}

/// A function body in SSA order: every operand is defined by a parameter or an earlier instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<ValueType>,
    pub parameter_ids: Vec<ValueId>,
    pub results: Vec<ValueType>,
    pub body: Vec<Instruction>,
    pub result_ids: Vec<ValueId>,
}

#[derive(Debug, Error)]
pub enum FunctionSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Function {
    pub fn to_json_string(&self) -> Result<String, FunctionSerdeError> {
        serde_json::to_string_pretty(self).map_err(FunctionSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, FunctionSerdeError> {
        serde_json::from_str(src).map_err(FunctionSerdeError::from)
    }

    /// Returns the instruction defining `value`, if any.
    pub fn defining_instruction(&self, value: ValueId) -> Option<&Instruction> {
        self.body.iter().find(|inst| inst.id == value)
    }

    /// Counts instructions whose operation satisfies `predicate`.
    pub fn count_ops(&self, predicate: impl Fn(&Operation) -> bool) -> usize {
        self.body.iter().filter(|inst| predicate(&inst.op)).count()
    }

    pub fn to_text(&self) -> String {
        format!("{self}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(f, 0, &format!("func @{} {{", self.name))?;
        if !self.parameter_ids.is_empty() {
            write_line(f, 1, "params:")?;
            for (value_id, value_type) in self.parameter_ids.iter().zip(self.parameters.iter()) {
                write_line(f, 2, &format!("%{} : {}", value_id.0, value_type))?;
            }
        }
        if !self.body.is_empty() {
            write_line(f, 1, "body:")?;
            for instruction in &self.body {
                fmt_instruction(instruction, 2, f)?;
            }
        }
        if !self.result_ids.is_empty() {
            write_line(f, 1, "results:")?;
            for (value_id, value_type) in self.result_ids.iter().zip(self.results.iter()) {
                write_line(f, 2, &format!("%{} : {}", value_id.0, value_type))?;
            }
        }
        write_line(f, 0, "}")
    }
}

fn fmt_instruction(
    instruction: &Instruction,
    indent: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let operands = instruction
        .operands
        .iter()
        .map(format_operand)
        .collect::<Vec<_>>()
        .join(", ");
    let attrs = instruction
        .op
        .attributes()
        .map(|attrs| format!(" {{{attrs}}}"))
        .unwrap_or_default();
    let line = format!(
        "%{} = {}{}({}) -> {}",
        instruction.id.0,
        instruction.op.mnemonic(),
        attrs,
        operands,
        instruction.output
    );
    write_line(f, indent, &line)
}

fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::Value(id) => format!("%{}", id.0),
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}

/// Lightweight builder for constructing functions programmatically.
#[derive(Default)]
pub struct FunctionBuilder {
    next_value_id: u32,
    parameters: Vec<(ValueId, ValueType)>,
    instructions: Vec<Instruction>,
    value_types: HashMap<ValueId, ValueType>,
}

impl FunctionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, ty: ValueType) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        self.value_types.insert(id, ty.clone());
        self.parameters.push((id, ty));
        id
    }

    pub fn emit_single(
        &mut self,
        op: Operation,
        operands: Vec<Operand>,
        output: ValueType,
    ) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        self.value_types.insert(id, output.clone());
        self.instructions.push(Instruction {
            id,
            op,
            operands,
            output,
        });
        id
    }

    /// Emits a frontend op over the given SSA values.
    pub fn frontend(&mut self, op: FrontendOp, operands: &[ValueId], output: ValueType) -> ValueId {
        let operands = operands.iter().copied().map(Operand::Value).collect();
        self.emit_single(Operation::Frontend(op), operands, output)
    }

    pub fn const_int(&mut self, value: i64) -> ValueId {
        self.frontend(FrontendOp::ConstantInt(value), &[], ValueType::Int)
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.frontend(FrontendOp::ConstantBool(value), &[], ValueType::Bool)
    }

    pub fn const_none(&mut self) -> ValueId {
        self.frontend(FrontendOp::ConstantNone, &[], ValueType::None)
    }

    pub fn list(&mut self, elements: &[ValueId], element_type: ValueType) -> ValueId {
        self.frontend(
            FrontendOp::ListConstruct,
            elements,
            ValueType::list_of(element_type),
        )
    }

    /// Emits `ListConstruct` over fresh int constants.
    pub fn int_list(&mut self, values: &[i64]) -> ValueId {
        let elements = values
            .iter()
            .map(|value| self.const_int(*value))
            .collect::<Vec<_>>();
        self.list(&elements, ValueType::Int)
    }

    pub fn value_type(&self, id: ValueId) -> Option<&ValueType> {
        self.value_types.get(&id)
    }

    pub fn finish(self, name: impl Into<String>, result_ids: Vec<ValueId>) -> Function {
        let mut results = Vec::with_capacity(result_ids.len());
        for id in &result_ids {
            let ty = self
                .value_types
                .get(id)
                .expect("result value id must have a recorded type")
                .clone();
            results.push(ty);
        }
        let (parameter_ids, parameters): (Vec<_>, Vec<_>) = self.parameters.into_iter().unzip();
        Function {
            name: name.into(),
            parameters,
            parameter_ids,
            results,
            body: self.instructions,
            result_ids,
        }
    }
}
