use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversion::{ConversionDiagnostic, ConversionStage};
use crate::spec::{CoreOp, FrontendOp, Function, Operation};

/// Frontend operation kinds, keyed by the stable names used in legality sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    ConstantInt,
    ConstantFloat,
    ConstantBool,
    ConstantNone,
    ListConstruct,
    TensorLiteral,
    Slice,
    Cat,
    Gather,
    IndexSelect,
    Index,
    BroadcastTo,
    Expand,
    Zeros,
    Ones,
    ZerosLike,
    OnesLike,
    Size,
    SymbolicInt,
    BindSymbolicShape,
}

impl OperationKind {
    pub const ALL: [OperationKind; 20] = [
        OperationKind::ConstantInt,
        OperationKind::ConstantFloat,
        OperationKind::ConstantBool,
        OperationKind::ConstantNone,
        OperationKind::ListConstruct,
        OperationKind::TensorLiteral,
        OperationKind::Slice,
        OperationKind::Cat,
        OperationKind::Gather,
        OperationKind::IndexSelect,
        OperationKind::Index,
        OperationKind::BroadcastTo,
        OperationKind::Expand,
        OperationKind::Zeros,
        OperationKind::Ones,
        OperationKind::ZerosLike,
        OperationKind::OnesLike,
        OperationKind::Size,
        OperationKind::SymbolicInt,
        OperationKind::BindSymbolicShape,
    ];

    /// Returns the kind of a frontend operation; core operations have none.
    pub fn from_op(op: &Operation) -> Option<Self> {
        let Operation::Frontend(op) = op else {
            return None;
        };
        let kind = match op {
            FrontendOp::ConstantInt(_) => OperationKind::ConstantInt,
            FrontendOp::ConstantFloat(_) => OperationKind::ConstantFloat,
            FrontendOp::ConstantBool(_) => OperationKind::ConstantBool,
            FrontendOp::ConstantNone => OperationKind::ConstantNone,
            FrontendOp::ListConstruct => OperationKind::ListConstruct,
            FrontendOp::TensorLiteral(_) => OperationKind::TensorLiteral,
            FrontendOp::Slice => OperationKind::Slice,
            FrontendOp::Cat => OperationKind::Cat,
            FrontendOp::Gather => OperationKind::Gather,
            FrontendOp::IndexSelect => OperationKind::IndexSelect,
            FrontendOp::Index => OperationKind::Index,
            FrontendOp::BroadcastTo => OperationKind::BroadcastTo,
            FrontendOp::Expand => OperationKind::Expand,
            FrontendOp::Zeros => OperationKind::Zeros,
            FrontendOp::Ones => OperationKind::Ones,
            FrontendOp::ZerosLike => OperationKind::ZerosLike,
            FrontendOp::OnesLike => OperationKind::OnesLike,
            FrontendOp::Size => OperationKind::Size,
            FrontendOp::SymbolicInt(_) => OperationKind::SymbolicInt,
            FrontendOp::BindSymbolicShape(_) => OperationKind::BindSymbolicShape,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::ConstantInt => "constant.int",
            OperationKind::ConstantFloat => "constant.float",
            OperationKind::ConstantBool => "constant.bool",
            OperationKind::ConstantNone => "constant.none",
            OperationKind::ListConstruct => "list_construct",
            OperationKind::TensorLiteral => "tensor_literal",
            OperationKind::Slice => "slice",
            OperationKind::Cat => "cat",
            OperationKind::Gather => "gather",
            OperationKind::IndexSelect => "index_select",
            OperationKind::Index => "index",
            OperationKind::BroadcastTo => "broadcast_to",
            OperationKind::Expand => "expand",
            OperationKind::Zeros => "zeros",
            OperationKind::Ones => "ones",
            OperationKind::ZerosLike => "zeros_like",
            OperationKind::OnesLike => "ones_like",
            OperationKind::Size => "size",
            OperationKind::SymbolicInt => "symbolic_int",
            OperationKind::BindSymbolicShape => "bind_symbolic_shape",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = LegalityError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| LegalityError::UnknownOpKind {
                name: name.to_string(),
            })
    }
}

/// Core operation kinds a conversion target can declare legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreOpKind {
    Constant,
    Slice,
    Concat,
    Gather,
    GatherNd,
    Broadcast,
    ExpandDims,
    Cast,
    Dim,
    IndexCast,
    SymbolicInt,
    BindSymbolicShape,
}

impl CoreOpKind {
    pub fn from_op(op: &Operation) -> Option<Self> {
        let Operation::Core(op) = op else {
            return None;
        };
        let kind = match op {
            CoreOp::Constant(_) => CoreOpKind::Constant,
            CoreOp::Slice(_) => CoreOpKind::Slice,
            CoreOp::Concat(_) => CoreOpKind::Concat,
            CoreOp::Gather(_) => CoreOpKind::Gather,
            CoreOp::GatherNd => CoreOpKind::GatherNd,
            CoreOp::Broadcast(_) => CoreOpKind::Broadcast,
            CoreOp::ExpandDims(_) => CoreOpKind::ExpandDims,
            CoreOp::Cast(_) => CoreOpKind::Cast,
            CoreOp::Dim(_) => CoreOpKind::Dim,
            CoreOp::IndexCast(_) => CoreOpKind::IndexCast,
            CoreOp::SymbolicInt(_) => CoreOpKind::SymbolicInt,
            CoreOp::BindSymbolicShape(_) => CoreOpKind::BindSymbolicShape,
        };
        Some(kind)
    }
}

/// Immutable set of frontend kinds a caller allows to be lowered in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LegalitySet {
    kinds: BTreeSet<OperationKind>,
}

impl LegalitySet {
    pub fn from_kinds(kinds: impl IntoIterator<Item = OperationKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Every frontend kind.
    pub fn all() -> Self {
        Self::from_kinds(OperationKind::ALL)
    }

    /// Parses kind names; an unknown name rejects the whole set.
    pub fn from_names<I, S>(names: I) -> Result<Self, LegalityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = names
            .into_iter()
            .map(|name| name.as_ref().parse::<OperationKind>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { kinds })
    }

    /// Loads a set from a JSON array of kind names.
    pub fn from_json_str(src: &str) -> Result<Self, LegalityError> {
        serde_json::from_str(src).map_err(LegalityError::from)
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl TryFrom<Vec<String>> for LegalitySet {
    type Error = LegalityError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_names(names)
    }
}

impl From<LegalitySet> for Vec<String> {
    fn from(set: LegalitySet) -> Self {
        set.iter().map(|kind| kind.name().to_string()).collect()
    }
}

/// Caller-input errors raised while building a legality set.
#[derive(Debug, Error)]
pub enum LegalityError {
    #[error("unknown operation kind `{name}`")]
    UnknownOpKind { name: String },
    #[error("invalid legality set json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which operations must be gone after conversion and which may be produced.
#[derive(Debug, Clone, Default)]
pub struct ConversionTarget {
    legal: HashSet<CoreOpKind>,
    illegal: HashSet<OperationKind>,
}

impl ConversionTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_legal_op(&mut self, kind: CoreOpKind) -> &mut Self {
        self.legal.insert(kind);
        self
    }

    pub fn add_legal_ops(&mut self, kinds: impl IntoIterator<Item = CoreOpKind>) -> &mut Self {
        self.legal.extend(kinds);
        self
    }

    pub fn add_illegal_op(&mut self, kind: OperationKind) -> &mut Self {
        self.illegal.insert(kind);
        self
    }

    pub fn is_illegal_kind(&self, kind: OperationKind) -> bool {
        self.illegal.contains(&kind)
    }

    pub fn is_legal_kind(&self, kind: CoreOpKind) -> bool {
        self.legal.contains(&kind)
    }

    /// Returns `true` when `op` is a frontend operation this target wants converted.
    pub fn is_illegal(&self, op: &Operation) -> bool {
        OperationKind::from_op(op).is_some_and(|kind| self.is_illegal_kind(kind))
    }

    pub fn illegal_kinds(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.illegal.iter().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LegalityReport {
    pub diagnostics: Vec<ConversionDiagnostic>,
}

impl LegalityReport {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Lists operations the target still considers illegal, plus core operations it never declared.
pub fn check_function_legality(
    function: &Function,
    target: &ConversionTarget,
) -> Result<(), LegalityReport> {
    let mut report = LegalityReport::default();

    for (idx, inst) in function.body.iter().enumerate() {
        if let Some(kind) = OperationKind::from_op(&inst.op) {
            if target.is_illegal_kind(kind) {
                report.diagnostics.push(ConversionDiagnostic::new(
                    ConversionStage::Legalize,
                    Some(function.name.clone()),
                    Some(idx),
                    format!("frontend operation `{kind}` was not converted"),
                ));
            }
        }
        if let Some(kind) = CoreOpKind::from_op(&inst.op) {
            if !target.is_legal_kind(kind) {
                report.diagnostics.push(ConversionDiagnostic::new(
                    ConversionStage::Legalize,
                    Some(function.name.clone()),
                    Some(idx),
                    format!("core operation {kind:?} is not legal for this target"),
                ));
            }
        }
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(report)
    }
}
