//! Frontend-to-core conversion infrastructure.
//!
//! Lowerers report one of three outcomes per attempt. Only `Fatal` aborts a run; a declined
//! operation stays in the graph and shows up in the legality report.

mod legality;
mod type_converter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::{FunctionIndexError, InstId};
use crate::rewriter::RewriteError;

pub use legality::{
    check_function_legality, ConversionTarget, CoreOpKind, LegalityError, LegalityReport,
    LegalitySet, OperationKind,
};
pub use type_converter::{BuiltinTypeConverter, TypeConverter};

/// Errors that abort a conversion run.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Index(#[from] FunctionIndexError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Legality(#[from] LegalityError),
    #[error("incompatible broadcast operands: {0}")]
    BroadcastMismatch(String),
}

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Why a lowerer left an operation untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclineReason {
    #[error("operation does not have the shape this pattern rewrites")]
    NotApplicable,
    #[error("operands do not match the expected layout")]
    MalformedOperands,
    #[error("dimension operand is not a constant integer")]
    NonConstantAxis,
    #[error("dimension {dim} is out of range for rank {rank}")]
    InvalidAxis { dim: i64, rank: usize },
    #[error("`{operand}` is not a compile-time constant")]
    NonConstantOperand { operand: &'static str },
    #[error("`{operand}` has an optional type")]
    OptionalOperand { operand: &'static str },
    #[error("list operand is not a literal list construction")]
    NonLiteralList,
    #[error("unsupported `{attribute}` value")]
    UnsupportedAttribute { attribute: &'static str },
    #[error("expected rank {expected}, found {found}")]
    UnsupportedRank { expected: usize, found: usize },
    #[error("dimension {axis} has no static extent")]
    DynamicShape { axis: usize },
    #[error("type `{ty}` has no core equivalent")]
    UnsupportedType { ty: String },
    #[error("slice step must be non-zero")]
    ZeroStep,
    #[error("broadcast compatibility cannot be proven for dynamic dimensions")]
    UnresolvedBroadcast,
}

/// Result of a single pattern attempt.
#[derive(Debug)]
pub enum RewriteOutcome {
    /// The root was replaced; carries the instructions created by the rewrite.
    Rewritten(Vec<InstId>),
    Declined(DeclineReason),
    Fatal(ConversionError),
}

impl RewriteOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, RewriteOutcome::Rewritten(_))
    }
}

impl From<Result<Vec<InstId>, RewriteFailure>> for RewriteOutcome {
    fn from(result: Result<Vec<InstId>, RewriteFailure>) -> Self {
        match result {
            Ok(created) => RewriteOutcome::Rewritten(created),
            Err(RewriteFailure::Declined(reason)) => RewriteOutcome::Declined(reason),
            Err(RewriteFailure::Fatal(err)) => RewriteOutcome::Fatal(err),
        }
    }
}

/// Early-exit channel for lowerers so `?` can carry either failure kind.
#[derive(Debug)]
pub enum RewriteFailure {
    Declined(DeclineReason),
    Fatal(ConversionError),
}

impl From<DeclineReason> for RewriteFailure {
    fn from(reason: DeclineReason) -> Self {
        RewriteFailure::Declined(reason)
    }
}

impl From<ConversionError> for RewriteFailure {
    fn from(err: ConversionError) -> Self {
        RewriteFailure::Fatal(err)
    }
}

impl From<RewriteError> for RewriteFailure {
    fn from(err: RewriteError) -> Self {
        RewriteFailure::Fatal(ConversionError::Rewrite(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversionStage {
    Lower,
    Eliminate,
    Legalize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionDiagnostic {
    pub stage: ConversionStage,
    pub function: Option<String>,
    pub instruction_index: Option<usize>,
    pub message: String,
}

impl ConversionDiagnostic {
    pub fn new(
        stage: ConversionStage,
        function: Option<String>,
        instruction_index: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            function,
            instruction_index,
            message: message.into(),
        }
    }
}
