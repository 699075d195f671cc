//! Function-level passes run around conversion.

mod eliminate_unused;

pub use eliminate_unused::{DeadFrontendOp, EliminateUnusedFrontendOpsPass, RemoveUnusedFrontendOp};

use crate::{conversion::ConversionError, spec::Function};

/// Summary returned by a single pass invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassResult {
    pub changed: bool,
    pub iterations: usize,
    pub rewrites_applied: usize,
    pub erased_insts: usize,
}

/// A transformation over one function.
pub trait FunctionPass: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, function: &mut Function) -> Result<PassResult, ConversionError>;
}
