use crate::{
    conversion::{ConversionError, RewriteOutcome},
    driver::{apply_patterns_and_fold_greedily, GreedyConfig},
    index::InstId,
    pattern::{OpRewritePattern, PatternSet},
    rewriter::ProgramRewriter,
    spec::Function,
};

use super::{FunctionPass, PassResult};

/// A frontend instruction whose result is never read and is not returned.
///
/// Dimension bindings never match: they carry shape facts for later stages.
#[derive(Debug, Clone, Copy)]
pub struct DeadFrontendOp {
    pub root: InstId,
}

impl DeadFrontendOp {
    pub fn extract(root: InstId, rewriter: &ProgramRewriter) -> Option<Self> {
        let op = rewriter.op(root);
        if !op.is_frontend() || op.is_shape_binding() {
            return None;
        }
        let result = rewriter.value_of(root);
        if !rewriter.users_of(result).is_empty() || rewriter.is_function_result(result) {
            return None;
        }
        Some(Self { root })
    }
}

/// Erases a [`DeadFrontendOp`].
pub struct RemoveUnusedFrontendOp;

impl OpRewritePattern<DeadFrontendOp> for RemoveUnusedFrontendOp {
    fn match_and_rewrite(
        &self,
        dead: DeadFrontendOp,
        rewriter: &mut ProgramRewriter,
    ) -> RewriteOutcome {
        match rewriter.erase_inst(dead.root) {
            Ok(()) => RewriteOutcome::Rewritten(Vec::new()),
            Err(err) => RewriteOutcome::Fatal(err.into()),
        }
    }
}

/// Sweeps dead frontend instructions to a fixpoint.
pub struct EliminateUnusedFrontendOpsPass {
    config: GreedyConfig,
}

impl EliminateUnusedFrontendOpsPass {
    const NAME: &'static str = "eliminate-unused-frontend-ops";

    pub fn new(config: GreedyConfig) -> Self {
        Self { config }
    }
}

impl Default for EliminateUnusedFrontendOpsPass {
    fn default() -> Self {
        Self::new(GreedyConfig::default())
    }
}

impl FunctionPass for EliminateUnusedFrontendOpsPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, function: &mut Function) -> Result<PassResult, ConversionError> {
        let mut patterns = PatternSet::new();
        patterns.insert_match_any(RemoveUnusedFrontendOp, DeadFrontendOp::extract);
        let frozen = patterns.freeze();
        let stats = apply_patterns_and_fold_greedily(function, &frozen, &self.config)?;
        tracing::debug!(
            pass = Self::NAME,
            erased = stats.applied,
            "unused frontend ops removed"
        );
        Ok(PassResult {
            changed: stats.applied > 0,
            iterations: stats.iterations,
            rewrites_applied: stats.applied,
            erased_insts: stats.applied + stats.dce_removed,
        })
    }
}
