use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{
    conversion::{
        ConversionDiagnostic, ConversionError, ConversionStage, ConversionTarget, DeclineReason,
        RewriteOutcome,
    },
    index::InstId,
    pattern::FrozenPatternSet,
    rewriter::ProgramRewriter,
    spec::{Function, Operation, ValueId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyConfig {
    pub max_iterations: usize,
    /// Sweep every unused, non-binding instruction after rewriting. Off by default.
    pub enable_dce: bool,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            max_iterations: usize::MAX,
            enable_dce: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GreedyRewriteStats {
    pub iterations: usize,
    pub applied: usize,
    pub declined: usize,
    pub dce_removed: usize,
}

/// Outcome of a partial conversion run.
#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    pub stats: GreedyRewriteStats,
    /// One entry per operation that was still declined when the run finished.
    pub diagnostics: Vec<ConversionDiagnostic>,
}

/// Applies `patterns` to every instruction until no pattern fires.
#[tracing::instrument(skip_all, fields(function = %func.name))]
pub fn apply_patterns_and_fold_greedily(
    func: &mut Function,
    patterns: &FrozenPatternSet,
    cfg: &GreedyConfig,
) -> Result<GreedyRewriteStats, ConversionError> {
    if patterns.is_empty() {
        return Ok(GreedyRewriteStats::default());
    }
    let mut rewriter = ProgramRewriter::new(func)?;
    let mut declined = HashMap::new();
    run_greedy(&mut rewriter, patterns, cfg, None, &mut declined)
}

/// Lowers every operation `target` marks illegal, leaving declined operations in place.
///
/// A fatal outcome aborts the run; rewrites committed before it are kept, the failing
/// operation itself is left untouched.
#[tracing::instrument(skip_all, fields(function = %func.name))]
pub fn apply_partial_conversion(
    func: &mut Function,
    patterns: &FrozenPatternSet,
    target: &ConversionTarget,
    cfg: &GreedyConfig,
) -> Result<ConversionReport, ConversionError> {
    let function_name = func.name.clone();
    let mut rewriter = ProgramRewriter::new(func)?;
    let mut declined = HashMap::new();
    let stats = run_greedy(&mut rewriter, patterns, cfg, Some(target), &mut declined)?;

    let order = rewriter.insts_in_order();
    let mut diagnostics = Vec::new();
    for (position, inst) in order.iter().enumerate() {
        if let Some((pattern, reason)) = declined.get(inst) {
            diagnostics.push(ConversionDiagnostic::new(
                ConversionStage::Lower,
                Some(function_name.clone()),
                Some(position),
                format!(
                    "{} declined `{}`: {reason}",
                    pattern,
                    rewriter.op(*inst).mnemonic()
                ),
            ));
        }
    }

    tracing::debug!(
        applied = stats.applied,
        declined = diagnostics.len(),
        "partial conversion finished"
    );
    Ok(ConversionReport { stats, diagnostics })
}

fn run_greedy(
    rewriter: &mut ProgramRewriter,
    patterns: &FrozenPatternSet,
    cfg: &GreedyConfig,
    target: Option<&ConversionTarget>,
    declined: &mut HashMap<InstId, (&'static str, DeclineReason)>,
) -> Result<GreedyRewriteStats, ConversionError> {
    let mut worklist = VecDeque::new();
    seed_worklist(rewriter, &mut worklist);

    let mut failure_cache: HashMap<(usize, InstId), u32> = HashMap::new();
    let mut stats = GreedyRewriteStats::default();

    while let Some(inst) = worklist.pop_front() {
        if stats.iterations >= cfg.max_iterations {
            tracing::debug!(limit = cfg.max_iterations, "iteration limit reached");
            break;
        }
        if !rewriter.contains(inst) {
            continue;
        }

        let op_snapshot = rewriter.op(inst).clone();
        if let Some(target) = target {
            if !target.is_illegal(&op_snapshot) {
                continue;
            }
        }
        let version = rewriter.version(inst).unwrap_or(0);
        tracing::trace!(?inst, op = op_snapshot.mnemonic(), "visiting");

        for (idx, pattern) in patterns.matching(&op_snapshot) {
            if failure_cache.get(&(idx, inst)).copied() == Some(version) {
                continue;
            }

            let checkpoint = rewriter.checkpoint();
            match pattern.match_and_rewrite(inst, rewriter) {
                RewriteOutcome::Rewritten(created) => {
                    tracing::debug!(
                        pattern = pattern.name(),
                        op = op_snapshot.mnemonic(),
                        created = created.len(),
                        "rewrote operation"
                    );
                    stats.applied += 1;
                    stats.iterations = stats.iterations.saturating_add(1);
                    declined.remove(&inst);
                    clear_failure_entries(inst, &mut failure_cache);
                    seed_worklist(rewriter, &mut worklist);
                    break;
                }
                RewriteOutcome::Declined(reason) => {
                    rewriter.rollback_to(checkpoint)?;
                    tracing::debug!(
                        pattern = pattern.name(),
                        op = op_snapshot.mnemonic(),
                        %reason,
                        "declined operation"
                    );
                    stats.declined += 1;
                    failure_cache.insert((idx, inst), version);
                    declined.insert(inst, (pattern.name(), reason));
                }
                RewriteOutcome::Fatal(err) => {
                    rewriter.rollback_to(checkpoint)?;
                    tracing::warn!(
                        pattern = pattern.name(),
                        op = op_snapshot.mnemonic(),
                        error = %err,
                        "lowering failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    if cfg.enable_dce {
        stats.dce_removed = run_dce(rewriter)?;
    }

    Ok(stats)
}

fn seed_worklist(rewriter: &ProgramRewriter, worklist: &mut VecDeque<InstId>) {
    worklist.clear();
    for inst in rewriter.insts_in_order() {
        worklist.push_back(inst);
    }
}

fn clear_failure_entries(inst: InstId, cache: &mut HashMap<(usize, InstId), u32>) {
    cache.retain(|(_, cached_inst), _| *cached_inst != inst);
}

fn run_dce(rewriter: &mut ProgramRewriter) -> Result<usize, ConversionError> {
    let mut removed_total = 0;
    loop {
        let mut removed_in_pass = 0;
        for inst in rewriter.insts_in_order().into_iter().rev() {
            if !rewriter.contains(inst) {
                continue;
            }
            if is_pinned(rewriter.op(inst)) {
                continue;
            }
            let value = rewriter.value_of(inst);
            if is_function_result(rewriter, value) {
                continue;
            }
            if rewriter.users_of(value).is_empty() {
                rewriter.erase_inst(inst)?;
                removed_in_pass += 1;
            }
        }
        if removed_in_pass == 0 {
            break;
        }
        removed_total += removed_in_pass;
    }
    Ok(removed_total)
}

fn is_function_result(rewriter: &ProgramRewriter, value: ValueId) -> bool {
    rewriter.is_function_result(value)
}

fn is_pinned(op: &Operation) -> bool {
    op.is_shape_binding()
}
