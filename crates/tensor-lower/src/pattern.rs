use crate::{
    conversion::{DeclineReason, RewriteOutcome},
    index::InstId,
    rewriter::ProgramRewriter,
    spec::Operation,
};

/// Predicate used to restrict which operations a pattern should consider.
pub type OperationMatcher = fn(&Operation) -> bool;

pub trait OperationView: Clone {
    const MATCHER: OperationMatcher;
    fn extract(root: InstId, rewriter: &ProgramRewriter) -> Option<Self>;
}

mod views;
pub use views::*;

/// Base trait for rewrite patterns.
pub trait Pattern: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches_operation(&self, op: &Operation) -> bool {
        let _ = op;
        true
    }
    fn benefit(&self) -> u16 {
        1
    }
    fn match_and_rewrite(&self, root: InstId, rewriter: &mut ProgramRewriter) -> RewriteOutcome;
}

/// Typed convenience trait mirroring MLIR's `OpRewritePattern`.
pub trait OpRewritePattern<T> {
    fn benefit(&self) -> u16 {
        1
    }
    fn match_and_rewrite(&self, op: T, rewriter: &mut ProgramRewriter) -> RewriteOutcome;
}

/// Adapter converting a typed pattern into a `Pattern`.
pub struct TypedPattern<P, T> {
    pattern: P,
    matcher: Option<OperationMatcher>,
    extractor: fn(InstId, &ProgramRewriter) -> Option<T>,
}

impl<P, T> TypedPattern<P, T> {
    fn from_parts(
        pattern: P,
        matcher: Option<OperationMatcher>,
        extractor: fn(InstId, &ProgramRewriter) -> Option<T>,
    ) -> Self {
        Self {
            pattern,
            matcher,
            extractor,
        }
    }

    pub fn with_operation_matcher(
        pattern: P,
        matcher: OperationMatcher,
        extractor: fn(InstId, &ProgramRewriter) -> Option<T>,
    ) -> Self {
        Self::from_parts(pattern, Some(matcher), extractor)
    }

    pub fn match_any(pattern: P, extractor: fn(InstId, &ProgramRewriter) -> Option<T>) -> Self {
        Self::from_parts(pattern, None, extractor)
    }
}

impl<P, V> TypedPattern<P, V>
where
    V: OperationView,
{
    pub fn from_view(pattern: P) -> Self {
        Self::with_operation_matcher(pattern, V::MATCHER, V::extract)
    }
}

impl<P, T> Pattern for TypedPattern<P, T>
where
    P: OpRewritePattern<T> + Send + Sync,
    T: Send,
{
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<P>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    fn matches_operation(&self, op: &Operation) -> bool {
        match self.matcher {
            Some(matcher) => matcher(op),
            None => true,
        }
    }

    fn benefit(&self) -> u16 {
        self.pattern.benefit()
    }

    fn match_and_rewrite(&self, root: InstId, rewriter: &mut ProgramRewriter) -> RewriteOutcome {
        let Some(view) = (self.extractor)(root, rewriter) else {
            return RewriteOutcome::Declined(DeclineReason::NotApplicable);
        };
        self.pattern.match_and_rewrite(view, rewriter)
    }
}

/// Mutable set that collects rewrite patterns prior to freezing.
pub struct PatternSet {
    patterns: Vec<Box<dyn Pattern>>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn add<P>(&mut self, pattern: P) -> &mut Self
    where
        P: Pattern + 'static,
    {
        self.patterns.push(Box::new(pattern));
        self
    }

    pub fn add_typed<P, T>(&mut self, pattern: TypedPattern<P, T>) -> &mut Self
    where
        P: OpRewritePattern<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.patterns.push(Box::new(pattern));
        self
    }

    pub fn insert_view<V, P>(&mut self, pattern: P) -> &mut Self
    where
        V: OperationView + Send + 'static,
        P: OpRewritePattern<V> + Send + Sync + 'static,
    {
        self.add_typed(TypedPattern::<P, V>::from_view(pattern))
    }

    pub fn insert_match_any<P, T>(
        &mut self,
        pattern: P,
        extractor: fn(InstId, &ProgramRewriter) -> Option<T>,
    ) -> &mut Self
    where
        P: OpRewritePattern<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.add_typed(TypedPattern::match_any(pattern, extractor))
    }

    pub fn freeze(mut self) -> FrozenPatternSet {
        self.patterns
            .sort_by_key(|pattern| std::cmp::Reverse(pattern.benefit()));
        FrozenPatternSet {
            patterns: self.patterns,
        }
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable collection of rewrite patterns ready for use by the driver.
pub struct FrozenPatternSet {
    patterns: Vec<Box<dyn Pattern>>,
}

impl FrozenPatternSet {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &dyn Pattern)> {
        self.patterns.iter().enumerate().map(|(idx, p)| (idx, &**p))
    }

    pub fn matching<'a>(
        &'a self,
        op: &'a Operation,
    ) -> impl Iterator<Item = (usize, &'a dyn Pattern)> + 'a {
        self.patterns
            .iter()
            .enumerate()
            .filter(move |(_, pattern)| pattern.matches_operation(op))
            .map(|(idx, pattern)| (idx, &**pattern))
    }
}

/// Common operation matchers.
pub mod filters {
    use crate::spec::{FrontendOp, Operation};

    pub const fn any(op: &Operation) -> bool {
        let _ = op;
        true
    }

    pub fn frontend(op: &Operation) -> bool {
        op.is_frontend()
    }

    pub fn tensor_literal(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::TensorLiteral(_)))
    }

    pub fn slice(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Slice))
    }

    pub fn cat(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Cat))
    }

    pub fn gather(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Gather))
    }

    pub fn index_select(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::IndexSelect))
    }

    pub fn index(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Index))
    }

    pub fn broadcast_to(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::BroadcastTo))
    }

    pub fn expand(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Expand))
    }

    pub fn zeros(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Zeros))
    }

    pub fn ones(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Ones))
    }

    pub fn zeros_like(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::ZerosLike))
    }

    pub fn ones_like(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::OnesLike))
    }

    pub fn size(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::Size))
    }

    pub fn symbolic_int(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::SymbolicInt(_)))
    }

    pub fn bind_symbolic_shape(op: &Operation) -> bool {
        matches!(op, Operation::Frontend(FrontendOp::BindSymbolicShape(_)))
    }
}
