use std::ops::Deref;

use super::{filters, OperationMatcher, OperationView};
use crate::{
    index::InstId,
    rewriter::ProgramRewriter,
    spec::{
        BindShapeSpec, FrontendOp, Operand, Operation, SymbolicIntSpec, TensorLiteral, ValueId,
        ValueType,
    },
};

/// Snapshot of a frontend instruction: its operands, result and result type.
#[derive(Clone)]
pub struct FrontendOpView {
    pub root: InstId,
    pub operands: Vec<ValueId>,
    pub result: ValueId,
    pub result_type: ValueType,
}

impl FrontendOpView {
    pub fn new(root: InstId, rewriter: &ProgramRewriter) -> Option<Self> {
        if !rewriter.op(root).is_frontend() {
            return None;
        }
        let operands = rewriter
            .operands(root)
            .iter()
            .map(Operand::value)
            .collect();
        let result = rewriter.value_of(root);
        let result_type = rewriter.type_of(result)?.clone();
        Some(Self {
            root,
            operands,
            result,
            result_type,
        })
    }

    pub fn operand(&self, index: usize) -> Option<ValueId> {
        self.operands.get(index).copied()
    }
}

macro_rules! frontend_view {
    ($(#[$meta:meta])* $name:ident, $matcher:path) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(pub FrontendOpView);

        impl Deref for $name {
            type Target = FrontendOpView;

            fn deref(&self) -> &FrontendOpView {
                &self.0
            }
        }

        impl OperationView for $name {
            const MATCHER: OperationMatcher = $matcher;

            fn extract(root: InstId, rewriter: &ProgramRewriter) -> Option<Self> {
                if !$matcher(rewriter.op(root)) {
                    return None;
                }
                FrontendOpView::new(root, rewriter).map(Self)
            }
        }
    };
}

frontend_view!(SliceOpView, filters::slice);
frontend_view!(CatOpView, filters::cat);
frontend_view!(GatherOpView, filters::gather);
frontend_view!(IndexSelectOpView, filters::index_select);
frontend_view!(
    /// Advanced indexing with a list of index tensors.
    IndexOpView,
    filters::index
);
frontend_view!(BroadcastToOpView, filters::broadcast_to);
frontend_view!(ExpandOpView, filters::expand);
frontend_view!(ZerosOpView, filters::zeros);
frontend_view!(OnesOpView, filters::ones);
frontend_view!(ZerosLikeOpView, filters::zeros_like);
frontend_view!(OnesLikeOpView, filters::ones_like);
frontend_view!(SizeOpView, filters::size);

#[derive(Clone)]
pub struct TensorLiteralOpView {
    pub base: FrontendOpView,
    pub literal: TensorLiteral,
}

impl OperationView for TensorLiteralOpView {
    const MATCHER: OperationMatcher = filters::tensor_literal;

    fn extract(root: InstId, rewriter: &ProgramRewriter) -> Option<Self> {
        match rewriter.op(root) {
            Operation::Frontend(FrontendOp::TensorLiteral(literal)) => Some(Self {
                literal: literal.clone(),
                base: FrontendOpView::new(root, rewriter)?,
            }),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct SymbolicIntOpView {
    pub base: FrontendOpView,
    pub spec: SymbolicIntSpec,
}

impl OperationView for SymbolicIntOpView {
    const MATCHER: OperationMatcher = filters::symbolic_int;

    fn extract(root: InstId, rewriter: &ProgramRewriter) -> Option<Self> {
        match rewriter.op(root) {
            Operation::Frontend(FrontendOp::SymbolicInt(spec)) => Some(Self {
                spec: spec.clone(),
                base: FrontendOpView::new(root, rewriter)?,
            }),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct BindSymbolicShapeOpView {
    pub base: FrontendOpView,
    pub spec: BindShapeSpec,
}

impl OperationView for BindSymbolicShapeOpView {
    const MATCHER: OperationMatcher = filters::bind_symbolic_shape;

    fn extract(root: InstId, rewriter: &ProgramRewriter) -> Option<Self> {
        match rewriter.op(root) {
            Operation::Frontend(FrontendOp::BindSymbolicShape(spec)) => Some(Self {
                spec: spec.clone(),
                base: FrontendOpView::new(root, rewriter)?,
            }),
            _ => None,
        }
    }
}
