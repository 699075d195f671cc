//! Frontend-to-core lowering patterns.
//!
//! Each `populate_*` entry point registers a pattern for every frontend kind present in the
//! caller's [`LegalitySet`], marks that kind illegal on the target and declares the core
//! operations the group emits as legal. Kinds outside the set are left untouched.

use std::sync::Arc;

use crate::{
    conversion::{ConversionTarget, CoreOpKind, LegalitySet, OperationKind, TypeConverter},
    pattern::{
        BindSymbolicShapeOpView, BroadcastToOpView, CatOpView, ExpandOpView, GatherOpView,
        IndexOpView, IndexSelectOpView, OnesLikeOpView, OnesOpView, OpRewritePattern,
        OperationView, PatternSet, SizeOpView, SliceOpView, SymbolicIntOpView,
        TensorLiteralOpView, ZerosLikeOpView, ZerosOpView,
    },
};

/// Declares a pattern struct holding a type converter that forwards to `$lower`.
macro_rules! converting_pattern {
    ($name:ident, $view:ty, $lower:ident) => {
        pub struct $name {
            converter: ::std::sync::Arc<dyn $crate::conversion::TypeConverter>,
        }

        impl $name {
            pub fn new(converter: ::std::sync::Arc<dyn $crate::conversion::TypeConverter>) -> Self {
                Self { converter }
            }
        }

        impl $crate::pattern::OpRewritePattern<$view> for $name {
            fn match_and_rewrite(
                &self,
                op: $view,
                rewriter: &mut $crate::rewriter::ProgramRewriter,
            ) -> $crate::conversion::RewriteOutcome {
                $lower(&op, rewriter, self.converter.as_ref()).into()
            }
        }
    };
}

mod broadcast;
mod data_movement;
mod misc;
mod shape_math;
mod slicing;
mod utils;

pub use broadcast::{
    common_broadcast_shape, expand_dims_shape, expand_like_pytorch, rank_extension_axes,
    ExpandPlan, RankBias, TargetDim,
};
pub use data_movement::{ConvertCatOp, ConvertGatherOp, ConvertIndexSelectOp, ConvertIndexTensorOp};
pub use misc::{
    ConvertBindSymbolicShapeOp, ConvertBroadcastLikeOp, ConvertSizeOp, ConvertSymbolicIntOp,
    ConvertTensorLiteralOp, ConvertZerosOnesLikeOp, ConvertZerosOnesOp,
};
pub use shape_math::{compute_slice_bounds, normalize_dim, ShapeError, SliceBounds};
pub use slicing::ConvertSliceOp;

/// Registers `pattern` and marks `kind` illegal, but only when `legality` allows `kind`.
pub fn add_pattern_if_op_in_set<V, P>(
    kind: OperationKind,
    pattern: P,
    patterns: &mut PatternSet,
    target: &mut ConversionTarget,
    legality: &LegalitySet,
) where
    V: OperationView + Send + 'static,
    P: OpRewritePattern<V> + Send + Sync + 'static,
{
    if !legality.contains(kind) {
        return;
    }
    target.add_illegal_op(kind);
    patterns.insert_view::<V, P>(pattern);
}

/// `slice`, `broadcast_to` and `expand`.
pub fn populate_shape_patterns_and_legality(
    type_converter: &Arc<dyn TypeConverter>,
    patterns: &mut PatternSet,
    target: &mut ConversionTarget,
    legality: &LegalitySet,
) {
    target.add_legal_ops([
        CoreOpKind::Slice,
        CoreOpKind::ExpandDims,
        CoreOpKind::Broadcast,
    ]);
    add_pattern_if_op_in_set::<SliceOpView, _>(
        OperationKind::Slice,
        ConvertSliceOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<BroadcastToOpView, _>(
        OperationKind::BroadcastTo,
        ConvertBroadcastLikeOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<ExpandOpView, _>(
        OperationKind::Expand,
        ConvertBroadcastLikeOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
}

/// `cat`, `gather`, `index_select` and multi-tensor `index`.
pub fn populate_data_movement_patterns_and_legality(
    type_converter: &Arc<dyn TypeConverter>,
    patterns: &mut PatternSet,
    target: &mut ConversionTarget,
    legality: &LegalitySet,
) {
    target.add_legal_ops([
        CoreOpKind::Concat,
        CoreOpKind::Cast,
        CoreOpKind::Gather,
        CoreOpKind::GatherNd,
        CoreOpKind::ExpandDims,
        CoreOpKind::Broadcast,
    ]);
    add_pattern_if_op_in_set::<CatOpView, _>(
        OperationKind::Cat,
        ConvertCatOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<GatherOpView, _>(
        OperationKind::Gather,
        ConvertGatherOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<IndexSelectOpView, _>(
        OperationKind::IndexSelect,
        ConvertIndexSelectOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<IndexOpView, _>(
        OperationKind::Index,
        ConvertIndexTensorOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
}

/// Tensor literals, fills, `size` and symbolic shape bookkeeping.
pub fn populate_misc_patterns_and_legality(
    type_converter: &Arc<dyn TypeConverter>,
    patterns: &mut PatternSet,
    target: &mut ConversionTarget,
    legality: &LegalitySet,
) {
    target.add_legal_ops([
        CoreOpKind::Constant,
        CoreOpKind::ExpandDims,
        CoreOpKind::Broadcast,
        CoreOpKind::Dim,
        CoreOpKind::IndexCast,
        CoreOpKind::SymbolicInt,
        CoreOpKind::BindSymbolicShape,
    ]);
    add_pattern_if_op_in_set::<TensorLiteralOpView, _>(
        OperationKind::TensorLiteral,
        ConvertTensorLiteralOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<SizeOpView, _>(
        OperationKind::Size,
        ConvertSizeOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<ZerosOpView, _>(
        OperationKind::Zeros,
        ConvertZerosOnesOp::<_, 0>::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<OnesOpView, _>(
        OperationKind::Ones,
        ConvertZerosOnesOp::<_, 1>::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<ZerosLikeOpView, _>(
        OperationKind::ZerosLike,
        ConvertZerosOnesLikeOp::<_, 0>::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<OnesLikeOpView, _>(
        OperationKind::OnesLike,
        ConvertZerosOnesLikeOp::<_, 1>::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<SymbolicIntOpView, _>(
        OperationKind::SymbolicInt,
        ConvertSymbolicIntOp::new(type_converter.clone()),
        patterns,
        target,
        legality,
    );
    add_pattern_if_op_in_set::<BindSymbolicShapeOpView, _>(
        OperationKind::BindSymbolicShape,
        ConvertBindSymbolicShapeOp,
        patterns,
        target,
        legality,
    );
}

/// Every lowering group at once.
pub fn populate_all_patterns_and_legality(
    type_converter: &Arc<dyn TypeConverter>,
    patterns: &mut PatternSet,
    target: &mut ConversionTarget,
    legality: &LegalitySet,
) {
    populate_shape_patterns_and_legality(type_converter, patterns, target, legality);
    populate_data_movement_patterns_and_legality(type_converter, patterns, target, legality);
    populate_misc_patterns_and_legality(type_converter, patterns, target, legality);
}
