use std::sync::Arc;

use anyhow::Result;
use tensor_lower::{
    conversion::{
        check_function_legality, BuiltinTypeConverter, ConversionError, ConversionTarget,
        LegalitySet, OperationKind, TypeConverter,
    },
    driver::{apply_partial_conversion, ConversionReport, GreedyConfig},
    ir_utils::{tensor_type, tensor_type_mixed},
    lowering::populate_all_patterns_and_legality,
    pattern::PatternSet,
    spec::{DType, FrontendOp, Function, FunctionBuilder, Operation, ValueType},
};

fn lower_with(
    function: &mut Function,
    legality: &LegalitySet,
) -> Result<(ConversionReport, ConversionTarget), ConversionError> {
    let converter: Arc<dyn TypeConverter> = Arc::new(BuiltinTypeConverter);
    let mut patterns = PatternSet::new();
    let mut target = ConversionTarget::new();
    populate_all_patterns_and_legality(&converter, &mut patterns, &mut target, legality);
    let report = apply_partial_conversion(
        function,
        &patterns.freeze(),
        &target,
        &GreedyConfig::default(),
    )?;
    Ok((report, target))
}

/// `slice(x, 0, 1, None, 1)` followed by `cat([slice, slice], 0)`.
fn slice_then_cat() -> Function {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[4, 2]));
    let dim = builder.const_int(0);
    let start = builder.const_int(1);
    let end = builder.const_none();
    let step = builder.const_int(1);
    let slice = builder.frontend(
        FrontendOp::Slice,
        &[input, dim, start, end, step],
        tensor_type(DType::F32, &[3, 2]),
    );
    let list = builder.list(&[slice, slice], tensor_type(DType::F32, &[3, 2]));
    let cat = builder.frontend(FrontendOp::Cat, &[list, dim], tensor_type(DType::F32, &[6, 2]));
    builder.finish("slice_then_cat", vec![cat])
}

fn is_kind(kind: OperationKind) -> impl Fn(&Operation) -> bool {
    move |op| OperationKind::from_op(op) == Some(kind)
}

#[test]
fn kinds_outside_the_set_are_never_touched() -> Result<()> {
    let mut function = slice_then_cat();
    let legality = LegalitySet::from_kinds([OperationKind::Cat]);

    let (report, target) = lower_with(&mut function, &legality)?;

    assert!(report.diagnostics.is_empty());
    assert_eq!(function.count_ops(is_kind(OperationKind::Cat)), 0);
    assert_eq!(function.count_ops(is_kind(OperationKind::Slice)), 1);
    assert!(!target.is_illegal_kind(OperationKind::Slice));
    assert!(target.is_illegal_kind(OperationKind::Cat));
    Ok(())
}

#[test]
fn empty_set_registers_nothing() -> Result<()> {
    let mut function = slice_then_cat();
    let before = function.clone();

    let (report, target) = lower_with(&mut function, &LegalitySet::default())?;

    assert_eq!(function, before);
    assert_eq!(report.stats.applied, 0);
    assert_eq!(target.illegal_kinds().count(), 0);
    Ok(())
}

#[test]
fn full_set_lowers_every_registered_kind() -> Result<()> {
    let mut function = slice_then_cat();

    let (report, target) = lower_with(&mut function, &LegalitySet::all())?;

    assert_eq!(report.stats.applied, 2);
    assert!(check_function_legality(&function, &target).is_ok());
    Ok(())
}

#[test]
fn declined_operation_is_left_in_place_and_reported() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[4]));
    let step = builder.add_parameter(ValueType::Int);
    let dim = builder.const_int(0);
    let none = builder.const_none();
    let slice = builder.frontend(
        FrontendOp::Slice,
        &[input, dim, none, none, step],
        tensor_type(DType::F32, &[4]),
    );
    let mut function = builder.finish("runtime_step", vec![slice]);
    let before = function.clone();

    let (report, target) = lower_with(&mut function, &LegalitySet::all())?;

    assert_eq!(function, before);
    assert_eq!(report.stats.applied, 0);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].instruction_index, Some(2));
    assert!(report.diagnostics[0].message.contains("step"));

    let legality = check_function_legality(&function, &target).unwrap_err();
    assert_eq!(legality.diagnostics.len(), 1);
    Ok(())
}

#[test]
fn static_index_mismatch_is_fatal_and_leaves_graph_untouched() {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[5, 5]));
    let rows = builder.add_parameter(tensor_type(DType::Si64, &[2]));
    let cols = builder.add_parameter(tensor_type(DType::Si64, &[3]));
    let list = builder.list(&[rows, cols], tensor_type(DType::Si64, &[2]));
    let index = builder.frontend(FrontendOp::Index, &[input, list], tensor_type(DType::F32, &[2]));
    let mut function = builder.finish("bad_index", vec![index]);
    let before = function.clone();

    let err = lower_with(&mut function, &LegalitySet::all()).unwrap_err();

    assert!(matches!(err, ConversionError::BroadcastMismatch(_)));
    assert_eq!(function, before);
}

#[test]
fn dynamic_index_mismatch_is_declined() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[5, 5]));
    let rows = builder.add_parameter(tensor_type_mixed(DType::Si64, &[None]));
    let cols = builder.add_parameter(tensor_type(DType::Si64, &[3]));
    let list = builder.list(&[rows, cols], tensor_type(DType::Si64, &[3]));
    let index = builder.frontend(FrontendOp::Index, &[input, list], tensor_type(DType::F32, &[3]));
    let mut function = builder.finish("dynamic_index", vec![index]);
    let before = function.clone();

    let (report, _) = lower_with(&mut function, &LegalitySet::all())?;

    assert_eq!(function, before);
    assert!(report.diagnostics[0].message.contains("dynamic"));
    Ok(())
}
