use anyhow::Result;
use tensor_lower::{
    index::InstId,
    ir_utils::{tensor_spec_static, tensor_type},
    passes::{DeadFrontendOp, EliminateUnusedFrontendOpsPass, FunctionPass},
    rewriter::ProgramRewriter,
    spec::{
        BindShapeSpec, CoreOp, DType, FrontendOp, Function, FunctionBuilder, Literal, Operand,
        Operation, SymbolicIntSpec, TensorLiteral, ValueType,
    },
};

/// A dead `size` chain, a live `size`, and a binding nobody reads.
fn function_with_dead_nodes() -> Function {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[4, 8]));
    let symbol = builder.frontend(
        FrontendOp::SymbolicInt(SymbolicIntSpec {
            name: "s0".into(),
            min: 1,
            max: 16,
        }),
        &[],
        ValueType::Int,
    );
    builder.frontend(
        FrontendOp::BindSymbolicShape(BindShapeSpec {
            expression: "[s0] -> (s0, 8)".into(),
        }),
        &[input, symbol],
        ValueType::None,
    );
    let dead_dim = builder.const_int(1);
    builder.frontend(FrontendOp::Size, &[input, dead_dim], ValueType::Int);
    let live_dim = builder.const_int(0);
    let live = builder.frontend(FrontendOp::Size, &[input, live_dim], ValueType::Int);
    builder.finish("dead_nodes", vec![live])
}

fn mnemonics(function: &Function) -> Vec<&'static str> {
    function.body.iter().map(|inst| inst.op.mnemonic()).collect()
}

#[test]
fn dead_nodes_are_removed_and_bindings_kept() -> Result<()> {
    let mut function = function_with_dead_nodes();
    let pass = EliminateUnusedFrontendOpsPass::default();

    let result = pass.run(&mut function)?;

    assert!(result.changed);
    assert_eq!(result.erased_insts, 2);
    assert_eq!(
        mnemonics(&function),
        vec![
            "frontend.symbolic_int",
            "frontend.bind_symbolic_shape",
            "frontend.constant.int",
            "frontend.size",
        ]
    );
    Ok(())
}

#[test]
fn elimination_is_idempotent() -> Result<()> {
    let mut function = function_with_dead_nodes();
    let pass = EliminateUnusedFrontendOpsPass::default();
    pass.run(&mut function)?;
    let once = function.clone();

    let result = pass.run(&mut function)?;

    assert!(!result.changed);
    assert_eq!(function, once);
    Ok(())
}

#[test]
fn function_results_are_never_erased() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let value = builder.const_int(7);
    let mut function = builder.finish("constant_result", vec![value]);

    let result = EliminateUnusedFrontendOpsPass::default().run(&mut function)?;

    assert!(!result.changed);
    assert_eq!(function.body.len(), 1);
    Ok(())
}

#[test]
fn dead_op_fed_by_core_constant_is_removed() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[4, 8]));
    let literal = TensorLiteral::splat(tensor_spec_static(DType::Si64, &[]), Literal::Signed(0))
        .expect("si64 splat");
    let dim = builder.emit_single(
        Operation::Core(CoreOp::Constant(literal)),
        Vec::new(),
        tensor_type(DType::Si64, &[]),
    );
    builder.emit_single(
        Operation::Frontend(FrontendOp::Size),
        vec![Operand::Value(input), Operand::Value(dim)],
        ValueType::Int,
    );
    let mut function = builder.finish("dead_size", Vec::new());

    let result = EliminateUnusedFrontendOpsPass::default().run(&mut function)?;

    assert!(result.changed);
    assert_eq!(mnemonics(&function), vec!["core.constant"]);
    Ok(())
}

#[test]
fn operands_only_name_values() {
    assert!(serde_json::from_str::<Operand>(r#"{"Literal": null}"#).is_err());
    let operand: Operand = serde_json::from_str(r#"{"Value": 3}"#).expect("value operand");
    assert_eq!(operand.value().0, 3);
}

#[test]
fn only_unread_non_binding_frontend_ops_match() -> Result<()> {
    let mut function = function_with_dead_nodes();
    let rewriter = ProgramRewriter::new(&mut function)?;
    let matched = rewriter
        .insts_in_order()
        .into_iter()
        .filter(|inst| DeadFrontendOp::extract(*inst, &rewriter).is_some())
        .collect::<Vec<_>>();

    // Only the dead `size`; its dim constant is still read by it.
    assert_eq!(matched, vec![InstId(3)]);
    Ok(())
}
