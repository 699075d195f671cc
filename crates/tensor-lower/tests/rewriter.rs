use tensor_lower::{
    index::InstId,
    ir_utils::{tensor_spec_static, tensor_type},
    rewriter::{ProgramRewriter, RewriteError},
    spec::{
        CoreOp, DType, ExpandDimsSpec, FrontendOp, Function, FunctionBuilder, Literal, Operand,
        Operation, TensorLiteral, ValueType,
    },
};

/// `%1 = broadcast_to(%0, [2, 3])`, returned.
fn broadcast_function() -> Function {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[3]));
    let size = builder.int_list(&[2, 3]);
    let out = builder.frontend(
        FrontendOp::BroadcastTo,
        &[input, size],
        tensor_type(DType::F32, &[2, 3]),
    );
    builder.finish("broadcast", vec![out])
}

#[test]
fn replace_op_redirects_results_and_erases_root() {
    let mut function = broadcast_function();
    let input = function.parameter_ids[0];
    let root = InstId(3);
    let mut rewriter = ProgramRewriter::new(&mut function).expect("build indices");
    assert_eq!(rewriter.op(root), &Operation::Frontend(FrontendOp::BroadcastTo));

    let (expand, expanded) = rewriter
        .insert_before(
            root,
            Operation::Core(CoreOp::ExpandDims(ExpandDimsSpec { axes: vec![0] })),
            vec![Operand::Value(input)],
            tensor_type(DType::F32, &[1, 3]),
        )
        .expect("insert expand_dims");
    assert_eq!(rewriter.users_of(input), &[root, expand]);

    rewriter.replace_op(root, expanded).expect("replace root");
    assert!(!rewriter.contains(root));
    assert!(rewriter.is_function_result(expanded));
    assert_eq!(rewriter.users_of(input), &[expand]);
    assert!(rewriter.verify());
}

#[test]
fn rollback_erases_only_instructions_after_checkpoint() {
    let mut function = broadcast_function();
    let original = function.clone();
    {
        let mut rewriter = ProgramRewriter::new(&mut function).expect("build indices");
        let root = InstId(3);
        let literal =
            TensorLiteral::splat(tensor_spec_static(DType::F32, &[]), Literal::Float(1.5))
                .expect("static literal");

        let checkpoint = rewriter.checkpoint();
        let (first, value) = rewriter
            .materialize_constant(root, literal)
            .expect("materialize constant");
        let (second, _) = rewriter
            .insert_before(
                root,
                Operation::Core(CoreOp::ExpandDims(ExpandDimsSpec { axes: vec![0] })),
                vec![Operand::Value(value)],
                tensor_type(DType::F32, &[1]),
            )
            .expect("insert expand_dims");
        assert_eq!(rewriter.inserted_since(checkpoint), vec![first, second]);

        assert_eq!(rewriter.rollback_to(checkpoint), Ok(2));
        assert!(rewriter.inserted_since(checkpoint).is_empty());
        assert!(rewriter.verify());
    }
    assert_eq!(function, original);
}

#[test]
fn erase_with_live_uses_is_an_error() {
    let mut function = broadcast_function();
    let mut rewriter = ProgramRewriter::new(&mut function).expect("build indices");
    let list = InstId(2);
    let value = rewriter.value_of(list);

    let err = rewriter.erase_inst(list).unwrap_err();
    assert_eq!(err, RewriteError::LiveUses { value, uses: 1 });
    assert!(rewriter.contains(list));
}

#[test]
fn replace_all_uses_bumps_consumer_versions() {
    let mut function = broadcast_function();
    let mut rewriter = ProgramRewriter::new(&mut function).expect("build indices");
    let first = rewriter.value_of(InstId(0));
    let second = rewriter.value_of(InstId(1));
    assert_eq!(rewriter.version(InstId(2)), Some(0));

    rewriter
        .replace_all_uses(first, second)
        .expect("replace uses");
    assert_eq!(rewriter.version(InstId(2)), Some(1));
    assert!(rewriter.users_of(first).is_empty());
    assert_eq!(rewriter.operand_value(InstId(2), 0), Some(second));
    assert_eq!(rewriter.type_of(second), Some(&ValueType::Int));
}

#[test]
fn erasing_a_user_bumps_its_producers() {
    let mut function = broadcast_function();
    let mut rewriter = ProgramRewriter::new(&mut function).expect("build indices");
    let list = InstId(2);
    let root = InstId(3);
    let list_value = rewriter.value_of(list);

    rewriter.erase_inst(root).expect("erase root");

    assert_eq!(rewriter.version(list), Some(1));
    assert_eq!(rewriter.version(InstId(0)), Some(0));
    assert!(rewriter.users_of(list_value).is_empty());
    assert_eq!(rewriter.insts_in_order(), vec![InstId(0), InstId(1), list]);
}
