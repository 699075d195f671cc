use std::sync::Arc;

use anyhow::Result;
use tensor_lower::{
    conversion::{BuiltinTypeConverter, ConversionTarget, LegalitySet, TypeConverter},
    driver::{apply_partial_conversion, ConversionReport, GreedyConfig},
    ir_utils::{tensor_spec_static, tensor_type},
    lowering::populate_misc_patterns_and_legality,
    pattern::PatternSet,
    spec::{
        BindShapeSpec, BroadcastSpec, CoreOp, DType, DimSpec, Dimension, FrontendOp, Function,
        FunctionBuilder, Instruction, Operand, Operation, SymbolicIntSpec, TensorLiteral,
        ValueType,
    },
};

fn lower(function: &mut Function) -> Result<ConversionReport> {
    let converter: Arc<dyn TypeConverter> = Arc::new(BuiltinTypeConverter);
    let mut patterns = PatternSet::new();
    let mut target = ConversionTarget::new();
    populate_misc_patterns_and_legality(
        &converter,
        &mut patterns,
        &mut target,
        &LegalitySet::all(),
    );
    Ok(apply_partial_conversion(
        function,
        &patterns.freeze(),
        &target,
        &GreedyConfig::default(),
    )?)
}

fn result_inst(function: &Function) -> &Instruction {
    function
        .defining_instruction(function.result_ids[0])
        .expect("result must be defined by an instruction")
}

fn constants(function: &Function) -> Vec<&TensorLiteral> {
    function
        .body
        .iter()
        .filter_map(|inst| match &inst.op {
            Operation::Core(CoreOp::Constant(literal)) => Some(literal),
            _ => None,
        })
        .collect()
}

#[test]
fn zeros_broadcasts_a_scalar_constant() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let size = builder.int_list(&[2, 3]);
    let dtype = builder.const_int(6);
    let layout = builder.const_none();
    let device = builder.const_none();
    let pin_memory = builder.const_bool(false);
    let zeros = builder.frontend(
        FrontendOp::Zeros,
        &[size, dtype, layout, device, pin_memory],
        tensor_type(DType::F32, &[2, 3]),
    );
    let mut function = builder.finish("zeros", vec![zeros]);

    let report = lower(&mut function)?;
    assert!(report.diagnostics.is_empty());

    let literals = constants(&function);
    assert_eq!(literals.len(), 1);
    assert_eq!(literals[0].spec, tensor_spec_static(DType::F32, &[]));
    assert_eq!(literals[0].bytes.as_ref(), &0f32.to_le_bytes());

    let broadcast = result_inst(&function);
    assert_eq!(
        broadcast.op,
        Operation::Core(CoreOp::Broadcast(BroadcastSpec {
            axes: vec![0, 1],
            sizes: vec![Dimension::Static(2), Dimension::Static(3)],
        }))
    );
    assert_eq!(broadcast.output, tensor_type(DType::F32, &[2, 3]));
    Ok(())
}

#[test]
fn ones_like_follows_input_shape() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::Si32, &[4]));
    let none = builder.const_none();
    let ones = builder.frontend(
        FrontendOp::OnesLike,
        &[input, none, none, none, none, none],
        tensor_type(DType::Si32, &[4]),
    );
    let mut function = builder.finish("ones_like", vec![ones]);

    lower(&mut function)?;

    let literals = constants(&function);
    assert_eq!(literals.len(), 1);
    assert_eq!(literals[0].bytes.as_ref(), &1i32.to_le_bytes());
    assert_eq!(result_inst(&function).output, tensor_type(DType::Si32, &[4]));
    assert!(matches!(
        result_inst(&function).op,
        Operation::Core(CoreOp::Broadcast(_))
    ));
    Ok(())
}

#[test]
fn non_strided_layout_is_declined() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let size = builder.int_list(&[2]);
    let dtype = builder.const_none();
    let layout = builder.const_int(1);
    let device = builder.const_none();
    let pin_memory = builder.const_none();
    let ones = builder.frontend(
        FrontendOp::Ones,
        &[size, dtype, layout, device, pin_memory],
        tensor_type(DType::F32, &[2]),
    );
    let mut function = builder.finish("ones_sparse", vec![ones]);
    let before = function.clone();

    let report = lower(&mut function)?;
    assert_eq!(function, before);
    assert!(report.diagnostics[0].message.contains("layout"));
    Ok(())
}

#[test]
fn zeros_like_with_memory_format_is_declined() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[4]));
    let none = builder.const_none();
    let channels_last = builder.const_int(2);
    let zeros = builder.frontend(
        FrontendOp::ZerosLike,
        &[input, none, none, none, none, channels_last],
        tensor_type(DType::F32, &[4]),
    );
    let mut function = builder.finish("zeros_like_format", vec![zeros]);
    let before = function.clone();

    let report = lower(&mut function)?;
    assert_eq!(function, before);
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics[0].message.contains("`memory_format`"));
    Ok(())
}

#[test]
fn size_becomes_dim_and_index_cast() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[3, 7]));
    let dim = builder.const_int(1);
    let size = builder.frontend(FrontendOp::Size, &[input, dim], ValueType::Int);
    let mut function = builder.finish("size", vec![size]);

    lower(&mut function)?;

    let cast = result_inst(&function);
    assert_eq!(cast.op, Operation::Core(CoreOp::IndexCast(DType::Si64)));
    assert_eq!(cast.output, ValueType::Scalar(DType::Si64));
    let extent = cast.operands[0].value();
    let dim = function.defining_instruction(extent).expect("dim is emitted");
    assert_eq!(dim.op, Operation::Core(CoreOp::Dim(DimSpec { axis: 1 })));
    assert_eq!(dim.output, ValueType::Scalar(DType::Index));
    assert_eq!(function.results, vec![ValueType::Int]);
    Ok(())
}

#[test]
fn size_with_negative_dim_is_declined() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type(DType::F32, &[3, 7]));
    let dim = builder.const_int(-1);
    let size = builder.frontend(FrontendOp::Size, &[input, dim], ValueType::Int);
    let mut function = builder.finish("size_negative", vec![size]);

    let report = lower(&mut function)?;
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(function.count_ops(|op| op.is_frontend()), 2);
    Ok(())
}

#[test]
fn integer_literal_is_reencoded_with_sign_extension() -> Result<()> {
    let source = TensorLiteral::from_i64_values(tensor_spec_static(DType::Si32, &[3]), &[-1, 2, 3])
        .expect("valid literal");
    let mut builder = FunctionBuilder::new();
    let literal = builder.frontend(
        FrontendOp::TensorLiteral(source),
        &[],
        tensor_type(DType::Si64, &[3]),
    );
    let mut function = builder.finish("literal", vec![literal]);

    lower(&mut function)?;

    let expected =
        TensorLiteral::from_i64_values(tensor_spec_static(DType::Si64, &[3]), &[-1, 2, 3])
            .expect("valid literal");
    assert_eq!(
        result_inst(&function).op,
        Operation::Core(CoreOp::Constant(expected))
    );
    Ok(())
}

#[test]
fn unsigned_literal_is_sign_extended_when_widened() -> Result<()> {
    let source = TensorLiteral::from_i64_values(tensor_spec_static(DType::Ui8, &[2]), &[255, 1])
        .expect("valid literal");
    let mut builder = FunctionBuilder::new();
    let literal = builder.frontend(
        FrontendOp::TensorLiteral(source),
        &[],
        tensor_type(DType::Si32, &[2]),
    );
    let mut function = builder.finish("unsigned_literal", vec![literal]);

    lower(&mut function)?;

    let Operation::Core(CoreOp::Constant(converted)) = &result_inst(&function).op else {
        panic!("literal must lower to a core constant");
    };
    assert_eq!(converted.to_i64_values(), Some(vec![-1, 1]));
    assert_eq!(converted.bytes.as_ref(), [(-1i32).to_le_bytes(), 1i32.to_le_bytes()].concat());
    Ok(())
}

#[test]
fn symbolic_bindings_are_carried_over() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(ValueType::Tensor(tensor_spec_static(DType::F32, &[8])));
    let symbol = builder.frontend(
        FrontendOp::SymbolicInt(SymbolicIntSpec {
            name: "s0".into(),
            min: 2,
            max: 64,
        }),
        &[],
        ValueType::Int,
    );
    let bind = BindShapeSpec {
        expression: "[s0] -> (s0)".into(),
    };
    builder.frontend(
        FrontendOp::BindSymbolicShape(bind.clone()),
        &[input, symbol],
        ValueType::None,
    );
    let mut function = builder.finish("symbolic", vec![input]);

    lower(&mut function)?;

    assert_eq!(function.count_ops(|op| op.is_frontend()), 0);
    let [symbol_inst, bind_inst] = function.body.as_slice() else {
        panic!("expected two instructions, found {}", function.body.len());
    };
    assert!(matches!(
        &symbol_inst.op,
        Operation::Core(CoreOp::SymbolicInt(spec)) if spec.name == "s0"
    ));
    assert_eq!(symbol_inst.output, ValueType::Scalar(DType::Si64));
    assert_eq!(bind_inst.op, Operation::Core(CoreOp::BindSymbolicShape(bind)));
    assert_eq!(
        bind_inst.operands,
        vec![Operand::Value(input), Operand::Value(symbol_inst.id)]
    );
    Ok(())
}

#[test]
fn symbolic_int_without_core_type_is_declined() -> Result<()> {
    let mut builder = FunctionBuilder::new();
    let symbol = builder.frontend(
        FrontendOp::SymbolicInt(SymbolicIntSpec {
            name: "s0".into(),
            min: 1,
            max: 8,
        }),
        &[],
        ValueType::optional(ValueType::Int),
    );
    let mut function = builder.finish("symbolic_optional", vec![symbol]);
    let before = function.clone();

    let report = lower(&mut function)?;
    assert_eq!(function, before);
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics[0].message.contains("has no core equivalent"));
    Ok(())
}
