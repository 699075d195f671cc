use anyhow::Result;
use tensor_lower::{
    ir_utils::{tensor_type, tensor_type_mixed},
    spec::{DType, FrontendOp, Function, FunctionBuilder},
};

fn slice_function() -> Function {
    let mut builder = FunctionBuilder::new();
    let input = builder.add_parameter(tensor_type_mixed(DType::F32, &[None, Some(6)]));
    let dim = builder.const_int(1);
    let start = builder.const_int(0);
    let end = builder.const_none();
    let step = builder.const_int(2);
    let slice = builder.frontend(
        FrontendOp::Slice,
        &[input, dim, start, end, step],
        tensor_type_mixed(DType::F32, &[None, Some(3)]),
    );
    builder.finish("strided", vec![slice])
}

#[test]
fn function_survives_json() -> Result<()> {
    let function = slice_function();
    let json = function.to_json_string()?;
    let restored = Function::from_json_str(&json)?;
    assert_eq!(restored, function);
    Ok(())
}

#[test]
fn text_form_lists_every_instruction() {
    let function = slice_function();
    let text = function.to_string();

    assert!(text.starts_with("func @strided"));
    assert!(text.contains("frontend.slice"));
    assert_eq!(text.matches("frontend.constant.int").count(), 3);
    assert!(text.contains("%0 : tensor<F32 x ?s0x6>"));
    assert!(text.contains("-> tensor<F32 x ?s0x3>"));
    assert!(text.contains("%1 = frontend.constant.int {1}() -> !int"));
    assert_eq!(tensor_type(DType::Si64, &[]).to_string(), "tensor<Si64 x []>");
}
