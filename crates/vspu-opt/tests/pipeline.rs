//! End-to-end tests for the optimization pipeline: pass ordering, required
//! pass enforcement, and parallel method optimization.

use vspu_ir::{
    Instruction, InstructionKind, Literal, Local, LocalKind, Method, Module, Type, Value,
};
use vspu_opt::{default_passes, Config, OptError, Optimizer, REORDER, SPLIT_READ_AFTER_WRITES};

fn output_param(method: &mut Method, name: &str) -> vspu_ir::Handle<Local> {
    method
        .add_parameter(Local::with_kind(
            name,
            Type::INT,
            LocalKind::Parameter {
                input: false,
                output: true,
            },
        ))
        .unwrap()
}

/// A method whose rotation needs a read-after-write split, with an
/// independent literal load available to fill the resulting delay slot.
fn rotation_method() -> Method {
    let mut method = Method::new("kernel");
    let block = method.create_block("start");
    let a = method.add_local(Local::new("%a", Type::INT)).unwrap();
    let d = method.add_local(Local::new("%d", Type::INT)).unwrap();
    let x = method.add_local(Local::new("%x", Type::INT)).unwrap();
    let out1 = output_param(&mut method, "out1");
    let out2 = output_param(&mut method, "out2");

    method
        .append_to_block(
            block,
            Instruction::load(Value::local(a, Type::INT), Literal::Int(1)),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::rotate(
                Value::local(d, Type::INT),
                Value::local(a, Type::INT),
                Value::literal(Literal::Int(3)),
            ),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::mov(Value::local(out1, Type::INT), Value::local(d, Type::INT)),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::load(Value::local(x, Type::INT), Literal::Int(2)),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::mov(Value::local(out2, Type::INT), Value::local(x, Type::INT)),
        )
        .unwrap();
    method
}

fn rendered(method: &Method) -> Vec<String> {
    method
        .blocks
        .iter()
        .flat_map(|b| b.iter())
        .map(|h| vspu_ir::instruction_string(method, method.instr(h)))
        .collect()
}

#[test]
fn split_feeds_reorder() {
    // The ordering property: the placeholder the splitter inserts is only
    // visible to the reorder pass because split (index 5) runs strictly
    // before reorder (index 6). The filled delay slot is the observable
    // outcome.
    let mut module = Module::new("unit");
    module.methods.push(rotation_method());

    let optimizer = Optimizer::with_defaults(Config::default());
    optimizer.optimize(&mut module).unwrap();

    let lines = rendered(&module.methods[0]);
    let pos = |needle: &str| {
        lines
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("missing '{needle}' in {lines:?}"))
    };
    // the independent load moved into the delay slot between the write of
    // %a and the rotation that reads it
    assert!(pos("ldi 2") > pos("ldi 1"));
    assert!(pos("ldi 2") < pos("rot"));
    assert!(
        !lines.iter().any(|l| l.contains("nop")),
        "the placeholder should have been absorbed: {lines:?}"
    );
}

#[test]
fn split_alone_leaves_the_placeholder() {
    // Running the pipeline without reorder is not allowed (required pass);
    // running split as part of the default set but giving reorder nothing
    // to move shows the placeholder surviving.
    let mut module = Module::new("unit");
    let mut method = Method::new("kernel");
    let block = method.create_block("start");
    let a = method.add_local(Local::new("%a", Type::INT)).unwrap();
    let d = method.add_local(Local::new("%d", Type::INT)).unwrap();
    let out = output_param(&mut method, "out");
    method
        .append_to_block(
            block,
            Instruction::load(Value::local(a, Type::INT), Literal::Int(1)),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::rotate(
                Value::local(d, Type::INT),
                Value::local(a, Type::INT),
                Value::literal(Literal::Int(3)),
            ),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::mov(Value::local(out, Type::INT), Value::local(d, Type::INT)),
        )
        .unwrap();
    module.methods.push(method);

    let optimizer = Optimizer::with_defaults(Config::default());
    optimizer.optimize(&mut module).unwrap();

    let lines = rendered(&module.methods[0]);
    assert!(
        lines.iter().any(|l| l.contains("nop (wait-register)")),
        "nothing can fill the slot, the placeholder must stay: {lines:?}"
    );
}

#[test]
fn omitting_a_required_pass_is_rejected_up_front() {
    let passes: Vec<_> = default_passes()
        .into_iter()
        .filter(|p| *p != SPLIT_READ_AFTER_WRITES)
        .collect();
    let err = Optimizer::new(Config::default(), passes).unwrap_err();
    assert!(matches!(
        err,
        OptError::MissingRequiredPass("split-read-after-writes")
    ));

    let passes: Vec<_> = default_passes()
        .into_iter()
        .filter(|p| *p != REORDER)
        .collect();
    assert!(Optimizer::new(Config::default(), passes).is_err());
}

#[test]
fn methods_are_optimized_independently() {
    let mut module = Module::new("unit");
    for i in 0..8 {
        let mut method = rotation_method();
        method.name = format!("kernel{i}");
        module.methods.push(method);
    }

    let optimizer = Optimizer::with_defaults(Config::default());
    optimizer.optimize(&mut module).unwrap();

    assert_eq!(module.methods.len(), 8);
    for (i, method) in module.methods.iter().enumerate() {
        assert_eq!(method.name, format!("kernel{i}"));
        let lines = rendered(method);
        assert!(
            !lines.iter().any(|l| l.contains("nop")),
            "method {i} still has an unfilled slot: {lines:?}"
        );
    }
}

#[test]
fn dead_code_is_gone_after_the_pipeline() {
    let mut module = Module::new("unit");
    let mut method = Method::new("kernel");
    let block = method.create_block("start");
    let dead = method.add_local(Local::new("%dead", Type::INT)).unwrap();
    let live = method.add_local(Local::new("%live", Type::INT)).unwrap();
    let out = output_param(&mut method, "out");
    method
        .append_to_block(
            block,
            Instruction::load(Value::local(dead, Type::INT), Literal::Int(9)),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::load(Value::local(live, Type::INT), Literal::Int(5)),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::mov(Value::local(out, Type::INT), Value::local(live, Type::INT)),
        )
        .unwrap();
    module.methods.push(method);

    let optimizer = Optimizer::with_defaults(Config::default());
    optimizer.optimize(&mut module).unwrap();

    let method = &module.methods[0];
    assert!(method.locals[dead].users().is_empty());
    let lines = rendered(method);
    assert!(!lines.iter().any(|l| l.contains("ldi 9")), "{lines:?}");
}

#[test]
fn combined_instructions_keep_both_results_live() {
    use vspu_ir::OpCode;

    let mut module = Module::new("unit");
    let mut method = Method::new("kernel");
    let block = method.create_block("start");
    let a = method.add_local(Local::new("%a", Type::INT)).unwrap();
    let b = method.add_local(Local::new("%b", Type::INT)).unwrap();
    let out1 = output_param(&mut method, "out1");
    let out2 = output_param(&mut method, "out2");
    method
        .append_to_block(
            block,
            Instruction::op(
                OpCode::Add,
                Value::local(a, Type::INT),
                vec![
                    Value::literal(Literal::Int(1)),
                    Value::literal(Literal::Int(2)),
                ],
            ),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::op(
                OpCode::Mul24,
                Value::local(b, Type::INT),
                vec![
                    Value::literal(Literal::Int(3)),
                    Value::literal(Literal::Int(4)),
                ],
            ),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::mov(Value::local(out1, Type::INT), Value::local(a, Type::INT)),
        )
        .unwrap();
    method
        .append_to_block(
            block,
            Instruction::mov(Value::local(out2, Type::INT), Value::local(b, Type::INT)),
        )
        .unwrap();
    module.methods.push(method);

    let optimizer = Optimizer::with_defaults(Config::default());
    optimizer.optimize(&mut module).unwrap();

    let method = &module.methods[0];
    let fused = method
        .blocks
        .iter()
        .flat_map(|blk| blk.iter())
        .find(|&h| matches!(method.instr(h).kind, InstructionKind::Combined { .. }));
    let fused = fused.expect("add and mul should have fused");
    assert!(method.instr(fused).writes_local(a));
    assert!(method.instr(fused).writes_local(b));
}
