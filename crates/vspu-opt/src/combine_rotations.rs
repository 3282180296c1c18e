//! Folding of chained vector-lane rotations.
//!
//! Vector shuffles lower into sequences of rotations, and two rotations in
//! a row (the second consuming the first's result) are equivalent to one
//! rotation by the summed offset, modulo the lane count. The intermediate
//! local then dies and is cleaned up by dead-code elimination.

use log::debug;
use vspu_ir::{
    instruction_string, Access, Cursor, Instruction, InstructionKind, Literal, Method, Module,
    Value, LANE_COUNT,
};

use crate::{Config, OptError};

/// The `combine-rotations` pass.
pub(crate) fn combine_rotations(
    _module: &Module,
    method: &mut Method,
    _config: &Config,
) -> Result<(), OptError> {
    for block in 0..method.blocks.len() {
        for slot in 0..method.blocks[block].len() {
            let cursor = Cursor { block, slot };
            let Some(handle) = method.instruction_at(cursor) else {
                continue;
            };
            let instruction = method.instr(handle);
            if !is_plain(instruction) {
                continue;
            }
            let InstructionKind::Rotate { dest, src, offset } = &instruction.kind else {
                continue;
            };
            let (Some(source_local), Some(outer_offset)) = (
                src.local_handle(),
                offset.as_literal().and_then(Literal::as_int),
            ) else {
                continue;
            };

            // the source must come from exactly one rotation, read only here
            let Some(writer) = method.locals[source_local].single_writer() else {
                continue;
            };
            if method.locals[source_local].users_matching(Access::READER) != vec![handle] {
                continue;
            }
            if !(1..slot).any(|s| method.blocks[block].handle_at(s) == Some(writer)) {
                continue;
            }
            let producer = method.instr(writer);
            if !is_plain(producer) {
                continue;
            }
            let InstructionKind::Rotate {
                src: inner_src,
                offset: inner_offset,
                ..
            } = &producer.kind
            else {
                continue;
            };
            let Some(inner_offset) = inner_offset.as_literal().and_then(Literal::as_int) else {
                continue;
            };

            let folded = (inner_offset + outer_offset).rem_euclid(i64::from(LANE_COUNT));
            let replacement = Instruction::rotate(
                *dest,
                *inner_src,
                Value::literal(Literal::Int(folded)),
            );
            debug!(
                "folding chained rotations into: {}",
                instruction_string(method, &replacement)
            );
            method.replace_at(cursor, replacement)?;
        }
    }
    Ok(())
}

fn is_plain(instruction: &Instruction) -> bool {
    !instruction.has_side_effects()
        && !instruction.has_conditional_execution()
        && !instruction.pack.is_active()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vspu_ir::Local as IrLocal;
    use vspu_ir::Type;

    fn run(method: &mut Method) {
        let module = Module::new("unit");
        combine_rotations(&module, method, &Config::default()).unwrap();
    }

    fn lines(method: &Method) -> Vec<String> {
        method
            .blocks
            .iter()
            .flat_map(|b| b.iter())
            .map(|h| instruction_string(method, method.instr(h)))
            .collect()
    }

    fn rotate(method: &mut Method, block: usize, dest: &str, src: &str, offset: i64) {
        let d = method
            .locals
            .iter()
            .find(|(_, l)| l.name == dest)
            .map(|(h, _)| h);
        let d = d.unwrap_or_else(|| method.add_local(IrLocal::new(dest, Type::INT)).unwrap());
        let s = method
            .locals
            .iter()
            .find(|(_, l)| l.name == src)
            .map(|(h, _)| h);
        let s = s.unwrap_or_else(|| method.add_local(IrLocal::new(src, Type::INT)).unwrap());
        method
            .append_to_block(
                block,
                Instruction::rotate(
                    Value::local(d, Type::INT),
                    Value::local(s, Type::INT),
                    Value::literal(Literal::Int(offset)),
                ),
            )
            .unwrap();
    }

    #[test]
    fn chained_rotations_fold_with_wrapping() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        rotate(&mut method, block, "%mid", "%src", 10);
        rotate(&mut method, block, "%out", "%mid", 9);

        run(&mut method);
        // 10 + 9 wraps to 3 over 16 lanes; the first rotation is now dead
        // (left for dead-code elimination)
        assert_eq!(
            lines(&method),
            vec!["start:", "%mid = rot %src, 10", "%out = rot %src, 3"]
        );
    }

    #[test]
    fn extra_reader_blocks_the_fold() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        rotate(&mut method, block, "%mid", "%src", 2);
        rotate(&mut method, block, "%out", "%mid", 3);
        rotate(&mut method, block, "%other", "%mid", 1);

        let before = lines(&method);
        run(&mut method);
        assert_eq!(lines(&method), before);
    }

    #[test]
    fn non_rotation_producer_is_left_alone() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        let mid = method.add_local(IrLocal::new("%mid", Type::INT)).unwrap();
        method
            .append_to_block(
                block,
                Instruction::load(Value::local(mid, Type::INT), Literal::Int(5)),
            )
            .unwrap();
        rotate(&mut method, block, "%out", "%mid", 3);

        let before = lines(&method);
        run(&mut method);
        assert_eq!(lines(&method), before);
    }

    #[test]
    fn dynamic_offset_blocks_the_fold() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        rotate(&mut method, block, "%mid", "%src", 2);
        let out = method.add_local(IrLocal::new("%out", Type::INT)).unwrap();
        let mid = method
            .locals
            .iter()
            .find(|(_, l)| l.name == "%mid")
            .map(|(h, _)| h)
            .unwrap();
        let n = method.add_local(IrLocal::new("%n", Type::INT)).unwrap();
        method
            .append_to_block(
                block,
                Instruction::rotate(
                    Value::local(out, Type::INT),
                    Value::local(mid, Type::INT),
                    Value::local(n, Type::INT),
                ),
            )
            .unwrap();

        let before = lines(&method);
        run(&mut method);
        assert_eq!(lines(&method), before);
    }
}
