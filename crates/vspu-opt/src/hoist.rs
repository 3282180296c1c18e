//! Accumulator-lifetime hoisting for vector-lane rotation sources.
//!
//! A rotation source must sit in an accumulator, and accumulators only hold
//! values with short, block-local live ranges. When the source's natural
//! lifetime is too long (written in another block, or further back than the
//! accumulator window), the value is copied into a throwaway temporary just
//! before the rotation, and the rotation reads the temporary instead.

use log::debug;
use vspu_ir::{
    instruction_string, Cursor, Handle, Instruction, InstructionKind, Local, Method, Module,
};

use crate::{Config, OptError};

/// The `hoist-rotation-sources` step.
///
/// Returns the cursor of the source's original writer when a copy was
/// materialized, so the driver re-examines the region where the live range
/// just got shorter. Anything else returns the incoming cursor unchanged.
pub(crate) fn hoist_rotation_sources(
    _module: &Module,
    method: &mut Method,
    it: Cursor,
    config: &Config,
) -> Result<Cursor, OptError> {
    let Some(handle) = method.instruction_at(it) else {
        return Ok(it);
    };
    let (source_local, source_ty) = match &method.instr(handle).kind {
        InstructionKind::Rotate { src, .. } => match src.local_handle() {
            Some(local) => (local, src.ty),
            None => return Ok(it),
        },
        _ => return Ok(it),
    };

    let writer = find_block_writer(method, it, source_local);
    let safe = match writer {
        Some(writer) => method.is_locally_limited(writer, source_local, config.accumulator_window),
        // written in another block (or not at all): several writers may
        // reach this block, so the range is never accumulator-safe
        None => false,
    };
    if safe {
        return Ok(it);
    }

    // Place the copy before the contiguous run of placeholders directly
    // preceding the rotation, so the delay slots stay adjacent to it.
    let mut mapper = it;
    while let Some(prev) = method.prev_in_block(mapper) {
        let is_nop = method
            .instruction_at(prev)
            .is_some_and(|h| method.instr(h).nop_delay().is_some());
        if !is_nop {
            break;
        }
        mapper = prev;
    }

    debug!(
        "moving rotation source into a temporary for: {}",
        instruction_string(method, method.instr(handle))
    );
    let temp = method.add_new_local(source_ty, "rotation_src");
    method.insert_at(
        mapper,
        Instruction::mov(
            vspu_ir::Value::local(temp, source_ty),
            vspu_ir::Value::local(source_local, source_ty),
        ),
    )?;
    // the rotation (and everything from the insertion point on) shifted
    let rotation = Cursor {
        block: it.block,
        slot: it.slot + 1,
    };
    let rotation_handle = method
        .instruction_at(rotation)
        .ok_or(vspu_ir::IrError::VacantSlot {
            block: rotation.block,
            slot: rotation.slot,
        })?;
    method.rewrite_reader(rotation_handle, source_local, temp)?;

    Ok(writer.unwrap_or(Cursor {
        block: it.block,
        slot: 0,
    }))
}

/// Scans backward from the rotation for the instruction that wrote the
/// source local, staying within the block.
fn find_block_writer(
    method: &Method,
    from: Cursor,
    local: Handle<Local>,
) -> Option<Cursor> {
    let mut it = from;
    while let Some(prev) = method.prev_in_block(it) {
        it = prev;
        if let Some(handle) = method.instruction_at(it) {
            if method.instr(handle).writes_local(local) {
                return Some(it);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use vspu_ir::Local as IrLocal;
    use vspu_ir::{Access, DelayType, Literal, Type, Value};

    fn run_at(method: &mut Method, cursor: Cursor) -> Cursor {
        let module = Module::new("unit");
        hoist_rotation_sources(&module, method, cursor, &Config::default()).unwrap()
    }

    #[test]
    fn near_writer_needs_no_copy() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        let a = method.add_local(IrLocal::new("%a", Type::INT)).unwrap();
        let d = method.add_local(IrLocal::new("%d", Type::INT)).unwrap();
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
                    Value::literal(Literal::Int(2)),
                ),
            )
            .unwrap();

        let at = Cursor { block, slot: 2 };
        let returned = run_at(&mut method, at);
        assert_eq!(returned, at);
        assert_eq!(method.instruction_count(), 3);
    }

    #[test]
    fn far_writer_gets_a_temporary() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        let a = method.add_local(IrLocal::new("%a", Type::INT)).unwrap();
        let d = method.add_local(IrLocal::new("%d", Type::INT)).unwrap();
        method
            .append_to_block(
                block,
                Instruction::load(Value::local(a, Type::INT), Literal::Int(1)),
            )
            .unwrap();
        for i in 0..10 {
            let t = method
                .add_local(IrLocal::new(format!("%t{i}"), Type::INT))
                .unwrap();
            method
                .append_to_block(
                    block,
                    Instruction::load(Value::local(t, Type::INT), Literal::Int(i)),
                )
                .unwrap();
        }
        let rot_handle = method
            .append_to_block(
                block,
                Instruction::rotate(
                    Value::local(d, Type::INT),
                    Value::local(a, Type::INT),
                    Value::literal(Literal::Int(2)),
                ),
            )
            .unwrap();

        let at = Cursor { block, slot: 12 };
        let returned = run_at(&mut method, at);

        // returned cursor points at the original writer
        assert_eq!(returned, Cursor { block, slot: 1 });

        // the rotation now reads the temporary, not %a
        assert!(!method.instr(rot_handle).reads_local(a));
        assert!(method.locals[a].use_of(rot_handle).is_none());
        let readers_of_a = method.locals[a].users_matching(Access::READER);
        assert_eq!(readers_of_a.len(), 1, "only the copy still reads %a");

        // the temporary is written once (the copy) and read once (the
        // rotation)
        let temp = method
            .locals
            .iter()
            .find(|(_, l)| l.name.starts_with("%rotation_src"))
            .map(|(h, _)| h)
            .expect("temporary exists");
        assert_eq!(method.locals[temp].users_matching(Access::READER), vec![rot_handle]);
        assert_eq!(method.locals[temp].users_matching(Access::WRITER).len(), 1);

        // the copy sits directly before the rotation
        let lines: Vec<String> = method.blocks[block]
            .iter()
            .map(|h| instruction_string(&method, method.instr(h)))
            .collect();
        assert_eq!(lines[12], "%rotation_src.0 = %a");
        assert_eq!(lines[13], "%d = rot %rotation_src.0, 2");
    }

    #[test]
    fn copy_lands_before_the_placeholder_run() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        let a = method.add_local(IrLocal::new("%a", Type::INT)).unwrap();
        let d = method.add_local(IrLocal::new("%d", Type::INT)).unwrap();
        // no writer of %a in this block at all
        let x = method.add_local(IrLocal::new("%x", Type::INT)).unwrap();
        method
            .append_to_block(
                block,
                Instruction::load(
                    Value::local(x, Type::INT),
                    Literal::Int(0),
                ),
            )
            .unwrap();
        method
            .append_to_block(block, Instruction::nop(DelayType::WaitRegister))
            .unwrap();
        method
            .append_to_block(block, Instruction::nop(DelayType::WaitRegister))
            .unwrap();
        method
            .append_to_block(
                block,
                Instruction::rotate(
                    Value::local(d, Type::INT),
                    Value::local(a, Type::INT),
                    Value::literal(Literal::Int(1)),
                ),
            )
            .unwrap();

        let returned = run_at(&mut method, Cursor { block, slot: 4 });
        // no writer found: the step hands back the block start
        assert_eq!(returned, Cursor { block, slot: 0 });

        let lines: Vec<String> = method.blocks[block]
            .iter()
            .map(|h| instruction_string(&method, method.instr(h)))
            .collect();
        assert_eq!(
            lines,
            vec![
                "start:",
                "%x = ldi 0",
                "%rotation_src.0 = %a",
                "nop (wait-register)",
                "nop (wait-register)",
                "%d = rot %rotation_src.0, 1"
            ]
        );
    }

    #[test]
    fn non_rotation_cursor_is_untouched() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        let a = method.add_local(IrLocal::new("%a", Type::INT)).unwrap();
        method
            .append_to_block(
                block,
                Instruction::load(Value::local(a, Type::INT), Literal::Int(1)),
            )
            .unwrap();
        let at = Cursor { block, slot: 1 };
        assert_eq!(run_at(&mut method, at), at);
        assert_eq!(method.instruction_count(), 2);
    }
}
