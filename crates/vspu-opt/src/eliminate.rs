//! Dead-instruction elimination.
//!
//! Removes encoded instructions whose written local nothing reads, and
//! moves whose source and destination are the same local. Runs backward
//! through each block so that removing a reader exposes its now-dead
//! producers within the same sweep.

use log::debug;
use vspu_ir::{
    instruction_string, Access, Cursor, InstructionKind, LocalKind, Method, Module, ValueKind,
};

use crate::{Config, OptError};

/// The `eliminate-dead-code` pass.
pub(crate) fn eliminate_dead_code(
    _module: &Module,
    method: &mut Method,
    _config: &Config,
) -> Result<(), OptError> {
    for block in 0..method.blocks.len() {
        for slot in (0..method.blocks[block].len()).rev() {
            let cursor = Cursor { block, slot };
            let Some(handle) = method.instruction_at(cursor) else {
                continue;
            };
            let instruction = method.instr(handle);
            if !instruction.maps_to_machine_instruction() {
                continue;
            }
            if instruction.has_side_effects() || instruction.has_conditional_execution() {
                continue;
            }
            // a fused pair has two results; judging it by one alone would
            // drop live work
            if matches!(instruction.kind, InstructionKind::Combined { .. }) {
                continue;
            }
            // reads that consume hardware state (uniform stream, bus FIFO,
            // mutex) are observable even when the result is dead
            if instruction
                .arguments()
                .iter()
                .any(|v| v.register().is_some_and(|r| r.read_consumes_state()))
            {
                continue;
            }

            if let InstructionKind::Move { dest, src } = &instruction.kind {
                if let (
                    ValueKind::Local {
                        local: d,
                        elem: de,
                    },
                    ValueKind::Local {
                        local: s,
                        elem: se,
                    },
                ) = (&dest.kind, &src.kind)
                {
                    if d == s && de == se {
                        debug!(
                            "removing move to itself: {}",
                            instruction_string(method, instruction)
                        );
                        method.remove_at(cursor)?;
                        continue;
                    }
                }
            }

            let Some(out) = instruction.output() else {
                continue;
            };
            let Some(local) = out.local_handle() else {
                continue;
            };
            // parameters and globals are observable outside the method
            if !matches!(method.locals[local].kind, LocalKind::Temporary) {
                continue;
            }
            if method.locals[local].users_matching(Access::READER).is_empty() {
                debug!(
                    "removing instruction with unread result: {}",
                    instruction_string(method, instruction)
                );
                method.remove_at(cursor)?;
            }
        }
    }
    method.compact();
    Ok(())
}
