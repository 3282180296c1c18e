//! Combining of duplicate literal loads.
//!
//! Loading the same immediate twice within a short stretch of a block
//! wastes a cycle and a register. The second load's readers are rewritten
//! to the first load's local and the duplicate is dropped.
//!
//! Both locals must have a single writer (otherwise the rewrite would merge
//! unrelated values), and the duplicate's readers must all sit in the same
//! block after it, so the first definition is guaranteed to reach them.

use log::debug;
use vspu_ir::{
    instruction_string, Access, Cursor, Handle, InstructionKind, Literal, Local, Method, Module,
};

use crate::{Config, OptError};

/// The `combine-literal-loads` pass.
pub(crate) fn combine_literal_loads(
    _module: &Module,
    method: &mut Method,
    config: &Config,
) -> Result<(), OptError> {
    for block in 0..method.blocks.len() {
        let mut recent: Vec<(Literal, Handle<Local>, usize)> = Vec::new();
        let mut position = 0usize;
        for slot in 0..method.blocks[block].len() {
            let cursor = Cursor { block, slot };
            let Some(handle) = method.instruction_at(cursor) else {
                continue;
            };
            if !method.instr(handle).maps_to_machine_instruction() {
                continue;
            }
            position += 1;
            recent.retain(|&(_, _, p)| position - p <= config.literal_window);

            let instruction = method.instr(handle);
            let plain = !instruction.has_side_effects()
                && !instruction.has_conditional_execution()
                && !instruction.pack.is_active();
            let load = match &instruction.kind {
                InstructionKind::LoadImmediate { dest, value } if plain => {
                    dest.local_handle().map(|local| (local, *value))
                }
                _ => None,
            };
            let Some((dest_local, value)) = load else {
                continue;
            };

            if let Some(&(_, first_local, _)) = recent.iter().find(|&&(v, _, _)| v == value) {
                if method.locals[first_local].single_writer().is_some()
                    && method.locals[dest_local].single_writer() == Some(handle)
                    && readers_follow_in_block(method, block, slot, dest_local)
                {
                    debug!(
                        "combining duplicate literal load: {}",
                        instruction_string(method, instruction)
                    );
                    for reader in method.locals[dest_local].users_matching(Access::READER) {
                        method.rewrite_reader(reader, dest_local, first_local)?;
                    }
                    method.remove_at(cursor)?;
                    continue;
                }
            }
            recent.push((value, dest_local, position));
        }
    }
    method.compact();
    Ok(())
}

/// Returns `true` if every reader of `local` occupies a slot after
/// `after_slot` in the given block.
fn readers_follow_in_block(
    method: &Method,
    block: usize,
    after_slot: usize,
    local: Handle<Local>,
) -> bool {
    let readers = method.locals[local].users_matching(Access::READER);
    readers.iter().all(|reader| {
        (after_slot + 1..method.blocks[block].len())
            .any(|slot| method.blocks[block].handle_at(slot) == Some(*reader))
    })
}
