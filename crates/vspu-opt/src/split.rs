//! Read-after-write splitting.
//!
//! Consecutive write/read of the same local forces the register allocator
//! to put the value into an accumulator. Splitting such pairs with a
//! placeholder relaxes that pressure, and the reorder pass can then fill
//! the placeholder with useful work.
//!
//! The placeholder goes immediately after the last real write rather than
//! before the read: for a write-label-read sequence that yields
//! write-nop-label-read, where the placeholder sits in the writer's block
//! and the reorder pass can still find the hazard's cause.

use log::debug;
use vspu_ir::{
    instruction_string, Cursor, DelayType, Handle, Instruction, InstructionKind, Local, Method,
    Module,
};

use crate::{Config, OptError};

/// The `split-read-after-writes` pass: a conservative forward scan over the
/// whole method. Only instructions that participate in final encoding
/// update the tracked "last written" local; labels and other scheduling
/// artifacts are transparent.
pub(crate) fn split_read_after_writes(
    _module: &Module,
    method: &mut Method,
    config: &Config,
) -> Result<(), OptError> {
    let mut it = method.begin();
    let mut last_instruction: Option<Cursor> = None;
    let mut last_written: Option<Handle<Local>> = None;

    while !method.is_end_of_method(it) {
        if let Some(handle) = method.instruction_at(it) {
            if let (Some(local), Some(writer)) = (last_written, last_instruction) {
                if method.instr(handle).reads_local(local) && needs_split(method, writer, handle, local, config) {
                    debug!(
                        "inserting placeholder to split read-after-write before: {}",
                        instruction_string(method, method.instr(handle))
                    );
                    let at = Cursor {
                        block: writer.block,
                        slot: writer.slot + 1,
                    };
                    method.insert_at(at, Instruction::nop(DelayType::WaitRegister))?;
                    // the insertion shifted every later slot of that block,
                    // including possibly our own position
                    if it.block == writer.block && it.slot >= at.slot {
                        it.slot += 1;
                    }
                }
            }
            if method.instr(handle).maps_to_machine_instruction() {
                last_written = method
                    .instr(handle)
                    .output()
                    .and_then(|out| out.local_handle());
                last_instruction = Some(it);
            }
        }
        it = method.next_in_method(it);
    }
    Ok(())
}

/// A split is needed when the writer packed its result (the packed value
/// must round-trip through a register file and cannot be read back in the
/// next cycle), when the reader is a vector-lane rotation (whose source
/// must not be written in the directly preceding instruction), or when the
/// live range leaves the straight-line span anyway.
fn needs_split(
    method: &Method,
    writer: Cursor,
    reader: Handle<Instruction>,
    local: Handle<Local>,
    config: &Config,
) -> bool {
    if let Some(writer_handle) = method.instruction_at(writer) {
        if method.instr(writer_handle).uses_packing() {
            return true;
        }
    }
    if matches!(
        method.instr(reader).kind,
        InstructionKind::Rotate { .. }
    ) {
        return true;
    }
    !method.is_locally_limited(writer, local, config.accumulator_window)
}
