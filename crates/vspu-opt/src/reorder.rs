//! Delay-slot filling by reordering within basic blocks.
//!
//! Placeholder instructions encode mandatory hardware delays. This pass
//! tries to replace each one with a later, independent instruction from the
//! same block, so the delay cycle does useful work. The search is driven by
//! an exclusion set seeded from the hazard that caused the placeholder and
//! grown over every instruction it skips; the first instruction touching
//! nothing excluded becomes the candidate.
//!
//! The pass runs once per block. It deliberately does not iterate to a
//! fixed point; a second sweep rarely finds anything and the surrounding
//! pipeline is tuned against single-pass cost.

use std::collections::HashSet;

use log::debug;
use vspu_ir::{
    instruction_string, Cursor, DelayType, Handle, Instruction, InstructionKind, Local, Method,
    Module, Register, Value, ValueKind,
};

use crate::{Config, OptError};

/// Identity of a storage location for exclusion tracking. Literals have no
/// identity and never conflict.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
enum ValueKey {
    Local(Handle<Local>),
    Register(Register),
}

fn value_key(value: &Value) -> Option<ValueKey> {
    match value.kind {
        ValueKind::Local { local, .. } => Some(ValueKey::Local(local)),
        ValueKind::Register(register) => Some(ValueKey::Register(register)),
        ValueKind::Literal(_) => None,
    }
}

fn exclude_registers(excluded: &mut HashSet<ValueKey>, registers: &[Register]) {
    for &register in registers {
        excluded.insert(ValueKey::Register(register));
    }
}

fn is_excluded(excluded: &HashSet<ValueKey>, value: &Value) -> bool {
    value_key(value).is_some_and(|key| excluded.contains(&key))
}

/// Finds the last instruction before `pos` that produced a result, which is
/// the reason the placeholder was inserted. Skips tombstones and resultless
/// instructions; gives up at the block start (the hazard's origin then
/// spans block entry, which several predecessors may reach).
fn find_previous_producer(method: &Method, pos: Cursor) -> Option<Cursor> {
    let mut it = pos;
    while let Some(prev) = method.prev_in_block(it) {
        it = prev;
        if let Some(handle) = method.instruction_at(it) {
            if method.instr(handle).output().is_some() {
                return Some(it);
            }
        }
    }
    None
}

/// Returns `true` if the instruction's result or either of its first two
/// arguments is the mutex register. A mutex result is a release, a mutex
/// argument an acquire; relocating either, or moving anything across them,
/// would widen the critical section.
fn touches_mutex(instruction: &Instruction) -> bool {
    instruction
        .outputs()
        .iter()
        .any(|v| v.is_register(Register::Mutex))
        || instruction
            .argument(0)
            .is_some_and(|v| v.is_register(Register::Mutex))
        || instruction
            .argument(1)
            .is_some_and(|v| v.is_register(Register::Mutex))
}

/// Scans forward from the slot after `pos` for an instruction that accesses
/// none of the excluded values and is safe to relocate. The scan is bounded
/// by `lookahead` slots; reaching a critical-section boundary aborts the
/// whole search.
fn find_instruction_not_accessing(
    method: &Method,
    pos: Cursor,
    excluded: &mut HashSet<ValueKey>,
    lookahead: usize,
) -> Option<Cursor> {
    let mut remaining = lookahead;
    let mut it = method.next_in_block(pos);
    while remaining > 0 && !method.is_end_of_block(it) {
        let Some(handle) = method.instruction_at(it) else {
            // skip already-replaced slots
            remaining -= 1;
            it = method.next_in_block(it);
            continue;
        };
        let instruction = method.instr(handle);

        if touches_mutex(instruction) {
            debug!(
                "not moving anything across a critical-section boundary: {}",
                instruction_string(method, instruction)
            );
            return None;
        }

        let mut valid = true;
        if instruction
            .outputs()
            .into_iter()
            .any(|v| is_excluded(excluded, v))
        {
            valid = false;
        }
        if valid
            && instruction
                .arguments()
                .into_iter()
                .any(|v| is_excluded(excluded, v))
        {
            valid = false;
        }
        // for now, skip everything setting or depending on flags/signals
        if valid && (instruction.has_conditional_execution() || instruction.has_side_effects()) {
            valid = false;
        }
        // never reorder branches, labels or barriers
        if valid
            && matches!(
                instruction.kind,
                InstructionKind::Branch { .. }
                    | InstructionKind::Label { .. }
                    | InstructionKind::MemoryBarrier
            )
        {
            valid = false;
        }
        // relocating a placeholder into a placeholder's slot would corrupt
        // the delay accounting
        if valid && instruction.nop_delay().is_some() {
            valid = false;
        }
        // an instruction that occupies no machine cycle cannot absorb the
        // delay
        if valid && !instruction.maps_to_machine_instruction() {
            valid = false;
        }
        if valid {
            debug!(
                "found replacement candidate: {}",
                instruction_string(method, instruction)
            );
            return Some(it);
        }

        // Outputs of skipped instructions may feed instructions after them;
        // the candidate must not clobber them.
        for out in instruction.outputs() {
            if out.is_register(Register::Discard) {
                continue;
            }
            if let Some(key) = value_key(out) {
                excluded.insert(key);
            }
            // an SFU/TMU request in the window means a second request must
            // not be pulled ahead of it
            if out.register().is_some_and(Register::triggers_unit_hazard) {
                exclude_registers(excluded, Register::sfu_tmu_group());
            }
        }

        remaining -= 1;
        it = method.next_in_block(it);
    }
    None
}

/// Finds an instruction that can replace the placeholder at `pos` without
/// violating the reason for the delay, or `None` if nothing in the bounded
/// window is safe.
pub fn find_replacement_candidate(
    method: &Method,
    pos: Cursor,
    delay: DelayType,
    config: &Config,
) -> Option<Cursor> {
    let mut excluded: HashSet<ValueKey> = HashSet::new();
    match delay {
        // Branch delay slots are created during code generation and do not
        // exist at this stage; nothing follows the thread-end sequence.
        DelayType::BranchDelay | DelayType::ThreadEnd => None,
        DelayType::WaitRegister => {
            let producer = match find_previous_producer(method, pos) {
                Some(producer) => producer,
                None => {
                    debug!("no hazard origin for placeholder inside this block, leaving it");
                    return None;
                }
            };
            let out = method
                .instr(method.instruction_at(producer)?)
                .output()
                .copied()?;
            if let Some(key) = value_key(&out) {
                excluded.insert(key);
            }
            // a pending bus transfer couples the address register to the
            // direction's busy flag and the shared data port
            if let Some(direction) = out.register().and_then(Register::bus_address_direction) {
                exclude_registers(&mut excluded, &Register::bus_companions(direction));
            }
            find_instruction_not_accessing(method, pos, &mut excluded, config.reorder_lookahead)
        }
        DelayType::WaitSfu | DelayType::WaitTmu => {
            // any special-function or texture access within the window is
            // unsafe, regardless of which unit caused the wait
            exclude_registers(&mut excluded, Register::sfu_tmu_group());
            find_instruction_not_accessing(method, pos, &mut excluded, config.reorder_lookahead)
        }
    }
}

/// Replaces side-effect-free placeholders in one block with relocated
/// candidates, leaving tombstones at the candidates' old positions.
fn replace_nops(method: &mut Method, block: usize, config: &Config) -> Result<(), OptError> {
    let mut it = Cursor { block, slot: 0 };
    while !method.is_end_of_block(it) {
        if let Some(handle) = method.instruction_at(it) {
            let instruction = method.instr(handle);
            if let Some(delay) = instruction.nop_delay() {
                // placeholders with side effects carry a signal that must
                // stay where it is
                if !instruction.has_side_effects() {
                    if let Some(candidate) = find_replacement_candidate(method, it, delay, config)
                    {
                        let pinned = !method.instr(handle).can_be_combined;
                        let moved = method.detach_at(candidate)?;
                        debug!(
                            "replacing placeholder with: {}",
                            instruction_string(method, method.instr(moved))
                        );
                        method.install_at(it, moved)?;
                        if pinned {
                            method.instr_mut(moved).can_be_combined = false;
                        }
                    }
                }
            }
        }
        it = method.next_in_block(it);
    }
    Ok(())
}

/// The `reorder` pass: fill delay slots block by block, then compact the
/// tombstones left behind.
pub(crate) fn reorder_within_blocks(
    _module: &Module,
    method: &mut Method,
    config: &Config,
) -> Result<(), OptError> {
    for block in 0..method.blocks.len() {
        replace_nops(method, block, config)?;
    }
    method.compact();
    Ok(())
}
