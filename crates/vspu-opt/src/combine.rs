//! Peephole fusion of neighboring instructions.
//!
//! The VSPU issues one add-pipeline and one mul-pipeline operation per
//! cycle. Two adjacent, independent operations on different pipelines can
//! share a cycle; they are fused into a single combined instruction that
//! the emitter encodes as one word.

use std::collections::HashSet;

use log::debug;
use vspu_ir::{
    instruction_string, Cursor, Handle, Instruction, InstructionKind, Local, Method, Module,
    OpCode, Pipeline, Register, Value, ValueKind,
};

use crate::{Config, OptError};

/// The pipeline an instruction would occupy, if it is fusable at all.
fn pipeline_of(instruction: &Instruction) -> Option<Pipeline> {
    match &instruction.kind {
        InstructionKind::Op { op, .. } => Some(OpCode::pipeline(*op)),
        InstructionKind::Move { .. } => Some(Pipeline::Either),
        _ => None,
    }
}

fn pipelines_compatible(first: Pipeline, second: Pipeline) -> bool {
    !matches!(
        (first, second),
        (Pipeline::Add, Pipeline::Add) | (Pipeline::Mul, Pipeline::Mul)
    )
}

/// Storage identity for dependence checks between the pair.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
enum Slot {
    Local(Handle<Local>),
    Register(Register),
}

fn slot_of(value: &Value) -> Option<Slot> {
    match value.kind {
        ValueKind::Local { local, .. } => Some(Slot::Local(local)),
        ValueKind::Register(register) => Some(Slot::Register(register)),
        ValueKind::Literal(_) => None,
    }
}

/// Returns `true` if an instruction is individually eligible for fusion:
/// unconditional, signal-free, not flag-setting, not pinned, and touching
/// no register the hazard table tracks.
fn fusable(instruction: &Instruction) -> bool {
    if !instruction.can_be_combined
        || instruction.has_side_effects()
        || instruction.has_conditional_execution()
    {
        return false;
    }
    let peripheral = |value: &&Value| {
        value.register().is_some_and(|register| {
            register.hazard_group().is_some() || register.read_consumes_state()
        })
    };
    !instruction.outputs().iter().any(peripheral)
        && !instruction.arguments().iter().any(peripheral)
}

/// Returns `true` if the two instructions can execute in the same cycle:
/// different pipelines, the second not reading the first's result, and no
/// common result slot.
fn independent(first: &Instruction, second: &Instruction) -> bool {
    let (Some(p1), Some(p2)) = (pipeline_of(first), pipeline_of(second)) else {
        return false;
    };
    if !pipelines_compatible(p1, p2) {
        return false;
    }
    let outputs: HashSet<Slot> = first.outputs().into_iter().filter_map(slot_of).collect();
    if second
        .arguments()
        .into_iter()
        .filter_map(slot_of)
        .any(|slot| outputs.contains(&slot))
    {
        return false;
    }
    // two writes to the same slot cannot share a cycle (except the discard
    // sink, which absorbs anything)
    !second
        .outputs()
        .into_iter()
        .filter_map(slot_of)
        .any(|slot| slot != Slot::Register(Register::Discard) && outputs.contains(&slot))
}

/// The `combine` pass: fuses adjacent eligible pairs within each block.
pub(crate) fn combine_pipelines(
    _module: &Module,
    method: &mut Method,
    _config: &Config,
) -> Result<(), OptError> {
    for block in 0..method.blocks.len() {
        let mut slot = 1;
        while slot + 1 < method.blocks[block].len() {
            let first_cursor = Cursor { block, slot };
            let second_cursor = Cursor {
                block,
                slot: slot + 1,
            };
            let (Some(first_handle), Some(second_handle)) = (
                method.instruction_at(first_cursor),
                method.instruction_at(second_cursor),
            ) else {
                slot += 1;
                continue;
            };
            let first = method.instr(first_handle);
            let second = method.instr(second_handle);
            if !(fusable(first) && fusable(second) && independent(first, second)) {
                slot += 1;
                continue;
            }

            let fused = Instruction::new(InstructionKind::Combined {
                first: Box::new(first.clone()),
                second: Box::new(second.clone()),
            })
            .not_combinable();
            debug!(
                "fusing into one cycle: {}",
                instruction_string(method, &fused)
            );
            method.replace_at(first_cursor, fused)?;
            method.remove_at(second_cursor)?;
            slot += 2;
        }
    }
    method.compact();
    Ok(())
}
