//! Combining of memory-transfer-bus configuration writes.
//!
//! Kernel code frequently re-issues the same bus setup before every
//! transfer. A setup write is redundant when the same direction was already
//! configured with the same immediate and nothing touched that direction of
//! the bus in between.

use log::debug;
use vspu_ir::{
    instruction_string, BusDirection, Cursor, HazardGroup, Instruction, InstructionKind, Literal,
    Method, Module, Register, Value,
};

use crate::{Config, OptError};

fn direction_index(direction: BusDirection) -> usize {
    match direction {
        BusDirection::Read => 0,
        BusDirection::Write => 1,
    }
}

/// A write of an immediate to one of the two setup registers.
fn setup_write(instruction: &Instruction) -> Option<(BusDirection, Literal)> {
    let (dest, value) = match &instruction.kind {
        InstructionKind::Move { dest, src } => (dest, src.as_literal()?),
        InstructionKind::LoadImmediate { dest, value } => (dest, *value),
        _ => return None,
    };
    let direction = match dest.register()? {
        Register::BusReadSetup => BusDirection::Read,
        Register::BusWriteSetup => BusDirection::Write,
        _ => return None,
    };
    Some((direction, value))
}

/// The bus directions an instruction touches through its operands or
/// results. The shared data port belongs to both directions.
fn touched_directions(instruction: &Instruction) -> [bool; 2] {
    let mut touched = [false, false];
    let mut visit = |value: &Value| {
        let Some(register) = value.register() else {
            return;
        };
        if register == Register::BusData {
            touched = [true, true];
            return;
        }
        match register.hazard_group() {
            Some(HazardGroup::BusRead) => touched[0] = true,
            Some(HazardGroup::BusWrite) => touched[1] = true,
            _ => {}
        }
    };
    for out in instruction.outputs() {
        visit(out);
    }
    for arg in instruction.arguments() {
        visit(arg);
    }
    touched
}

/// The `combine-bus-setup` pass.
pub(crate) fn combine_bus_setup(
    _module: &Module,
    method: &mut Method,
    _config: &Config,
) -> Result<(), OptError> {
    for block in 0..method.blocks.len() {
        // last setup literal still in effect, per direction
        let mut active: [Option<Literal>; 2] = [None, None];
        for slot in 0..method.blocks[block].len() {
            let cursor = Cursor { block, slot };
            let Some(handle) = method.instruction_at(cursor) else {
                continue;
            };
            let instruction = method.instr(handle);
            if !instruction.maps_to_machine_instruction() {
                continue;
            }
            let plain = !instruction.has_side_effects()
                && !instruction.has_conditional_execution();

            if plain {
                if let Some((direction, value)) = setup_write(instruction) {
                    let index = direction_index(direction);
                    if active[index] == Some(value) {
                        debug!(
                            "dropping redundant bus setup: {}",
                            instruction_string(method, instruction)
                        );
                        method.remove_at(cursor)?;
                    } else {
                        active[index] = Some(value);
                    }
                    continue;
                }
            }

            // any other access to a direction (or a non-trackable
            // instruction touching the bus) invalidates its recorded setup
            let touched = touched_directions(instruction);
            if !plain {
                if touched[0] || touched[1] {
                    active = [None, None];
                }
                continue;
            }
            if touched[0] {
                active[0] = None;
            }
            if touched[1] {
                active[1] = None;
            }
        }
    }
    method.compact();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vspu_ir::Local as IrLocal;
    use vspu_ir::Type;

    fn setup(direction: Register, value: i64) -> Instruction {
        Instruction::load(
            Value::reg(direction, Type::UINT),
            Literal::Int(value),
        )
    }

    fn run(method: &mut Method) {
        let module = Module::new("unit");
        combine_bus_setup(&module, method, &Config::default()).unwrap();
    }

    fn lines(method: &Method) -> Vec<String> {
        method
            .blocks
            .iter()
            .flat_map(|b| b.iter())
            .map(|h| instruction_string(method, method.instr(h)))
            .collect()
    }

    #[test]
    fn duplicate_setup_is_dropped() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        method
            .append_to_block(block, setup(Register::BusReadSetup, 0x900))
            .unwrap();
        method
            .append_to_block(block, setup(Register::BusReadSetup, 0x900))
            .unwrap();

        run(&mut method);
        assert_eq!(lines(&method), vec!["start:", "$bus_rd_setup = ldi 2304"]);
    }

    #[test]
    fn changed_value_is_kept() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        method
            .append_to_block(block, setup(Register::BusReadSetup, 1))
            .unwrap();
        method
            .append_to_block(block, setup(Register::BusReadSetup, 2))
            .unwrap();

        run(&mut method);
        assert_eq!(lines(&method).len(), 3);
    }

    #[test]
    fn intervening_transfer_invalidates_the_setup() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        let v = method.add_local(IrLocal::new("%v", Type::INT)).unwrap();
        method
            .append_to_block(block, setup(Register::BusReadSetup, 7))
            .unwrap();
        // reading the data port consumes the configured transfer
        method
            .append_to_block(
                block,
                Instruction::mov(
                    Value::local(v, Type::INT),
                    Value::reg(Register::BusData, Type::INT),
                ),
            )
            .unwrap();
        method
            .append_to_block(block, setup(Register::BusReadSetup, 7))
            .unwrap();

        run(&mut method);
        assert_eq!(lines(&method).len(), 4);
    }

    #[test]
    fn directions_are_tracked_independently() {
        let mut method = Method::new("kernel");
        let block = method.create_block("start");
        let addr = method.add_local(IrLocal::new("%addr", Type::POINTER)).unwrap();
        method
            .append_to_block(block, setup(Register::BusWriteSetup, 3))
            .unwrap();
        // a read-direction access does not disturb the write setup
        method
            .append_to_block(
                block,
                Instruction::mov(
                    Value::reg(Register::BusReadAddr, Type::POINTER),
                    Value::local(addr, Type::POINTER),
                ),
            )
            .unwrap();
        method
            .append_to_block(block, setup(Register::BusWriteSetup, 3))
            .unwrap();

        run(&mut method);
        assert_eq!(
            lines(&method),
            vec![
                "start:",
                "$bus_wr_setup = ldi 3",
                "$bus_rd_addr = %addr"
            ]
        );
    }
}
