//! Display implementations and text dump for debugging.

use std::fmt;

use crate::instr::{Condition, DelayType, Instruction, InstructionKind, OpCode};
use crate::method::{Method, Module};
use crate::reg::Register;
use crate::types::{Literal, ScalarKind, Type};
use crate::value::{Value, ValueKind};

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "f32",
            Self::Int => "i32",
            Self::Uint => "u32",
            Self::Bool => "bool",
            Self::Pointer => "ptr",
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lanes > 1 {
            write!(f, "{}x{}", self.kind, self.lanes)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SfuRecip => "$sfu_recip",
            Self::SfuRecipSqrt => "$sfu_rsqrt",
            Self::SfuExp2 => "$sfu_exp2",
            Self::SfuLog2 => "$sfu_log2",
            Self::SfuResult => "$sfu_result",
            Self::Tmu0Address => "$tmu0_addr",
            Self::Tmu1Address => "$tmu1_addr",
            Self::BusReadSetup => "$bus_rd_setup",
            Self::BusWriteSetup => "$bus_wr_setup",
            Self::BusReadAddr => "$bus_rd_addr",
            Self::BusWriteAddr => "$bus_wr_addr",
            Self::BusReadBusy => "$bus_rd_busy",
            Self::BusWriteBusy => "$bus_wr_busy",
            Self::BusData => "$bus_data",
            Self::Mutex => "$mutex",
            Self::Uniform => "$uniform",
            Self::Discard => "$discard",
        })
    }
}

impl fmt::Display for DelayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BranchDelay => "branch-delay",
            Self::ThreadEnd => "thread-end",
            Self::WaitRegister => "wait-register",
            Self::WaitSfu => "wait-sfu",
            Self::WaitTmu => "wait-tmu",
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Always => "always",
            Self::ZeroSet => "ifz",
            Self::ZeroClear => "ifnz",
            Self::NegativeSet => "ifn",
            Self::NegativeClear => "ifnn",
            Self::CarrySet => "ifc",
            Self::CarryClear => "ifnc",
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}").to_lowercase();
        f.write_str(&name)
    }
}

/// Renders a value, resolving local names through the method.
pub fn value_string(method: &Method, value: &Value) -> String {
    match value.kind {
        ValueKind::Local { local, elem } => {
            let name = &method.locals[local].name;
            match elem {
                Some(i) => format!("{name}[{i}]"),
                None => name.clone(),
            }
        }
        ValueKind::Register(r) => r.to_string(),
        ValueKind::Literal(l) => l.to_string(),
    }
}

/// Renders one instruction, resolving local names through the method.
pub fn instruction_string(method: &Method, instruction: &Instruction) -> String {
    let mut text = match &instruction.kind {
        InstructionKind::Label { name } => format!("{name}:"),
        InstructionKind::Comment { text } => format!("; {text}"),
        InstructionKind::Nop { delay } => format!("nop ({delay})"),
        InstructionKind::Branch {
            target,
            conditional,
        } => {
            if *conditional {
                format!("br.cond {target}")
            } else {
                format!("br {target}")
            }
        }
        InstructionKind::MemoryBarrier => "fence".to_string(),
        InstructionKind::Op { op, dest, args } => {
            let args: Vec<String> = args.iter().map(|a| value_string(method, a)).collect();
            format!("{} = {op} {}", value_string(method, dest), args.join(", "))
        }
        InstructionKind::Move { dest, src } => format!(
            "{} = {}",
            value_string(method, dest),
            value_string(method, src)
        ),
        InstructionKind::LoadImmediate { dest, value } => {
            format!("{} = ldi {value}", value_string(method, dest))
        }
        InstructionKind::Rotate { dest, src, offset } => format!(
            "{} = rot {}, {}",
            value_string(method, dest),
            value_string(method, src),
            value_string(method, offset)
        ),
        InstructionKind::Combined { first, second } => format!(
            "{{{}; {}}}",
            instruction_string(method, first),
            instruction_string(method, second)
        ),
    };
    if instruction.condition.is_conditional() {
        text.push_str(&format!(" ({})", instruction.condition));
    }
    if instruction.sets_flags {
        text.push_str(" (sf)");
    }
    if instruction.pack.is_active() {
        text.push_str(" (pack)");
    }
    text
}

/// Renders a whole method, one instruction per line, tombstones elided.
pub fn dump_method(method: &Method) -> String {
    let mut out = String::new();
    out.push_str(&format!("method {}:\n", method.name));
    for block in &method.blocks {
        for handle in block.iter() {
            let line = instruction_string(method, &method.instructions[handle]);
            if matches!(method.instructions[handle].kind, InstructionKind::Label { .. }) {
                out.push_str(&format!("{line}\n"));
            } else {
                out.push_str(&format!("  {line}\n"));
            }
        }
    }
    out
}

/// Renders every method of a module.
pub fn dump_module(module: &Module) -> String {
    module
        .methods
        .iter()
        .map(dump_method)
        .collect::<Vec<_>>()
        .join("\n")
}
