//! VSPU intermediate representation.
//!
//! An arena-based IR for the optimization backend of the VSPU kernel
//! compiler. Instructions live in per-method arenas and are addressed by
//! stable handles; basic blocks are ordered slot sequences over those
//! handles, mutated through [`Cursor`] positions. Every structural edit is
//! paired with an update of the per-[`Local`] use-def registry, which later
//! passes rely on for legality checks.

pub mod arena;
mod display;
mod error;
mod instr;
mod local;
mod method;
mod reg;
mod types;
mod value;

pub use arena::{Arena, Handle};
pub use display::{dump_method, dump_module, instruction_string, value_string};
pub use error::IrError;
pub use instr::{
    Condition, DelayType, Instruction, InstructionKind, OpCode, PackMode, Pipeline, Signal,
};
pub use local::{Access, Local, LocalKind, LocalUse};
pub use method::{BasicBlock, Cursor, Method, Module};
pub use reg::{BusDirection, HazardGroup, Register};
pub use types::{Literal, ScalarKind, Type, LANE_COUNT};
pub use value::{Value, ValueKind};
