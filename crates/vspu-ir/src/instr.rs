//! The instruction catalog.
//!
//! Instructions are a closed tagged variant; the hazard rules in the
//! scheduler match on it exhaustively. The use map an instruction induces on
//! locals is derived from its operand and result fields on demand and is
//! never stored.

use crate::arena::Handle;
use crate::local::{Access, Local};
use crate::types::Literal;
use crate::value::Value;

/// The hardware reason a placeholder instruction exists.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum DelayType {
    /// Delay slots after a branch. These are created during code generation
    /// and never filled here.
    BranchDelay,
    /// Delay slots after the thread-end signal; nothing follows them.
    ThreadEnd,
    /// A written value needs one instruction of latency before consumption.
    WaitRegister,
    /// A special-function unit request is in flight.
    WaitSfu,
    /// A texture unit lookup is in flight.
    WaitTmu,
}

/// Per-element condition flags gating execution.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Condition {
    Always,
    ZeroSet,
    ZeroClear,
    NegativeSet,
    NegativeClear,
    CarrySet,
    CarryClear,
}

impl Condition {
    /// Returns `true` unless the instruction executes unconditionally.
    pub fn is_conditional(self) -> bool {
        self != Self::Always
    }
}

/// The signaling field attached to an instruction.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Signal {
    None,
    /// Yield to the other hardware thread after this instruction.
    ThreadSwitch,
    /// Final instruction of the kernel.
    ProgramEnd,
    /// Latch the pending TMU0 response into the result register.
    LoadTmu0,
    /// Latch the pending TMU1 response into the result register.
    LoadTmu1,
}

impl Signal {
    /// Returns `true` if the signal has observable hardware effects.
    pub fn has_side_effects(self) -> bool {
        self != Self::None
    }
}

/// Result packing applied on write-back.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum PackMode {
    None,
    /// Pack into the lower 16-bit half.
    Pack16a,
    /// Pack into the upper 16-bit half.
    Pack16b,
    /// Replicate the low byte across the word.
    Pack8888,
}

impl PackMode {
    /// Returns `true` if a packing transform is applied.
    pub fn is_active(self) -> bool {
        self != Self::None
    }
}

/// Which execution pipeline an ALU operation runs on.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Pipeline {
    Add,
    Mul,
    /// Executable on either pipeline (moves).
    Either,
}

/// The ALU operation catalog. Numeric encodings live in the emitter, not
/// here.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum OpCode {
    Add,
    Sub,
    Min,
    Max,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Asr,
    FAdd,
    FSub,
    FMin,
    FMax,
    Mul24,
    FMul,
    V8Muld,
}

impl OpCode {
    /// The pipeline this operation executes on.
    pub fn pipeline(self) -> Pipeline {
        match self {
            Self::Mul24 | Self::FMul | Self::V8Muld => Pipeline::Mul,
            _ => Pipeline::Add,
        }
    }
}

/// The payload of an instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum InstructionKind {
    /// Start of a basic block. Never encoded, never reordered.
    Label { name: String },
    /// Free-form annotation. Never encoded.
    Comment { text: String },
    /// A delay-slot placeholder. Encoded as a hardware no-op.
    Nop { delay: DelayType },
    /// Control transfer to a labeled block. Never reordered.
    Branch { target: String, conditional: bool },
    /// Explicit memory ordering point. Never reordered, not encoded.
    MemoryBarrier,
    /// An ALU operation.
    Op {
        op: OpCode,
        dest: Value,
        args: Vec<Value>,
    },
    /// A plain copy.
    Move { dest: Value, src: Value },
    /// Materialize an immediate.
    LoadImmediate { dest: Value, value: Literal },
    /// Rotate values across SIMD lanes. The source must live in an
    /// accumulator when this reaches the hardware.
    Rotate {
        dest: Value,
        src: Value,
        offset: Value,
    },
    /// A fused add-pipeline/mul-pipeline pair produced by the peephole
    /// combiner.
    Combined {
        first: Box<Instruction>,
        second: Box<Instruction>,
    },
}

/// One unit of the instruction stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub condition: Condition,
    pub signal: Signal,
    pub sets_flags: bool,
    pub pack: PackMode,
    /// Cleared to pin an instruction against peephole fusion. Preserved
    /// across replacement by the scheduler.
    pub can_be_combined: bool,
}

impl Instruction {
    /// Wraps a kind with default execution modifiers.
    pub fn new(kind: InstructionKind) -> Self {
        Self {
            kind,
            condition: Condition::Always,
            signal: Signal::None,
            sets_flags: false,
            pack: PackMode::None,
            can_be_combined: true,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::new(InstructionKind::Label { name: name.into() })
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(InstructionKind::Comment { text: text.into() })
    }

    pub fn nop(delay: DelayType) -> Self {
        Self::new(InstructionKind::Nop { delay })
    }

    pub fn branch(target: impl Into<String>, conditional: bool) -> Self {
        Self::new(InstructionKind::Branch {
            target: target.into(),
            conditional,
        })
    }

    pub fn barrier() -> Self {
        Self::new(InstructionKind::MemoryBarrier)
    }

    pub fn mov(dest: Value, src: Value) -> Self {
        Self::new(InstructionKind::Move { dest, src })
    }

    pub fn load(dest: Value, value: Literal) -> Self {
        Self::new(InstructionKind::LoadImmediate { dest, value })
    }

    pub fn rotate(dest: Value, src: Value, offset: Value) -> Self {
        Self::new(InstructionKind::Rotate { dest, src, offset })
    }

    pub fn op(op: OpCode, dest: Value, args: Vec<Value>) -> Self {
        Self::new(InstructionKind::Op { op, dest, args })
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_pack(mut self, pack: PackMode) -> Self {
        self.pack = pack;
        self
    }

    pub fn setting_flags(mut self) -> Self {
        self.sets_flags = true;
        self
    }

    pub fn not_combinable(mut self) -> Self {
        self.can_be_combined = false;
        self
    }

    /// The primary result value. For a fused pair this is the first part's
    /// result; use [`outputs`](Self::outputs) to see both.
    pub fn output(&self) -> Option<&Value> {
        match &self.kind {
            InstructionKind::Op { dest, .. }
            | InstructionKind::Move { dest, .. }
            | InstructionKind::LoadImmediate { dest, .. }
            | InstructionKind::Rotate { dest, .. } => Some(dest),
            InstructionKind::Combined { first, .. } => first.output(),
            _ => None,
        }
    }

    /// All result values (a fused pair has up to two).
    pub fn outputs(&self) -> Vec<&Value> {
        match &self.kind {
            InstructionKind::Combined { first, second } => {
                let mut out = first.outputs();
                out.extend(second.outputs());
                out
            }
            _ => self.output().into_iter().collect(),
        }
    }

    /// The argument values, in operand order.
    pub fn arguments(&self) -> Vec<&Value> {
        match &self.kind {
            InstructionKind::Op { args, .. } => args.iter().collect(),
            InstructionKind::Move { src, .. } => vec![src],
            InstructionKind::Rotate { src, offset, .. } => vec![src, offset],
            InstructionKind::Combined { first, second } => {
                let mut args = first.arguments();
                args.extend(second.arguments());
                args
            }
            _ => Vec::new(),
        }
    }

    /// The `index`-th argument, if present.
    pub fn argument(&self, index: usize) -> Option<&Value> {
        self.arguments().into_iter().nth(index)
    }

    /// Mutable access to the argument values.
    pub fn arguments_mut(&mut self) -> Vec<&mut Value> {
        match &mut self.kind {
            InstructionKind::Op { args, .. } => args.iter_mut().collect(),
            InstructionKind::Move { src, .. } => vec![src],
            InstructionKind::Rotate { src, offset, .. } => vec![src, offset],
            InstructionKind::Combined { first, second } => {
                let mut args = first.arguments_mut();
                args.extend(second.arguments_mut());
                args
            }
            _ => Vec::new(),
        }
    }

    /// The delay type, if this is a placeholder.
    pub fn nop_delay(&self) -> Option<DelayType> {
        match self.kind {
            InstructionKind::Nop { delay } => Some(delay),
            _ => None,
        }
    }

    /// Derives the map of every local this instruction touches. One entry
    /// per local, with the union of its access flags.
    pub fn used_locals(&self) -> Vec<(Handle<Local>, Access)> {
        let mut uses: Vec<(Handle<Local>, Access)> = Vec::new();
        let mut add = |local: Handle<Local>, access: Access| {
            match uses.iter_mut().find(|(l, _)| *l == local) {
                Some((_, a)) => *a |= access,
                None => uses.push((local, access)),
            }
        };
        for out in self.outputs() {
            if let Some(local) = out.local_handle() {
                add(local, Access::WRITER);
            }
        }
        for arg in self.arguments() {
            if let Some(local) = arg.local_handle() {
                add(local, Access::READER);
            }
        }
        uses
    }

    /// Returns `true` if the derived use map reads the given local.
    pub fn reads_local(&self, local: Handle<Local>) -> bool {
        self.used_locals()
            .iter()
            .any(|(l, a)| *l == local && a.contains(Access::READER))
    }

    /// Returns `true` if the derived use map writes the given local.
    pub fn writes_local(&self, local: Handle<Local>) -> bool {
        self.used_locals()
            .iter()
            .any(|(l, a)| *l == local && a.contains(Access::WRITER))
    }

    /// Returns `true` if execution is gated on condition flags.
    pub fn has_conditional_execution(&self) -> bool {
        if self.condition.is_conditional() {
            return true;
        }
        match &self.kind {
            InstructionKind::Combined { first, second } => {
                first.has_conditional_execution() || second.has_conditional_execution()
            }
            InstructionKind::Branch { conditional, .. } => *conditional,
            _ => false,
        }
    }

    /// Returns `true` if the instruction signals or sets flags. Register
    /// side effects are tracked separately through the hazard table.
    pub fn has_side_effects(&self) -> bool {
        if self.signal.has_side_effects() || self.sets_flags {
            return true;
        }
        match &self.kind {
            InstructionKind::Combined { first, second } => {
                first.has_side_effects() || second.has_side_effects()
            }
            _ => false,
        }
    }

    /// Returns `true` if a packing transform applies to any result.
    pub fn uses_packing(&self) -> bool {
        if self.pack.is_active() {
            return true;
        }
        match &self.kind {
            InstructionKind::Combined { first, second } => {
                first.uses_packing() || second.uses_packing()
            }
            _ => false,
        }
    }

    /// Returns `true` if this instruction participates in final encoding.
    /// Labels, comments, and barriers are scheduling artifacts that occupy
    /// no machine cycle.
    pub fn maps_to_machine_instruction(&self) -> bool {
        !matches!(
            self.kind,
            InstructionKind::Label { .. }
                | InstructionKind::Comment { .. }
                | InstructionKind::MemoryBarrier
        )
    }
}
