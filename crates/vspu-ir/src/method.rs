//! Methods, basic blocks, and the instruction cursor.
//!
//! A block is an ordered sequence of slots over the method's instruction
//! arena. Detaching an instruction leaves a tombstone (`None`) so that
//! outstanding cursors keep addressing the same positions; tombstones are
//! compacted once at the end of a whole pass via [`Method::compact`].
//!
//! Every mutation that adds or removes an instruction from a block also
//! updates the use-def registry of the locals it touches. Passes must go
//! through these methods; editing a block by hand would desynchronize the
//! registry.
//!
//! Cursors are plain positions, not borrows. The mutation discipline is:
//! one active cursor performs a mutation, then any other cursor into the
//! same block must be explicitly repositioned before it is trusted.

use crate::arena::{Arena, Handle};
use crate::error::IrError;
use crate::instr::{Instruction, InstructionKind};
use crate::local::{Access, Local};
use crate::types::Type;
use crate::value::ValueKind;

/// An ordered, mutable sequence of instruction slots.
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    slots: Vec<Option<Handle<Instruction>>>,
}

impl BasicBlock {
    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the block has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The occupant of a slot, if the slot exists and is not a tombstone.
    pub fn handle_at(&self, slot: usize) -> Option<Handle<Instruction>> {
        self.slots.get(slot).copied().flatten()
    }

    /// Iterates over the occupied slots in order.
    pub fn iter(&self) -> impl Iterator<Item = Handle<Instruction>> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }

    /// The block's label instruction (slot 0).
    pub fn label(&self) -> Option<Handle<Instruction>> {
        self.handle_at(0)
    }
}

/// A stable position inside a method: block index plus slot index. A slot
/// index equal to the block length is the end-of-block position.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Cursor {
    pub block: usize,
    pub slot: usize,
}

/// A single kernel function: locals, instructions, and blocks.
#[derive(Clone, Debug)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<Handle<Local>>,
    pub locals: Arena<Local>,
    pub instructions: Arena<Instruction>,
    pub blocks: Vec<BasicBlock>,
    next_temp: u32,
}

impl Method {
    /// Creates an empty method.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            locals: Arena::new(),
            instructions: Arena::new(),
            blocks: Vec::new(),
            next_temp: 0,
        }
    }

    /// Appends a new basic block starting with a label instruction and
    /// returns its index.
    pub fn create_block(&mut self, label: impl Into<String>) -> usize {
        let handle = self.instructions.append(Instruction::label(label));
        self.blocks.push(BasicBlock {
            slots: vec![Some(handle)],
        });
        self.blocks.len() - 1
    }

    /// Adds a local, enforcing name uniqueness within the method.
    pub fn add_local(&mut self, local: Local) -> Result<Handle<Local>, IrError> {
        if self.locals.iter().any(|(_, l)| l.name == local.name) {
            return Err(IrError::DuplicateLocal(local.name));
        }
        Ok(self.locals.append(local))
    }

    /// Adds a parameter local and records it in declaration order.
    pub fn add_parameter(&mut self, local: Local) -> Result<Handle<Local>, IrError> {
        let handle = self.add_local(local)?;
        self.parameters.push(handle);
        Ok(handle)
    }

    /// Creates a fresh uniquely-named temporary (`%prefix.N`).
    pub fn add_new_local(&mut self, ty: Type, prefix: &str) -> Handle<Local> {
        loop {
            let name = format!("%{}.{}", prefix, self.next_temp);
            self.next_temp += 1;
            if !self.locals.iter().any(|(_, l)| l.name == name) {
                return self.locals.append(Local::new(name, ty));
            }
        }
    }

    /// Cursor at the very first slot of the method.
    pub fn begin(&self) -> Cursor {
        Cursor { block: 0, slot: 0 }
    }

    /// The end-of-block cursor for a block.
    pub fn block_end(&self, block: usize) -> Cursor {
        Cursor {
            block,
            slot: self.blocks.get(block).map_or(0, BasicBlock::len),
        }
    }

    pub fn is_start_of_block(&self, cursor: Cursor) -> bool {
        cursor.slot == 0
    }

    pub fn is_end_of_block(&self, cursor: Cursor) -> bool {
        match self.blocks.get(cursor.block) {
            Some(block) => cursor.slot >= block.len(),
            None => true,
        }
    }

    pub fn is_start_of_method(&self, cursor: Cursor) -> bool {
        cursor.block == 0 && cursor.slot == 0
    }

    pub fn is_end_of_method(&self, cursor: Cursor) -> bool {
        match self.blocks.len() {
            0 => true,
            n => cursor.block >= n - 1 && self.is_end_of_block(cursor),
        }
    }

    /// The next position within the same block (saturating at end-of-block).
    pub fn next_in_block(&self, cursor: Cursor) -> Cursor {
        let end = self.block_end(cursor.block).slot;
        Cursor {
            block: cursor.block,
            slot: (cursor.slot + 1).min(end),
        }
    }

    /// The previous position within the same block, if any.
    pub fn prev_in_block(&self, cursor: Cursor) -> Option<Cursor> {
        (cursor.slot > 0).then(|| Cursor {
            block: cursor.block,
            slot: cursor.slot - 1,
        })
    }

    /// The next position, falling through to the following block.
    pub fn next_in_method(&self, cursor: Cursor) -> Cursor {
        let next = self.next_in_block(cursor);
        if self.is_end_of_block(next) && cursor.block + 1 < self.blocks.len() {
            Cursor {
                block: cursor.block + 1,
                slot: 0,
            }
        } else {
            next
        }
    }

    /// The instruction at a cursor, unless the slot is a tombstone or the
    /// cursor is at an end position.
    pub fn instruction_at(&self, cursor: Cursor) -> Option<Handle<Instruction>> {
        self.blocks.get(cursor.block)?.handle_at(cursor.slot)
    }

    /// Shorthand for arena access.
    pub fn instr(&self, handle: Handle<Instruction>) -> &Instruction {
        &self.instructions[handle]
    }

    /// Shorthand for mutable arena access.
    pub fn instr_mut(&mut self, handle: Handle<Instruction>) -> &mut Instruction {
        &mut self.instructions[handle]
    }

    /// Number of occupied slots across all blocks.
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.iter().count()).sum()
    }

    fn register_uses(&mut self, handle: Handle<Instruction>) {
        let uses = self.instructions[handle].used_locals();
        for (local, access) in uses {
            self.locals[local].add_user(handle, access);
        }
    }

    fn unregister_uses(&mut self, handle: Handle<Instruction>) {
        let uses = self.instructions[handle].used_locals();
        for (local, _) in uses {
            // Wholesale removal never fails.
            let _ = self.locals[local].remove_user(handle, Access::BOTH);
        }
    }

    /// Appends an instruction at the end of a block, registering its uses.
    pub fn append_to_block(
        &mut self,
        block: usize,
        instruction: Instruction,
    ) -> Result<Handle<Instruction>, IrError> {
        if matches!(instruction.kind, InstructionKind::Label { .. }) {
            return Err(IrError::MisplacedLabel);
        }
        if block >= self.blocks.len() {
            return Err(IrError::OutOfBounds { block, slot: 0 });
        }
        let handle = self.instructions.append(instruction);
        self.blocks[block].slots.push(Some(handle));
        self.register_uses(handle);
        Ok(handle)
    }

    /// Inserts an instruction before `cursor`, registering its uses. The
    /// end-of-block cursor appends. Positions at or after `cursor` shift by
    /// one; the caller owns repositioning any other cursor it still holds.
    pub fn insert_at(
        &mut self,
        cursor: Cursor,
        instruction: Instruction,
    ) -> Result<Handle<Instruction>, IrError> {
        if matches!(instruction.kind, InstructionKind::Label { .. }) {
            return Err(IrError::MisplacedLabel);
        }
        if cursor.slot == 0 {
            return Err(IrError::InsertAtBlockStart);
        }
        let block = self
            .blocks
            .get_mut(cursor.block)
            .ok_or(IrError::OutOfBounds {
                block: cursor.block,
                slot: cursor.slot,
            })?;
        if cursor.slot > block.len() {
            return Err(IrError::OutOfBounds {
                block: cursor.block,
                slot: cursor.slot,
            });
        }
        let handle = self.instructions.append(instruction);
        self.blocks[cursor.block].slots.insert(cursor.slot, Some(handle));
        self.register_uses(handle);
        Ok(handle)
    }

    /// Replaces the occupant of a slot with a new instruction. The old
    /// instruction's use records are dropped wholesale; the new one is
    /// registered. Labels cannot be replaced or introduced this way.
    pub fn replace_at(
        &mut self,
        cursor: Cursor,
        instruction: Instruction,
    ) -> Result<Handle<Instruction>, IrError> {
        if matches!(instruction.kind, InstructionKind::Label { .. }) {
            return Err(IrError::MisplacedLabel);
        }
        let old = self.occupant(cursor)?;
        if matches!(self.instructions[old].kind, InstructionKind::Label { .. }) {
            return Err(IrError::MisplacedLabel);
        }
        self.unregister_uses(old);
        let handle = self.instructions.append(instruction);
        self.blocks[cursor.block].slots[cursor.slot] = Some(handle);
        self.register_uses(handle);
        Ok(handle)
    }

    /// Removes the occupant of a slot, dropping its use records and leaving
    /// a tombstone.
    pub fn remove_at(&mut self, cursor: Cursor) -> Result<(), IrError> {
        let old = self.occupant(cursor)?;
        if matches!(self.instructions[old].kind, InstructionKind::Label { .. }) {
            return Err(IrError::MisplacedLabel);
        }
        self.unregister_uses(old);
        self.blocks[cursor.block].slots[cursor.slot] = None;
        Ok(())
    }

    /// Detaches the occupant of a slot without touching its use records,
    /// leaving a tombstone. The handle keeps its identity and may be
    /// reinstalled elsewhere with [`install_at`](Self::install_at).
    pub fn detach_at(&mut self, cursor: Cursor) -> Result<Handle<Instruction>, IrError> {
        let handle = self.occupant(cursor)?;
        if matches!(self.instructions[handle].kind, InstructionKind::Label { .. }) {
            return Err(IrError::MisplacedLabel);
        }
        self.blocks[cursor.block].slots[cursor.slot] = None;
        Ok(handle)
    }

    /// Installs a detached instruction into an occupied slot, discarding the
    /// current occupant (its use records are dropped wholesale).
    pub fn install_at(
        &mut self,
        cursor: Cursor,
        handle: Handle<Instruction>,
    ) -> Result<(), IrError> {
        let old = self.occupant(cursor)?;
        if matches!(self.instructions[old].kind, InstructionKind::Label { .. }) {
            return Err(IrError::MisplacedLabel);
        }
        self.unregister_uses(old);
        self.blocks[cursor.block].slots[cursor.slot] = Some(handle);
        Ok(())
    }

    fn occupant(&self, cursor: Cursor) -> Result<Handle<Instruction>, IrError> {
        self.instruction_at(cursor).ok_or(IrError::VacantSlot {
            block: cursor.block,
            slot: cursor.slot,
        })
    }

    /// Drops all tombstone slots. Run once at the end of a whole pass; any
    /// cursor held across this call is invalid.
    pub fn compact(&mut self) {
        for block in &mut self.blocks {
            block.slots.retain(Option::is_some);
        }
    }

    /// Replaces every argument reference to `old` with `new` in one
    /// instruction and moves the reader registration accordingly. Result
    /// operands are left untouched.
    pub fn rewrite_reader(
        &mut self,
        user: Handle<Instruction>,
        old: Handle<Local>,
        new: Handle<Local>,
    ) -> Result<(), IrError> {
        let mut replaced = false;
        for arg in self.instructions[user].arguments_mut() {
            if let ValueKind::Local { local, .. } = &mut arg.kind {
                if *local == old {
                    *local = new;
                    replaced = true;
                }
            }
        }
        if !replaced {
            return Ok(());
        }
        self.locals[old].remove_user(user, Access::READER)?;
        self.locals[new].add_user(user, Access::READER);
        Ok(())
    }

    /// Returns `true` if every registered user of `local` occurs within
    /// `window` encoded instructions starting at `writer`, inside the
    /// writer's block. Users in other blocks or beyond the window make the
    /// live range too long for an accumulator.
    pub fn is_locally_limited(
        &self,
        writer: Cursor,
        local: Handle<Local>,
        window: usize,
    ) -> bool {
        let users: Vec<Handle<Instruction>> =
            self.locals[local].users().iter().map(|(u, _)| *u).collect();
        if users.is_empty() {
            return true;
        }
        let mut seen = vec![false; users.len()];
        let mut cursor = writer;
        let mut steps = 0usize;
        while !self.is_end_of_block(cursor) && steps <= window {
            if let Some(handle) = self.instruction_at(cursor) {
                if let Some(i) = users.iter().position(|u| *u == handle) {
                    seen[i] = true;
                }
                if self.instructions[handle].maps_to_machine_instruction() {
                    steps += 1;
                }
            }
            cursor = self.next_in_block(cursor);
        }
        seen.iter().all(|&s| s)
    }
}

/// A compilation unit: module-scope values plus its methods.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub name: String,
    /// Module-scope locals (globals); metadata for downstream emission.
    pub globals: Arena<Local>,
    pub methods: Vec<Method>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Arena::new(),
            methods: Vec::new(),
        }
    }

    /// Adds a module-scope local, enforcing name uniqueness.
    pub fn add_global(&mut self, local: Local) -> Result<Handle<Local>, IrError> {
        if self.globals.iter().any(|(_, l)| l.name == local.name) {
            return Err(IrError::DuplicateLocal(local.name));
        }
        Ok(self.globals.append(local))
    }
}
