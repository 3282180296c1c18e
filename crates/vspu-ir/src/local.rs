//! Locals and the use-def registry.
//!
//! A [`Local`] is a uniquely-named, typed storage slot. Every instruction
//! that touches it holds a use record with read/write counters, kept in
//! insertion order for deterministic traversal. The records are maintained
//! purely as a side effect of instruction mutation through
//! [`Method`](crate::Method); they are the single source of truth that the
//! scheduler, dead-code elimination, and register allocation rely on.

use crate::arena::Handle;
use crate::error::IrError;
use crate::instr::Instruction;
use crate::types::{Literal, Type};

/// Flag set describing how an instruction touches a local.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Access(u8);

impl Access {
    /// No access.
    pub const NONE: Self = Self(0);
    /// The instruction reads the local.
    pub const READER: Self = Self(1);
    /// The instruction writes the local.
    pub const WRITER: Self = Self(2);
    /// The instruction both reads and writes the local.
    pub const BOTH: Self = Self(3);

    /// Returns `true` if `self` contains all flags in `other`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Access {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Access {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Read/write counters for one (local, instruction) pair.
///
/// A record exists exactly as long as either counter is non-zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LocalUse {
    pub num_reads: u32,
    pub num_writes: u32,
}

impl LocalUse {
    /// Returns `true` if the user currently reads the local.
    pub fn reads(self) -> bool {
        self.num_reads > 0
    }

    /// Returns `true` if the user currently writes the local.
    pub fn writes(self) -> bool {
        self.num_writes > 0
    }

    fn matches(self, access: Access) -> bool {
        (access.contains(Access::READER) && self.reads())
            || (access.contains(Access::WRITER) && self.writes())
    }
}

/// What kind of storage a local represents.
#[derive(Clone, Debug, PartialEq)]
pub enum LocalKind {
    /// A method-lifetime temporary.
    Temporary,
    /// A kernel parameter with direction flags.
    Parameter { input: bool, output: bool },
    /// A module-scope value with an initializer.
    Global { init: Literal },
}

/// A uniquely-named, typed storage slot.
#[derive(Clone, Debug)]
pub struct Local {
    pub name: String,
    pub ty: Type,
    pub kind: LocalKind,
    /// Aliasing metadata: this local names part of another object, at the
    /// given element index (`None` = the whole object). Never an ownership
    /// relation.
    pub reference: Option<(Handle<Local>, Option<u32>)>,
    users: Vec<(Handle<Instruction>, LocalUse)>,
}

impl PartialEq for Local {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Local {
    /// Creates a temporary local.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self::with_kind(name, ty, LocalKind::Temporary)
    }

    /// Creates a local of the given kind.
    pub fn with_kind(name: impl Into<String>, ty: Type, kind: LocalKind) -> Self {
        Self {
            name: name.into(),
            ty,
            kind,
            reference: None,
            users: Vec::new(),
        }
    }

    /// Returns `true` for an input parameter.
    pub fn is_input(&self) -> bool {
        matches!(self.kind, LocalKind::Parameter { input: true, .. })
    }

    /// Returns `true` for an output parameter.
    pub fn is_output(&self) -> bool {
        matches!(self.kind, LocalKind::Parameter { output: true, .. })
    }

    /// Registers (or accumulates onto) a use record for `user`.
    pub fn add_user(&mut self, user: Handle<Instruction>, access: Access) {
        let pos = match self.users.iter().position(|(u, _)| *u == user) {
            Some(pos) => pos,
            None => {
                self.users.push((user, LocalUse::default()));
                self.users.len() - 1
            }
        };
        let use_ = &mut self.users[pos].1;
        if access.contains(Access::READER) {
            use_.num_reads += 1;
        }
        if access.contains(Access::WRITER) {
            use_.num_writes += 1;
        }
    }

    /// Removes a use of this local.
    ///
    /// With [`Access::BOTH`] the record is dropped unconditionally (used
    /// when an instruction is deleted wholesale; idempotent). Otherwise the
    /// matching counters are decremented and the record is dropped once both
    /// reach zero. Decrementing without a record is an invariant violation.
    pub fn remove_user(
        &mut self,
        user: Handle<Instruction>,
        access: Access,
    ) -> Result<(), IrError> {
        if access == Access::BOTH {
            self.users.retain(|(u, _)| *u != user);
            return Ok(());
        }
        let pos = self
            .users
            .iter()
            .position(|(u, _)| *u == user)
            .ok_or_else(|| IrError::UntrackedUser {
                local: self.name.clone(),
                user: user.index(),
            })?;
        let use_ = &mut self.users[pos].1;
        if access.contains(Access::READER) {
            use_.num_reads = use_.num_reads.saturating_sub(1);
        }
        if access.contains(Access::WRITER) {
            use_.num_writes = use_.num_writes.saturating_sub(1);
        }
        if !use_.reads() && !use_.writes() {
            self.users.remove(pos);
        }
        Ok(())
    }

    /// All use records, in insertion order.
    pub fn users(&self) -> &[(Handle<Instruction>, LocalUse)] {
        &self.users
    }

    /// The use record for `user`, if one exists.
    pub fn use_of(&self, user: Handle<Instruction>) -> Option<LocalUse> {
        self.users
            .iter()
            .find(|(u, _)| *u == user)
            .map(|(_, use_)| *use_)
    }

    /// Snapshot of the users whose record matches the access filter.
    pub fn users_matching(&self, access: Access) -> Vec<Handle<Instruction>> {
        self.users
            .iter()
            .filter(|(_, use_)| use_.matches(access))
            .map(|(u, _)| *u)
            .collect()
    }

    /// Push-style traversal over a snapshot of the matching users. The
    /// registry must not be mutated while the traversal runs.
    pub fn for_users(&self, access: Access, mut consumer: impl FnMut(Handle<Instruction>)) {
        for user in self.users_matching(access) {
            consumer(user);
        }
    }

    /// The unique writer, if exactly one exists.
    ///
    /// Both "no writer" and "several writers" yield `None`; callers that
    /// need to tell them apart must inspect the user list themselves.
    pub fn single_writer(&self) -> Option<Handle<Instruction>> {
        let mut writer = None;
        for (user, use_) in &self.users {
            if use_.writes() {
                if writer.is_some() {
                    return None;
                }
                writer = Some(*user);
            }
        }
        writer
    }
}
