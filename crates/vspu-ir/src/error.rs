//! Error types for the VSPU IR.

/// Errors raised by IR mutation and the use-def registry.
///
/// All of these indicate a programming error in a pass, not a property of
/// the input program; they abort compilation of the affected method.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A use count was decremented for an instruction with no use record.
    #[error("local '{local}' has no use record for instruction #{user}")]
    UntrackedUser { local: String, user: usize },

    /// Two locals with the same name in one method.
    #[error("duplicate local name '{0}'")]
    DuplicateLocal(String),

    /// A label was inserted anywhere but the start of a basic block.
    #[error("labels can only start a basic block")]
    MisplacedLabel,

    /// An instruction was inserted before a block's label.
    #[error("cannot insert before the start of a basic block")]
    InsertAtBlockStart,

    /// A cursor used for replace/remove/detach addressed no instruction.
    #[error("cursor at block {block}, slot {slot} does not address an instruction")]
    VacantSlot { block: usize, slot: usize },

    /// A cursor pointed outside its block.
    #[error("cursor at block {block}, slot {slot} is out of bounds")]
    OutOfBounds { block: usize, slot: usize },
}
