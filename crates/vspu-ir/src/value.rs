//! Values: the operands and results of instructions.

use crate::arena::Handle;
use crate::local::Local;
use crate::reg::Register;
use crate::types::{Literal, Type};

/// What a [`Value`] designates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueKind {
    /// A named storage slot, optionally a single element of it.
    Local {
        local: Handle<Local>,
        elem: Option<u32>,
    },
    /// A hardware register.
    Register(Register),
    /// An inline constant.
    Literal(Literal),
}

/// A typed operand or result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Value {
    pub ty: Type,
    pub kind: ValueKind,
}

impl Value {
    /// A value referencing a whole local.
    pub fn local(local: Handle<Local>, ty: Type) -> Self {
        Self {
            ty,
            kind: ValueKind::Local { local, elem: None },
        }
    }

    /// A value referencing a single element of a local.
    pub fn local_element(local: Handle<Local>, ty: Type, elem: u32) -> Self {
        Self {
            ty,
            kind: ValueKind::Local {
                local,
                elem: Some(elem),
            },
        }
    }

    /// A hardware register value.
    pub fn reg(register: Register, ty: Type) -> Self {
        Self {
            ty,
            kind: ValueKind::Register(register),
        }
    }

    /// A literal constant value.
    pub fn literal(literal: Literal) -> Self {
        Self {
            ty: Type::scalar(literal.scalar_kind()),
            kind: ValueKind::Literal(literal),
        }
    }

    /// The referenced local, if any.
    pub fn local_handle(&self) -> Option<Handle<Local>> {
        match self.kind {
            ValueKind::Local { local, .. } => Some(local),
            _ => None,
        }
    }

    /// The designated register, if any.
    pub fn register(&self) -> Option<Register> {
        match self.kind {
            ValueKind::Register(r) => Some(r),
            _ => None,
        }
    }

    /// The literal payload, if any.
    pub fn as_literal(&self) -> Option<Literal> {
        match self.kind {
            ValueKind::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// Returns `true` if this value designates exactly the given register.
    pub fn is_register(&self, register: Register) -> bool {
        self.register() == Some(register)
    }

    /// Returns `true` if this value references the given local.
    pub fn has_local(&self, local: Handle<Local>) -> bool {
        self.local_handle() == Some(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_value_accessors() {
        let h: Handle<Local> = Handle::new(3);
        let v = Value::local(h, Type::FLOAT);
        assert_eq!(v.local_handle(), Some(h));
        assert!(v.has_local(h));
        assert_eq!(v.register(), None);
        assert_eq!(v.as_literal(), None);
    }

    #[test]
    fn element_reference() {
        let h: Handle<Local> = Handle::new(0);
        let v = Value::local_element(h, Type::INT, 2);
        assert!(v.has_local(h));
        match v.kind {
            ValueKind::Local { elem, .. } => assert_eq!(elem, Some(2)),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn register_value() {
        let v = Value::reg(Register::Mutex, Type::UINT);
        assert!(v.is_register(Register::Mutex));
        assert!(!v.is_register(Register::Discard));
    }

    #[test]
    fn literal_value_type() {
        let v = Value::literal(Literal::Float(2.0));
        assert_eq!(v.ty, Type::FLOAT);
        assert_eq!(v.as_literal(), Some(Literal::Float(2.0)));
    }
}
