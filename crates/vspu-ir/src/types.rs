//! Data types and literal values.

/// Number of SIMD lanes on the VSPU. Vector-lane rotations wrap at this
/// width.
pub const LANE_COUNT: u8 = 16;

/// The scalar element kind of a value.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ScalarKind {
    Float,
    Int,
    Uint,
    Bool,
    /// A device address; only ever moved, never computed with.
    Pointer,
}

/// A VSPU data type: a scalar kind replicated over one or more lanes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Type {
    pub kind: ScalarKind,
    pub lanes: u8,
}

impl Type {
    pub const FLOAT: Self = Self::scalar(ScalarKind::Float);
    pub const INT: Self = Self::scalar(ScalarKind::Int);
    pub const UINT: Self = Self::scalar(ScalarKind::Uint);
    pub const BOOL: Self = Self::scalar(ScalarKind::Bool);
    pub const POINTER: Self = Self::scalar(ScalarKind::Pointer);

    /// A single-lane type.
    pub const fn scalar(kind: ScalarKind) -> Self {
        Self { kind, lanes: 1 }
    }

    /// A multi-lane vector type. Lane counts above [`LANE_COUNT`] are
    /// clamped; the hardware has no wider registers.
    pub const fn vector(kind: ScalarKind, lanes: u8) -> Self {
        let lanes = if lanes > LANE_COUNT { LANE_COUNT } else { lanes };
        Self { kind, lanes }
    }

    /// Returns `true` if this is a single-lane type.
    pub fn is_scalar(self) -> bool {
        self.lanes == 1
    }
}

/// A literal constant.
///
/// Floats compare and hash by bit pattern so literals can key lookup tables
/// (two NaNs with the same payload are the same literal for combining
/// purposes).
#[derive(Clone, Copy, Debug)]
pub enum Literal {
    Int(i64),
    Float(f32),
    Bool(bool),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl std::hash::Hash for Literal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Self::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Self::Float(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
            Self::Bool(v) => {
                2u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl Literal {
    /// Returns the scalar kind this literal carries.
    pub fn scalar_kind(self) -> ScalarKind {
        match self {
            Self::Int(_) => ScalarKind::Int,
            Self::Float(_) => ScalarKind::Float,
            Self::Bool(_) => ScalarKind::Bool,
        }
    }

    /// Returns the integer payload, if this is an integer literal.
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }
}
