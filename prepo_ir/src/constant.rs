//! Constants in the program-repository IR.
//!
//! Integer constants are arbitrary-precision; floating-point constants are
//! canonicalized to their format semantics plus a raw bit pattern, so two
//! constants of different formats never share a representation even when
//! their bit patterns coincide.

use num_bigint::{BigInt, BigUint};

use crate::instruction::Opcode;
use crate::types::Type;
use crate::value::{AliasId, BlockRef, FuncId, GlobalId};

/// Floating-point format semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpSemantics {
    Half,
    Single,
    Double,
    X87DoubleExtended,
    Quad,
    PpcDoubleDouble,
}

impl FpSemantics {
    pub fn precision(self) -> u64 {
        match self {
            FpSemantics::Half => 11,
            FpSemantics::Single => 24,
            FpSemantics::Double => 53,
            FpSemantics::X87DoubleExtended => 64,
            FpSemantics::Quad => 113,
            FpSemantics::PpcDoubleDouble => 106,
        }
    }

    pub fn max_exponent(self) -> i16 {
        match self {
            FpSemantics::Half => 15,
            FpSemantics::Single => 127,
            FpSemantics::Double => 1023,
            FpSemantics::X87DoubleExtended => 16383,
            FpSemantics::Quad => 16383,
            FpSemantics::PpcDoubleDouble => 1023,
        }
    }

    pub fn min_exponent(self) -> i16 {
        match self {
            FpSemantics::Half => -14,
            FpSemantics::Single => -126,
            FpSemantics::Double => -1022,
            FpSemantics::X87DoubleExtended => -16382,
            FpSemantics::Quad => -16382,
            FpSemantics::PpcDoubleDouble => -969,
        }
    }

    pub fn size_in_bits(self) -> u64 {
        match self {
            FpSemantics::Half => 16,
            FpSemantics::Single => 32,
            FpSemantics::Double => 64,
            FpSemantics::X87DoubleExtended => 80,
            FpSemantics::Quad => 128,
            FpSemantics::PpcDoubleDouble => 128,
        }
    }
}

/// COMDAT selection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SelectionKind {
    Any = 0,
    ExactMatch = 1,
    Largest = 2,
    NoDuplicates = 3,
    SameSize = 4,
}

/// A COMDAT attached to a global.
#[derive(Debug, Clone, PartialEq)]
pub struct Comdat {
    pub name: String,
    pub selection_kind: SelectionKind,
}

/// A constant value. Every constant knows its type.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Undef(Type),
    TokenNone,
    AggregateZero(Type),
    PointerNull(Type),
    /// Arbitrary-precision integer of the given integer type.
    Int { ty: Type, value: BigInt },
    /// Floating-point constant: format semantics plus raw bit pattern.
    Fp {
        ty: Type,
        semantics: FpSemantics,
        bits: BigUint,
    },
    Array { ty: Type, elements: Vec<Constant> },
    Struct { ty: Type, fields: Vec<Constant> },
    Vector { ty: Type, elements: Vec<Constant> },
    /// Array of primitive elements stored as raw bytes.
    DataArray { ty: Type, bytes: Vec<u8> },
    /// Vector of primitive elements stored as raw bytes.
    DataVector { ty: Type, bytes: Vec<u8> },
    /// Constant expression over constant operands.
    Expr {
        ty: Type,
        opcode: Opcode,
        operands: Vec<Constant>,
    },
    /// Address of a basic block within a function.
    BlockAddress {
        ty: Type,
        function: FuncId,
        block: BlockRef,
    },
    /// Reference to a module global variable (pointer-typed).
    Global { ty: Type, id: GlobalId },
    /// Reference to a module function (pointer-typed).
    Function { ty: Type, id: FuncId },
    /// Reference to a module alias (pointer-typed).
    Alias { ty: Type, id: AliasId },
}

impl Constant {
    /// The constant's type.
    pub fn ty(&self) -> &Type {
        match self {
            Constant::Undef(ty)
            | Constant::AggregateZero(ty)
            | Constant::PointerNull(ty)
            | Constant::Int { ty, .. }
            | Constant::Fp { ty, .. }
            | Constant::Array { ty, .. }
            | Constant::Struct { ty, .. }
            | Constant::Vector { ty, .. }
            | Constant::DataArray { ty, .. }
            | Constant::DataVector { ty, .. }
            | Constant::Expr { ty, .. }
            | Constant::BlockAddress { ty, .. }
            | Constant::Global { ty, .. }
            | Constant::Function { ty, .. }
            | Constant::Alias { ty, .. } => ty,
            Constant::TokenNone => &Type::Token,
        }
    }

    /// Stable per-kind identifier, hashed for non-global constants.
    pub fn value_id(&self) -> u64 {
        match self {
            Constant::Function { .. } => 0,
            Constant::Alias { .. } => 1,
            Constant::Global { .. } => 2,
            Constant::BlockAddress { .. } => 3,
            Constant::Expr { .. } => 4,
            Constant::Array { .. } => 5,
            Constant::Struct { .. } => 6,
            Constant::Vector { .. } => 7,
            Constant::Undef(_) => 8,
            Constant::AggregateZero(_) => 9,
            Constant::DataArray { .. } => 10,
            Constant::DataVector { .. } => 11,
            Constant::Int { .. } => 12,
            Constant::Fp { .. } => 13,
            Constant::PointerNull(_) => 14,
            Constant::TokenNone => 15,
        }
    }

    /// Integer constant of a `Type::Integer(bits)` type.
    pub fn int(bits: u32, value: impl Into<BigInt>) -> Constant {
        Constant::Int {
            ty: Type::Integer(bits),
            value: value.into(),
        }
    }

    /// Double-precision constant from an `f64` bit pattern.
    pub fn double(value: f64) -> Constant {
        Constant::Fp {
            ty: Type::Double,
            semantics: FpSemantics::Double,
            bits: BigUint::from(value.to_bits()),
        }
    }

    /// Single-precision constant from an `f32` bit pattern.
    pub fn float(value: f32) -> Constant {
        Constant::Fp {
            ty: Type::Float,
            semantics: FpSemantics::Single,
            bits: BigUint::from(value.to_bits()),
        }
    }
}
