//! Opaque handles for IR entities.
//!
//! All references into the IR are u32 indices, not pointers. Instruction and
//! block references index into the owning function's arenas; global, function,
//! and alias ids index into the module.

use crate::constant::Constant;
use crate::instruction::InlineAsm;
use crate::types::Type;

/// Reference to an instruction in a function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstRef(pub u32);

impl InstRef {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Reference to a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef(pub u32);

impl BlockRef {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Reference to a global variable in the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Reference to a function in the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Reference to a global alias in the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasId(pub u32);

/// An instruction operand.
///
/// Globals and aliases are distinct from immediate constants at operand
/// position: a reference to a named global hashes by name, while a constant
/// subtree hashes structurally.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Function argument, by declaration index.
    Arg(u32),
    /// Result of an instruction.
    Inst(InstRef),
    /// Basic block label (phi incoming edges, block addresses).
    Block(BlockRef),
    /// Immediate constant.
    Const(Constant),
    /// Reference to a module global variable.
    Global(GlobalId),
    /// Reference to a module alias.
    Alias(AliasId),
    /// Inline assembly callee.
    Asm(InlineAsm),
}

/// An operand together with its type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub ty: Type,
    pub value: Value,
}

impl TypedValue {
    pub fn new(ty: Type, value: Value) -> Self {
        Self { ty, value }
    }
}
