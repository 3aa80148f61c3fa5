//! Function and basic block definitions with arena storage.

use crate::instruction::{AttributeList, Instruction};
use crate::types::Type;
use crate::value::BlockRef;

/// A basic block: a contiguous range of the function's instruction arena.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub inst_start: u32,
    pub inst_count: u32,
}

/// A function in the IR. Block 0 is the entry block.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub calling_conv: u32,
    /// The function's type; must be `Type::Function`.
    pub ty: Type,
    pub attributes: AttributeList,
    pub gc: Option<String>,
    pub section: Option<String>,
    /// Instruction arena: contiguous storage shared by all blocks.
    pub instructions: Vec<Instruction>,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        debug_assert!(matches!(ty, Type::Function { .. }));
        Self {
            name: name.into(),
            calling_conv: 0,
            ty,
            attributes: AttributeList::default(),
            gc: None,
            section: None,
            instructions: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn num_params(&self) -> usize {
        self.ty.num_params()
    }

    pub fn is_var_arg(&self) -> bool {
        matches!(self.ty, Type::Function { var_arg: true, .. })
    }

    pub fn return_type(&self) -> &Type {
        self.ty.return_type().unwrap_or(&Type::Void)
    }

    pub fn entry_block(&self) -> BlockRef {
        BlockRef(0)
    }

    pub fn block(&self, r: BlockRef) -> &BasicBlock {
        &self.blocks[r.index() as usize]
    }

    /// Instructions of a basic block, in order.
    pub fn block_insts(&self, r: BlockRef) -> &[Instruction] {
        let bb = self.block(r);
        let start = bb.inst_start as usize;
        let end = start + bb.inst_count as usize;
        &self.instructions[start..end]
    }

    /// Successors of a block: the terminator's block operands in order.
    /// A block without a terminator has no successors.
    pub fn successors(&self, r: BlockRef) -> Vec<BlockRef> {
        match self.block_insts(r).last() {
            Some(term) if term.is_terminator() => term.successors().collect(),
            _ => Vec::new(),
        }
    }
}
