//! Builder API for constructing IR functions.

use crate::function::{BasicBlock, Function};
use crate::instruction::{Detail, Instruction, Opcode, Predicate};
use crate::types::Type;
use crate::value::{BlockRef, InstRef, TypedValue, Value};

/// Builder for filling in a function's blocks and instructions.
pub struct Builder<'a> {
    func: &'a mut Function,
    current_block: Option<BlockRef>,
}

impl<'a> Builder<'a> {
    pub fn new(func: &'a mut Function) -> Self {
        Self {
            func,
            current_block: None,
        }
    }

    /// Create a new basic block and return its reference.
    pub fn create_block(&mut self) -> BlockRef {
        let idx = self.func.blocks.len() as u32;
        self.func.blocks.push(BasicBlock {
            inst_start: self.func.instructions.len() as u32,
            inst_count: 0,
        });
        BlockRef(idx)
    }

    /// Set the current block for subsequent instructions.
    pub fn switch_to_block(&mut self, block: BlockRef) {
        let bb = &mut self.func.blocks[block.index() as usize];
        if bb.inst_count == 0 {
            bb.inst_start = self.func.instructions.len() as u32;
        }
        self.current_block = Some(block);
    }

    /// Append an instruction to the current block.
    pub fn push(&mut self, inst: Instruction) -> InstRef {
        let idx = self.func.instructions.len() as u32;
        self.func.instructions.push(inst);
        let bb = self
            .current_block
            .expect("no current block")
            .index() as usize;
        self.func.blocks[bb].inst_count += 1;
        InstRef(idx)
    }

    /// Operand referring to the given function argument.
    pub fn arg(&self, index: u32) -> TypedValue {
        let ty = match &self.func.ty {
            Type::Function { params, .. } => params[index as usize].clone(),
            _ => unreachable!("function type required"),
        };
        TypedValue::new(ty, Value::Arg(index))
    }

    /// Operand referring to the result of an earlier instruction.
    pub fn result(&self, r: InstRef) -> TypedValue {
        let ty = self.func.instructions[r.index() as usize].ty.clone();
        TypedValue::new(ty, Value::Inst(r))
    }

    // ── Conveniences used pervasively by tests ──

    pub fn add(&mut self, a: TypedValue, b: TypedValue) -> InstRef {
        let ty = a.ty.clone();
        self.push(Instruction::new(Opcode::Add, ty, vec![a, b]))
    }

    pub fn icmp(&mut self, predicate: Predicate, a: TypedValue, b: TypedValue) -> InstRef {
        self.push(
            Instruction::new(Opcode::ICmp, Type::Integer(1), vec![a, b])
                .with_detail(Detail::Cmp { predicate }),
        )
    }

    pub fn ret(&mut self, value: Option<TypedValue>) -> InstRef {
        let operands = value.into_iter().collect();
        self.push(Instruction::new(Opcode::Ret, Type::Void, operands))
    }

    pub fn br(&mut self, target: BlockRef) -> InstRef {
        self.push(Instruction::new(
            Opcode::Br,
            Type::Void,
            vec![TypedValue::new(Type::Label, Value::Block(target))],
        ))
    }

    pub fn cond_br(&mut self, cond: TypedValue, then_bb: BlockRef, else_bb: BlockRef) -> InstRef {
        self.push(Instruction::new(
            Opcode::Br,
            Type::Void,
            vec![
                cond,
                TypedValue::new(Type::Label, Value::Block(then_bb)),
                TypedValue::new(Type::Label, Value::Block(else_bb)),
            ],
        ))
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(TypedValue, BlockRef)>) -> InstRef {
        let blocks = incoming.iter().map(|(_, b)| *b).collect();
        let operands = incoming.into_iter().map(|(v, _)| v).collect();
        self.push(
            Instruction::new(Opcode::Phi, ty, operands)
                .with_detail(Detail::Phi { incoming: blocks }),
        )
    }

    pub fn unreachable(&mut self) -> InstRef {
        self.push(Instruction::new(Opcode::Unreachable, Type::Void, vec![]))
    }
}
