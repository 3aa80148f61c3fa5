//! The IR hasher: walks a module's globals and reduces each to a digest.
//!
//! Anonymous values are matched structurally: the first occurrence of an
//! unnamed value fixes a small per-computation number, so renaming or
//! renumbering locals never perturbs the digest. Global initializer graphs
//! may be cyclic; a per-computation numbering table breaks the recursion.

use std::collections::{HashMap, HashSet};

use crate::digest::{Digest, name_guid};
use crate::sink::{DigestSink, Tag};
use prepo_ir::constant::{Constant, FpSemantics};
use prepo_ir::function::Function;
use prepo_ir::instruction::{
    Attribute, AttributeList, Detail, InlineAsm, Instruction, Opcode, OperandBundle,
    RangeMetadata,
};
use prepo_ir::module::Module;
use prepo_ir::types::Type;
use prepo_ir::value::{AliasId, FuncId, GlobalId, Value};

// ---------------------------------------------------------------------------
// Numbering keys
// ---------------------------------------------------------------------------

/// Key for the per-computation local numbering table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LocalKey {
    Arg(u32),
    Inst(u32),
    /// Block identified by (owning function, block index).
    Block(u32, u32),
    Global(u32),
    Alias(u32),
}

// ---------------------------------------------------------------------------
// Calculator state
// ---------------------------------------------------------------------------

struct HashCalculator<'m> {
    module: &'m Module,
    sink: DigestSink,
    /// First-visit numbers for globals with definitive initializers.
    global_numbers: HashMap<GlobalId, u64>,
    /// First-visit numbers for anonymous values.
    local_numbers: HashMap<LocalKey, u64>,
    current_func: Option<FuncId>,
}

impl<'m> HashCalculator<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            sink: DigestSink::new(),
            global_numbers: HashMap::new(),
            local_numbers: HashMap::new(),
            current_func: None,
        }
    }

    fn local_number(&mut self, key: LocalKey) {
        let next = self.local_numbers.len() as u64;
        let n = *self.local_numbers.entry(key).or_insert(next);
        self.sink.number(n);
    }
}

// ---------------------------------------------------------------------------
// Types, attributes, and leaf values
// ---------------------------------------------------------------------------

impl HashCalculator<'_> {
    fn type_hash(&mut self, ty: &Type) {
        self.sink.tag(Tag::Type);
        self.sink.byte(ty.type_id());

        match ty {
            Type::Void
            | Type::Float
            | Type::Double
            | Type::X86Fp80
            | Type::Fp128
            | Type::PpcFp128
            | Type::Label
            | Type::Metadata
            | Type::Token => {}

            Type::Integer(bits) => self.sink.number(*bits as u64),
            Type::Function {
                params,
                var_arg,
                ret,
            } => {
                for param in params {
                    self.type_hash(param);
                }
                self.sink.flag(*var_arg);
                self.type_hash(ret);
            }
            Type::Pointer { address_space } => self.sink.number(*address_space as u64),
            Type::Struct { elements, packed } => {
                for element in elements {
                    self.type_hash(element);
                }
                if *packed {
                    self.sink.flag(*packed);
                }
            }
            Type::Array { len, element } | Type::Vector { len, element } => {
                self.sink.number(*len);
                self.type_hash(element);
            }
        }
    }

    fn apfloat_hash(&mut self, semantics: FpSemantics, bits: &num_bigint::BigUint) {
        self.sink.float(
            semantics.precision(),
            semantics.max_exponent(),
            semantics.min_exponent(),
            semantics.size_in_bits(),
            bits,
        );
    }

    fn attribute_hash(&mut self, attr: &Attribute) {
        match attr {
            Attribute::Enum(kind) => {
                self.sink.tag(Tag::AttributeEnum);
                self.sink.update(&kind.to_le_bytes());
            }
            Attribute::Int(kind, value) => {
                self.sink.tag(Tag::AttributeInt);
                self.sink.update(&kind.to_le_bytes());
                self.sink.number(*value);
            }
            Attribute::String { kind, value } => {
                self.sink.tag(Tag::AttributeString);
                self.sink.string(kind.as_bytes());
                self.sink.string(value.as_bytes());
            }
        }
    }

    fn attribute_list_hash(&mut self, list: &AttributeList) {
        self.sink.tag(Tag::AttributeList);
        for set in &list.0 {
            for attr in set {
                self.attribute_hash(attr);
            }
        }
    }

    fn inline_asm_hash(&mut self, asm: &InlineAsm) {
        self.sink.tag(Tag::InlineAsm);
        self.type_hash(&asm.ty);
        self.sink.string(asm.asm_string.as_bytes());
        self.sink.string(asm.constraints.as_bytes());
        self.sink.tag(Tag::InlineAsmSideEffects);
        self.sink.flag(asm.has_side_effects);
        self.sink.tag(Tag::InlineAsmAlignStack);
        self.sink.flag(asm.is_align_stack);
        self.sink.tag(Tag::InlineAsmDialect);
        self.sink.byte(asm.dialect);
    }

    fn range_metadata_hash(&mut self, range: &Option<RangeMetadata>) {
        let Some(range) = range else { return };
        self.sink.tag(Tag::RangeMetadata);
        for bound in &range.0 {
            self.sink.big_int(bound);
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

impl HashCalculator<'_> {
    fn constant_hash(&mut self, constant: &Constant) {
        self.sink.tag(Tag::Constant);
        self.type_hash(constant.ty());

        // Global values carry no structure of their own here. A variable with
        // a definitive initializer is numbered on first visit and its
        // initializer hashed; later visits hash only the recorded number, so
        // cyclic initializer graphs terminate.
        match constant {
            Constant::Global { id, .. } => {
                let module = self.module;
                let gv = module.global(*id);
                if gv.has_definitive_initializer() {
                    if self.global_numbers.contains_key(id) {
                        self.global_value_hash(*id);
                    } else {
                        let n = self.global_numbers.len() as u64;
                        self.global_numbers.insert(*id, n);
                        if let Some(init) = &gv.initializer {
                            self.constant_hash(init);
                        }
                    }
                }
                return;
            }
            Constant::Function { .. } | Constant::Alias { .. } => return,
            _ => {}
        }

        self.sink.number(constant.value_id());

        match constant {
            Constant::DataArray { bytes, .. } | Constant::DataVector { bytes, .. } => {
                self.sink.string(bytes);
            }

            Constant::Undef(_)
            | Constant::TokenNone
            | Constant::AggregateZero(_)
            | Constant::PointerNull(_) => {}

            Constant::Int { value, .. } => self.sink.big_int(value),
            Constant::Fp {
                semantics, bits, ..
            } => self.apfloat_hash(*semantics, bits),

            Constant::Array { elements, .. } | Constant::Vector { elements, .. } => {
                for element in elements {
                    self.constant_hash(element);
                }
            }
            Constant::Struct { fields, .. } => {
                for field in fields {
                    self.constant_hash(field);
                }
            }
            Constant::Expr { operands, .. } => {
                for operand in operands {
                    self.constant_hash(operand);
                }
            }

            Constant::BlockAddress {
                function, block, ..
            } => {
                self.sink.tag(Tag::Value);
                self.constant_hash(&Constant::Function {
                    ty: Type::ptr(),
                    id: *function,
                });
                // The block is equivalent in the context of its function, so
                // it participates in the same local numbering.
                self.sink.tag(Tag::Value);
                self.local_number(LocalKey::Block(function.0, block.index()));
            }

            Constant::Global { .. } | Constant::Function { .. } | Constant::Alias { .. } => {
                unreachable!("global values handled above")
            }
        }
    }

    fn global_value_hash(&mut self, id: GlobalId) {
        let module = self.module;
        let gv = module.global(id);
        self.sink.number(name_guid(&gv.name));
        if gv.has_definitive_initializer() {
            match self.global_numbers.get(&id) {
                Some(&n) => self.sink.number(n),
                None => {
                    let n = self.global_numbers.len() as u64;
                    self.global_numbers.insert(id, n);
                    if let Some(init) = &gv.initializer {
                        self.constant_hash(init);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Strip pointer casts from a constant expression chain.
fn strip_pointer_casts(mut c: &Constant) -> &Constant {
    loop {
        match c {
            Constant::Expr {
                opcode: Opcode::BitCast | Opcode::AddrSpaceCast | Opcode::GetElementPtr,
                operands,
                ..
            } if !operands.is_empty() => c = &operands[0],
            _ => return c,
        }
    }
}

impl HashCalculator<'_> {
    /// Resolve an alias (possibly an alias of an alias) to a global variable.
    fn resolve_alias_target(&self, id: AliasId) -> Option<GlobalId> {
        let mut current = id;
        let mut hops = 0;
        loop {
            let aliasee = strip_pointer_casts(&self.module.alias(current).aliasee);
            match aliasee {
                Constant::Global { id, .. } => return Some(*id),
                Constant::Alias { id, .. } => {
                    current = *id;
                    hops += 1;
                    if hops > self.module.aliases.len() {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }

    fn value_hash(&mut self, value: &Value) {
        self.sink.tag(Tag::Value);
        match value {
            Value::Const(c) => self.constant_hash(c),
            Value::Asm(asm) => self.inline_asm_hash(asm),

            Value::Global(id) => {
                let module = self.module;
                let gv = module.global(*id);
                if !gv.name.is_empty() {
                    self.sink.string(gv.name.as_bytes());
                } else {
                    self.local_number(LocalKey::Global(id.0));
                }
            }
            Value::Alias(id) => {
                let module = self.module;
                match self.resolve_alias_target(*id) {
                    Some(gid) if !module.global(gid).name.is_empty() => {
                        self.sink.string(module.global(gid).name.as_bytes());
                    }
                    _ => self.local_number(LocalKey::Alias(id.0)),
                }
            }

            Value::Arg(index) => self.local_number(LocalKey::Arg(*index)),
            Value::Inst(r) => self.local_number(LocalKey::Inst(r.index())),
            Value::Block(b) => {
                let func = self.current_func.map(|f| f.0).unwrap_or(0);
                self.local_number(LocalKey::Block(func, b.index()));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Instructions and basic blocks
// ---------------------------------------------------------------------------

impl HashCalculator<'_> {
    fn operand_bundles_hash(&mut self, bundles: &[OperandBundle]) {
        self.sink.tag(Tag::OperandBundles);
        for bundle in bundles {
            self.sink.string(bundle.tag.as_bytes());
            // Input values are covered by the operand loop; only the shape
            // of each bundle is hashed here.
            self.sink.number(bundle.num_inputs);
        }
    }

    fn instruction_hash(&mut self, inst: &Instruction) {
        self.sink.tag(Tag::Instruction);
        self.sink.number(inst.opcode as u64);
        self.type_hash(&inst.ty);
        self.sink.number(inst.subclass_data as u64);

        for operand in &inst.operands {
            self.type_hash(&operand.ty);
            self.value_hash(&operand.value);
        }

        match &inst.detail {
            Detail::None => {}

            Detail::GetElementPtr {
                source_element_type,
            } => {
                self.sink.tag(Tag::GetElementPtrInst);
                self.type_hash(source_element_type);
            }
            Detail::Alloca {
                allocated_type,
                alignment,
            } => {
                self.sink.tag(Tag::AllocaInst);
                self.type_hash(allocated_type);
                self.sink.number(*alignment);
            }
            Detail::Load {
                volatile,
                alignment,
                ordering,
                sync_scope,
                range,
            } => {
                self.sink.tag(Tag::LoadInst);
                self.sink.flag(*volatile);
                self.sink.number(*alignment);
                self.sink.ordering(*ordering as u8);
                self.sink.byte(*sync_scope as u8);
                self.range_metadata_hash(range);
            }
            Detail::Store {
                volatile,
                alignment,
                ordering,
                sync_scope,
            } => {
                self.sink.tag(Tag::StoreInst);
                self.sink.flag(*volatile);
                self.sink.number(*alignment);
                self.sink.ordering(*ordering as u8);
                self.sink.byte(*sync_scope as u8);
            }
            Detail::Cmp { predicate } => {
                self.sink.tag(Tag::CmpInst);
                self.sink.byte(*predicate as u8);
            }
            Detail::Call {
                tail_call,
                attributes,
                bundles,
                range,
                callee,
            } => {
                self.sink.tag(Tag::CallInst);
                self.sink.flag(*tail_call);
                self.attribute_list_hash(attributes);
                self.operand_bundles_hash(bundles);
                self.range_metadata_hash(range);
                if let Some(callee) = callee {
                    self.sink.string(callee.as_bytes());
                }
            }
            Detail::Invoke {
                calling_conv,
                attributes,
                bundles,
                range,
                callee,
            } => {
                self.sink.tag(Tag::InvokeInst);
                self.sink.number(*calling_conv as u64);
                self.attribute_list_hash(attributes);
                self.operand_bundles_hash(bundles);
                self.range_metadata_hash(range);
                if let Some(callee) = callee {
                    self.sink.string(callee.as_bytes());
                }
            }
            Detail::InsertValue { indices } => {
                self.sink.tag(Tag::InsertValueInst);
                for index in indices {
                    self.sink.update(&index.to_le_bytes());
                }
            }
            Detail::ExtractValue { indices } => {
                self.sink.tag(Tag::ExtractValueInst);
                for index in indices {
                    self.sink.update(&index.to_le_bytes());
                }
            }
            Detail::Fence {
                ordering,
                sync_scope,
            } => {
                self.sink.tag(Tag::FenceInst);
                self.sink.ordering(*ordering as u8);
                self.sink.byte(*sync_scope as u8);
            }
            Detail::CmpXchg {
                volatile,
                weak,
                success_ordering,
                failure_ordering,
                sync_scope,
            } => {
                self.sink.tag(Tag::AtomicCmpXchgInst);
                self.sink.flag(*volatile);
                self.sink.flag(*weak);
                self.sink.ordering(*success_ordering as u8);
                self.sink.ordering(*failure_ordering as u8);
                self.sink.byte(*sync_scope as u8);
            }
            Detail::AtomicRmw {
                op,
                volatile,
                ordering,
                sync_scope,
            } => {
                self.sink.tag(Tag::AtomicRmwInst);
                self.sink.byte(*op as u8);
                self.sink.flag(*volatile);
                self.sink.ordering(*ordering as u8);
                self.sink.byte(*sync_scope as u8);
            }
            Detail::Phi { incoming } => {
                self.sink.tag(Tag::PhiNode);
                // Incoming values are hashed by the operand loop; the
                // incoming blocks must match as well.
                for block in incoming {
                    self.value_hash(&Value::Block(*block));
                }
            }
        }
    }

    fn basic_block_hash(&mut self, func: &Function, block: prepo_ir::value::BlockRef) {
        self.sink.tag(Tag::BasicBlock);
        for inst in func.block_insts(block) {
            self.instruction_hash(inst);
        }
    }
}

// ---------------------------------------------------------------------------
// Signatures and module-level context
// ---------------------------------------------------------------------------

impl HashCalculator<'_> {
    fn module_hash(&mut self) {
        self.sink.tag(Tag::Datalayout);
        self.sink.string(self.module.data_layout.as_bytes());
        self.sink.tag(Tag::Triple);
        self.sink.string(self.module.triple.as_bytes());
    }

    fn signature_hash(&mut self, func: &Function) {
        self.sink.tag(Tag::Signature);
        self.attribute_list_hash(&func.attributes);
        if let Some(gc) = &func.gc {
            self.sink.tag(Tag::SignatureGc);
            self.sink.string(gc.as_bytes());
        }
        if let Some(section) = &func.section {
            self.sink.tag(Tag::SignatureSection);
            self.sink.string(section.as_bytes());
        }
        self.sink.tag(Tag::SignatureVarArg);
        self.sink.flag(func.is_var_arg());

        // The calling convention changes parameter and return placement, so
        // it only contributes when the function has parameters or returns
        // void. The `||` is long-standing observable behavior; keep it.
        if func.num_params() != 0 || func.return_type().is_void() {
            self.sink.tag(Tag::SignatureCallingConv);
            self.sink.update(&func.calling_conv.to_le_bytes());
        }

        self.type_hash(&func.ty);

        // Arguments are enumerated in declaration order so that they receive
        // the leading local numbers.
        self.sink.tag(Tag::SignatureArg);
        for index in 0..func.num_params() {
            self.value_hash(&Value::Arg(index as u32));
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Hash a function definition.
pub fn hash_function(module: &Module, id: FuncId) -> Digest {
    let mut calc = HashCalculator::new(module);
    calc.current_func = Some(id);
    let func = module.function(id);

    calc.sink.tag(Tag::GlobalFunction);
    calc.module_hash();
    calc.signature_hash(func);

    // CFG-ordered walk from the entry block: the layout order of blocks is
    // immaterial, and blocks unreachable from the entry cannot affect
    // observable output, so they are skipped.
    if !func.blocks.is_empty() {
        let entry = func.entry_block();
        let mut work = vec![entry];
        let mut visited = HashSet::new();
        visited.insert(entry);
        while let Some(block) = work.pop() {
            calc.value_hash(&Value::Block(block));
            calc.basic_block_hash(func, block);
            for succ in func.successors(block) {
                if visited.insert(succ) {
                    work.push(succ);
                }
            }
        }
    }

    calc.sink.finalize()
}

/// Hash a global variable definition.
///
/// Linkage, visibility, and DLL storage class are deliberately excluded:
/// cosmetic linkage differences must not produce duplicate fragments.
pub fn hash_variable(module: &Module, id: GlobalId) -> Digest {
    let mut calc = HashCalculator::new(module);
    let gv = module.global(id);

    calc.sink.tag(Tag::GlobalVariable);
    calc.module_hash();
    calc.type_hash(&gv.value_type);

    calc.sink.tag(Tag::GvConstant);
    calc.sink.flag(gv.is_constant);
    calc.sink.tag(Tag::GvThreadLocalMode);
    calc.sink.byte(gv.thread_local as u8);
    calc.sink.tag(Tag::GvAlignment);
    calc.sink.number(gv.alignment);
    calc.sink.tag(Tag::GvUnnamedAddr);
    calc.sink.byte(gv.unnamed_addr as u8);

    if let Some(comdat) = &gv.comdat {
        calc.sink.tag(Tag::GvComdat);
        calc.sink.update(comdat.name.as_bytes());
        calc.sink.byte(comdat.selection_kind as u8);
    }

    if !gv.name.is_empty() && gv.has_definitive_initializer() {
        calc.sink.tag(Tag::GvInitValue);
        if let Some(init) = &gv.initializer {
            calc.constant_hash(init);
        }
    }

    calc.sink.finalize()
}

/// Hash a global alias. Alias digests are used as lightweight identifiers,
/// so only the low 64 bits are returned.
pub fn hash_alias(module: &Module, id: AliasId) -> u64 {
    let mut calc = HashCalculator::new(module);
    let alias = module.alias(id);

    calc.sink.tag(Tag::GlobalAlias);
    calc.type_hash(&alias.value_type);
    calc.sink.byte(alias.linkage as u8);
    calc.sink.tag(Tag::GvVisibility);
    calc.sink.byte(alias.visibility as u8);
    calc.sink.tag(Tag::GvThreadLocalMode);
    calc.sink.byte(alias.thread_local as u8);
    calc.sink.tag(Tag::GvAlignment);
    calc.sink.number(alias.alignment);
    calc.sink.tag(Tag::GvUnnamedAddr);
    calc.sink.byte(alias.unnamed_addr as u8);
    calc.sink.tag(Tag::GvDllStorageClass);
    calc.sink.byte(alias.dll_storage_class as u8);

    calc.constant_hash(&alias.aliasee);

    calc.sink.finalize().low64()
}
