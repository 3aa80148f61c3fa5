//! Tests for the digest sink and the IR hasher.

use num_bigint::BigInt;

use crate::hasher::{hash_alias, hash_function, hash_variable};
use crate::sink::{DigestSink, Tag};
use prepo_ir::builder::Builder;
use prepo_ir::constant::{Comdat, Constant, SelectionKind};
use prepo_ir::function::Function;
use prepo_ir::instruction::{Detail, Instruction, Opcode};
use prepo_ir::module::{
    DllStorageClass, GlobalAlias, GlobalVariable, Linkage, Module, ThreadLocalMode, UnnamedAddr,
    Visibility,
};
use prepo_ir::types::Type;
use prepo_ir::value::{FuncId, TypedValue, Value};

const LAYOUT: &str = "e-m:e-i64:64-f80:128-n8:16:32:64-S128";
const TRIPLE: &str = "x86_64-unknown-linux-gnu";

fn i32_ty() -> Type {
    Type::Integer(32)
}

fn new_module() -> Module {
    Module::new(LAYOUT, TRIPLE)
}

/// `fn(i32) -> i32 { ret (arg0 + constant) }`
fn add_constant_func(constant: i64) -> Function {
    let mut func = Function::new("f", Type::function(vec![i32_ty()], i32_ty()));
    let mut builder = Builder::new(&mut func);
    let entry = builder.create_block();
    builder.switch_to_block(entry);
    let a = builder.arg(0);
    let c = TypedValue::new(i32_ty(), Value::Const(Constant::int(32, constant)));
    let sum = builder.add(a, c);
    let sum = builder.result(sum);
    builder.ret(Some(sum));
    func
}

// ---------------------------------------------------------------------------
// Digest sink
// ---------------------------------------------------------------------------

#[test]
fn sink_tags_separate_domains() {
    // Same payload bytes under different kinds must not collide.
    let payload = [1u8, 2, 3, 4];

    let mut a = DigestSink::new();
    a.string(&payload);
    let mut b = DigestSink::new();
    b.tag(Tag::APInt);
    b.update(&payload);
    assert_ne!(a.finalize(), b.finalize());

    let mut c = DigestSink::new();
    c.tag(Tag::Type);
    c.update(&payload);
    let mut d = DigestSink::new();
    d.tag(Tag::Constant);
    d.update(&payload);
    assert_ne!(c.finalize(), d.finalize());
}

#[test]
fn sink_string_length_prefix_prevents_concatenation_aliasing() {
    // ("ab", "c") vs ("a", "bc") — identical concatenated bytes.
    let mut a = DigestSink::new();
    a.string(b"ab");
    a.string(b"c");
    let mut b = DigestSink::new();
    b.string(b"a");
    b.string(b"bc");
    assert_ne!(a.finalize(), b.finalize());
}

#[test]
fn sink_big_int_sign_and_width() {
    let mut a = DigestSink::new();
    a.big_int(&BigInt::from(42));
    let mut b = DigestSink::new();
    b.big_int(&BigInt::from(-42));
    assert_ne!(a.finalize(), b.finalize());

    // A one-limb and a two-limb integer with a shared low limb differ.
    let mut c = DigestSink::new();
    c.big_int(&BigInt::from(7));
    let mut d = DigestSink::new();
    d.big_int(&(BigInt::from(7) + (BigInt::from(1) << 64)));
    assert_ne!(c.finalize(), d.finalize());
}

#[test]
fn sink_float_semantics_precede_bits() {
    // Same bit pattern, different formats.
    let bits = num_bigint::BigUint::from(0x3f80_0000u32);
    let mut a = DigestSink::new();
    a.float(24, 127, -126, 32, &bits);
    let mut b = DigestSink::new();
    b.float(53, 1023, -1022, 64, &bits);
    assert_ne!(a.finalize(), b.finalize());
}

// ---------------------------------------------------------------------------
// Function hashing
// ---------------------------------------------------------------------------

#[test]
fn function_hash_is_deterministic() {
    // Two independently built modules with the same content hash equal, so
    // the digest depends on structure alone, not allocation or identity.
    let mut m1 = new_module();
    let f1 = m1.add_function(add_constant_func(1));
    let mut m2 = new_module();
    let f2 = m2.add_function(add_constant_func(1));

    let h1 = hash_function(&m1, f1);
    let h2 = hash_function(&m2, f2);
    assert_eq!(h1, h2);
    assert_eq!(h1, hash_function(&m1, f1));
}

#[test]
fn structurally_equal_functions_hash_equal_and_constants_matter() {
    // The two functions of the classic pair differ only in the names their
    // producers gave to locals, which this IR does not even record; changing
    // the constant is a semantic difference.
    let mut module = new_module();
    let f = module.add_function(add_constant_func(1));
    let g = module.add_function(add_constant_func(1));
    let h = module.add_function(add_constant_func(2));

    assert_eq!(hash_function(&module, f), hash_function(&module, g));
    assert_ne!(hash_function(&module, f), hash_function(&module, h));
}

#[test]
fn function_name_does_not_affect_hash() {
    let mut func_a = add_constant_func(1);
    func_a.name = "first".into();
    let mut func_b = add_constant_func(1);
    func_b.name = "second".into();

    let mut module = new_module();
    let a = module.add_function(func_a);
    let b = module.add_function(func_b);
    assert_eq!(hash_function(&module, a), hash_function(&module, b));
}

#[test]
fn unreachable_block_does_not_affect_hash() {
    let mut module = new_module();
    let plain = module.add_function(add_constant_func(1));

    // Same function plus a block no terminator branches to.
    let mut func = add_constant_func(1);
    {
        let mut builder = Builder::new(&mut func);
        let dead = builder.create_block();
        builder.switch_to_block(dead);
        builder.unreachable();
    }
    let extended = module.add_function(func);

    assert_eq!(
        hash_function(&module, plain),
        hash_function(&module, extended)
    );
}

#[test]
fn block_order_is_immaterial_but_edges_are_not() {
    // entry -> (then, else); the two layouts of then/else in the block list
    // hash identically because the walk is CFG-ordered.
    fn branchy(swap_layout: bool) -> Function {
        let mut func = Function::new("b", Type::function(vec![i32_ty()], i32_ty()));
        let mut builder = Builder::new(&mut func);
        let entry = builder.create_block();
        let (first, second) = {
            let x = builder.create_block();
            let y = builder.create_block();
            if swap_layout { (y, x) } else { (x, y) }
        };
        builder.switch_to_block(entry);
        let a = builder.arg(0);
        let zero = TypedValue::new(i32_ty(), Value::Const(Constant::int(32, 0)));
        let cmp = builder.icmp(prepo_ir::instruction::Predicate::IcmpEq, a, zero);
        let cmp = builder.result(cmp);
        builder.cond_br(cmp, first, second);
        builder.switch_to_block(first);
        builder.ret(Some(TypedValue::new(
            i32_ty(),
            Value::Const(Constant::int(32, 1)),
        )));
        builder.switch_to_block(second);
        builder.ret(Some(TypedValue::new(
            i32_ty(),
            Value::Const(Constant::int(32, 2)),
        )));
        func
    }

    let mut module = new_module();
    let a = module.add_function(branchy(false));
    let b = module.add_function(branchy(true));
    assert_eq!(hash_function(&module, a), hash_function(&module, b));
}

#[test]
fn data_layout_and_triple_affect_hash() {
    let mut m1 = new_module();
    let f1 = m1.add_function(add_constant_func(1));
    let mut m2 = Module::new(LAYOUT, "aarch64-unknown-linux-gnu");
    let f2 = m2.add_function(add_constant_func(1));
    assert_ne!(hash_function(&m1, f1), hash_function(&m2, f2));
}

#[test]
fn calling_convention_condition_quirk() {
    // No parameters, non-void return: the calling convention is not part of
    // the signature hash.
    let make = |cc: u32| {
        let mut func = Function::new("get", Type::function(vec![], i32_ty()));
        func.calling_conv = cc;
        let mut builder = Builder::new(&mut func);
        let entry = builder.create_block();
        builder.switch_to_block(entry);
        builder.ret(Some(TypedValue::new(
            i32_ty(),
            Value::Const(Constant::int(32, 0)),
        )));
        func
    };
    let mut module = new_module();
    let a = module.add_function(make(0));
    let b = module.add_function(make(8));
    assert_eq!(hash_function(&module, a), hash_function(&module, b));

    // One parameter: the calling convention contributes.
    let make_param = |cc: u32| {
        let mut func = add_constant_func(1);
        func.calling_conv = cc;
        func
    };
    let c = module.add_function(make_param(0));
    let d = module.add_function(make_param(8));
    assert_ne!(hash_function(&module, c), hash_function(&module, d));

    // No parameters, void return: the calling convention contributes too.
    let make_void = |cc: u32| {
        let mut func = Function::new("nop", Type::function(vec![], Type::Void));
        func.calling_conv = cc;
        let mut builder = Builder::new(&mut func);
        let entry = builder.create_block();
        builder.switch_to_block(entry);
        builder.ret(None);
        func
    };
    let e = module.add_function(make_void(0));
    let f = module.add_function(make_void(8));
    assert_ne!(hash_function(&module, e), hash_function(&module, f));
}

#[test]
fn phi_incoming_blocks_contribute() {
    fn with_phi(swap_incoming: bool) -> Function {
        let mut func = Function::new("p", Type::function(vec![i32_ty()], i32_ty()));
        let mut builder = Builder::new(&mut func);
        let entry = builder.create_block();
        let left = builder.create_block();
        let right = builder.create_block();
        let join = builder.create_block();

        builder.switch_to_block(entry);
        let a = builder.arg(0);
        let zero = TypedValue::new(i32_ty(), Value::Const(Constant::int(32, 0)));
        let cmp = builder.icmp(prepo_ir::instruction::Predicate::IcmpEq, a, zero);
        let cmp = builder.result(cmp);
        builder.cond_br(cmp, left, right);

        builder.switch_to_block(left);
        builder.br(join);
        builder.switch_to_block(right);
        builder.br(join);

        builder.switch_to_block(join);
        let one = TypedValue::new(i32_ty(), Value::Const(Constant::int(32, 1)));
        let two = TypedValue::new(i32_ty(), Value::Const(Constant::int(32, 2)));
        let (first, second) = if swap_incoming {
            ((two, left), (one, right))
        } else {
            ((one, left), (two, right))
        };
        let phi = builder.phi(i32_ty(), vec![first, second]);
        let phi = builder.result(phi);
        builder.ret(Some(phi));
        func
    }

    let mut module = new_module();
    let a = module.add_function(with_phi(false));
    let b = module.add_function(with_phi(true));
    assert_ne!(hash_function(&module, a), hash_function(&module, b));
}

#[test]
fn call_detail_contributes_callee_name() {
    fn caller(callee: &str) -> Function {
        let mut func = Function::new("c", Type::function(vec![], Type::Void));
        let mut builder = Builder::new(&mut func);
        let entry = builder.create_block();
        builder.switch_to_block(entry);
        builder.push(
            Instruction::new(Opcode::Call, Type::Void, vec![]).with_detail(Detail::Call {
                tail_call: false,
                attributes: Default::default(),
                bundles: vec![],
                range: None,
                callee: Some(callee.to_string()),
            }),
        );
        builder.ret(None);
        func
    }

    let mut module = new_module();
    let a = module.add_function(caller("memcpy"));
    let b = module.add_function(caller("memmove"));
    assert_ne!(hash_function(&module, a), hash_function(&module, b));
}

// ---------------------------------------------------------------------------
// Global-variable hashing
// ---------------------------------------------------------------------------

fn int_global(name: &str, value: i64) -> GlobalVariable {
    let mut gv = GlobalVariable::new(name, i32_ty());
    gv.initializer = Some(Constant::int(32, value));
    gv
}

#[test]
fn variable_linkage_cosmetics_are_ignored() {
    let mut module = new_module();

    let base = module.add_global(int_global("v", 7));

    let mut hidden = int_global("v", 7);
    hidden.visibility = Visibility::Hidden;
    let hidden = module.add_global(hidden);

    let mut exported = int_global("v", 7);
    exported.dll_storage_class = DllStorageClass::Export;
    let exported = module.add_global(exported);

    let mut internal = int_global("v", 7);
    internal.linkage = Linkage::Internal;
    let internal = module.add_global(internal);

    let base_hash = hash_variable(&module, base);
    assert_eq!(base_hash, hash_variable(&module, hidden));
    assert_eq!(base_hash, hash_variable(&module, exported));
    assert_eq!(base_hash, hash_variable(&module, internal));
}

#[test]
fn variable_semantic_fields_are_not_ignored() {
    let mut module = new_module();
    let base = module.add_global(int_global("v", 7));
    let base_hash = hash_variable(&module, base);

    let mut constant = int_global("v", 7);
    constant.is_constant = true;
    let constant = module.add_global(constant);
    assert_ne!(base_hash, hash_variable(&module, constant));

    let mut tls = int_global("v", 7);
    tls.thread_local = ThreadLocalMode::GeneralDynamic;
    let tls = module.add_global(tls);
    assert_ne!(base_hash, hash_variable(&module, tls));

    let mut aligned = int_global("v", 7);
    aligned.alignment = 16;
    let aligned = module.add_global(aligned);
    assert_ne!(base_hash, hash_variable(&module, aligned));

    let mut unnamed = int_global("v", 7);
    unnamed.unnamed_addr = UnnamedAddr::Global;
    let unnamed = module.add_global(unnamed);
    assert_ne!(base_hash, hash_variable(&module, unnamed));

    let init = module.add_global(int_global("v", 8));
    assert_ne!(base_hash, hash_variable(&module, init));

    let mut comdat = int_global("v", 7);
    comdat.comdat = Some(Comdat {
        name: "v".into(),
        selection_kind: SelectionKind::Any,
    });
    let comdat = module.add_global(comdat);
    assert_ne!(base_hash, hash_variable(&module, comdat));
}

#[test]
fn self_referential_initializer_terminates() {
    let mut module = new_module();
    let id = module.add_global(GlobalVariable::new("cycle", Type::ptr()));
    module.global_mut(id).initializer = Some(Constant::Global {
        ty: Type::ptr(),
        id,
    });

    let h1 = hash_variable(&module, id);
    let h2 = hash_variable(&module, id);
    assert_eq!(h1, h2);
}

#[test]
fn mutually_recursive_initializers_terminate() {
    let mut module = new_module();
    let a = module.add_global(GlobalVariable::new("a", Type::ptr()));
    let b = module.add_global(GlobalVariable::new("b", Type::ptr()));
    module.global_mut(a).initializer = Some(Constant::Global {
        ty: Type::ptr(),
        id: b,
    });
    module.global_mut(b).initializer = Some(Constant::Global {
        ty: Type::ptr(),
        id: a,
    });

    // Both digests are computable, stable, and distinct (the cycle is entered
    // at a different point).
    assert_eq!(hash_variable(&module, a), hash_variable(&module, a));
    assert_eq!(hash_variable(&module, b), hash_variable(&module, b));
    assert_ne!(hash_variable(&module, a), hash_variable(&module, b));
}

#[test]
fn anonymous_variable_initializer_is_skipped() {
    // An unnamed global hashes without its initializer; a named one with the
    // same initializer hashes differently.
    let mut module = new_module();
    let anon = module.add_global(int_global("", 7));
    let named = module.add_global(int_global("v", 7));
    assert_ne!(hash_variable(&module, anon), hash_variable(&module, named));
}

// ---------------------------------------------------------------------------
// Alias hashing
// ---------------------------------------------------------------------------

fn alias_of(target: prepo_ir::value::GlobalId) -> GlobalAlias {
    GlobalAlias {
        name: "al".into(),
        value_type: i32_ty(),
        linkage: Linkage::External,
        visibility: Visibility::Default,
        dll_storage_class: DllStorageClass::Default,
        thread_local: ThreadLocalMode::NotThreadLocal,
        alignment: 0,
        unnamed_addr: UnnamedAddr::None,
        aliasee: Constant::Global {
            ty: Type::ptr(),
            id: target,
        },
    }
}

#[test]
fn alias_hash_includes_linkage_and_visibility() {
    let mut module = new_module();
    let target = module.add_global(int_global("t", 1));

    let base = alias_of(target);
    let a = module.add_alias(base.clone());

    let mut internal = base.clone();
    internal.linkage = Linkage::Internal;
    let b = module.add_alias(internal);

    let mut hidden = base;
    hidden.visibility = Visibility::Hidden;
    let c = module.add_alias(hidden);

    assert_eq!(hash_alias(&module, a), hash_alias(&module, a));
    assert_ne!(hash_alias(&module, a), hash_alias(&module, b));
    assert_ne!(hash_alias(&module, a), hash_alias(&module, c));
}

// ---------------------------------------------------------------------------
// Values referencing globals
// ---------------------------------------------------------------------------

#[test]
fn named_global_operand_hashes_by_name() {
    fn loader(module: &mut Module, global: prepo_ir::value::GlobalId) -> FuncId {
        let mut func = Function::new("l", Type::function(vec![], i32_ty()));
        let mut builder = Builder::new(&mut func);
        let entry = builder.create_block();
        builder.switch_to_block(entry);
        let loaded = builder.push(
            Instruction::new(
                Opcode::Load,
                i32_ty(),
                vec![TypedValue::new(Type::ptr(), Value::Global(global))],
            )
            .with_detail(Detail::Load {
                volatile: false,
                alignment: 4,
                ordering: prepo_ir::instruction::AtomicOrdering::NotAtomic,
                sync_scope: prepo_ir::instruction::SyncScope::System,
                range: None,
            }),
        );
        let loaded = builder.result(loaded);
        builder.ret(Some(loaded));
        module.add_function(func)
    }

    let mut m1 = new_module();
    let g1 = m1.add_global(int_global("counter", 0));
    let f1 = loader(&mut m1, g1);

    let mut m2 = new_module();
    // A different initializer but the same name: the operand reference
    // hashes by name alone.
    let g2 = m2.add_global(int_global("counter", 99));
    let f2 = loader(&mut m2, g2);

    let mut m3 = new_module();
    let g3 = m3.add_global(int_global("other", 0));
    let f3 = loader(&mut m3, g3);

    assert_eq!(hash_function(&m1, f1), hash_function(&m2, f2));
    assert_ne!(hash_function(&m1, f1), hash_function(&m3, f3));
}
