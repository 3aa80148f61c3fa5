//! Streaming digest sink with typed domain-separation tags.
//!
//! Every value kind is prefixed by a one-byte tag before its canonical byte
//! form is fed to the underlying 128-bit hash, so a value of one kind can
//! never alias the leading bytes of another (a 4-byte integer is distinct
//! from the first 4 bytes of a 4-char string).

use md5::{Digest as _, Md5};
use num_bigint::{BigInt, BigUint};

use crate::digest::Digest;

/// Domain-separation tags. The numeric values are part of the digest's
/// definition and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    StringRef = 1,
    APInt = 2,
    APFloat = 3,
    AtomicOrdering = 4,
    AttributeEnum = 5,
    AttributeInt = 6,
    AttributeString = 7,
    AttributeList = 8,
    InlineAsm = 9,
    InlineAsmSideEffects = 10,
    InlineAsmAlignStack = 11,
    InlineAsmDialect = 12,
    RangeMetadata = 13,
    Type = 14,
    Constant = 15,
    Value = 16,
    Instruction = 17,
    GetElementPtrInst = 18,
    AllocaInst = 19,
    LoadInst = 20,
    StoreInst = 21,
    CmpInst = 22,
    CallInst = 23,
    InvokeInst = 24,
    InsertValueInst = 25,
    ExtractValueInst = 26,
    FenceInst = 27,
    AtomicCmpXchgInst = 28,
    AtomicRmwInst = 29,
    PhiNode = 30,
    BasicBlock = 31,
    Signature = 32,
    SignatureGc = 33,
    SignatureSection = 34,
    SignatureVarArg = 35,
    SignatureCallingConv = 36,
    SignatureArg = 37,
    OperandBundles = 38,
    Datalayout = 39,
    Triple = 40,
    GlobalFunction = 41,
    GlobalVariable = 42,
    GlobalAlias = 43,
    GvComdat = 44,
    GvConstant = 45,
    GvThreadLocalMode = 46,
    GvAlignment = 47,
    GvUnnamedAddr = 48,
    GvInitValue = 49,
    GvVisibility = 50,
    GvDllStorageClass = 51,
}

/// Streaming hash accumulator.
pub struct DigestSink {
    hash: Md5,
}

impl DigestSink {
    pub fn new() -> Self {
        Self { hash: Md5::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hash.update(bytes);
    }

    pub fn tag(&mut self, tag: Tag) {
        self.update(&[tag as u8]);
    }

    pub fn byte(&mut self, b: u8) {
        self.update(&[b]);
    }

    pub fn flag(&mut self, b: bool) {
        self.byte(b as u8);
    }

    /// Fixed-width little-endian integer.
    pub fn number(&mut self, v: u64) {
        self.update(&v.to_le_bytes());
    }

    /// Length-prefixed string bytes.
    pub fn string(&mut self, s: &[u8]) {
        self.tag(Tag::StringRef);
        self.number(s.len() as u64);
        self.update(s);
    }

    /// Arbitrary-precision integer: limb count, then raw 64-bit limbs of the
    /// magnitude. Negative values are distinguished by a sign byte.
    pub fn big_int(&mut self, v: &BigInt) {
        self.tag(Tag::APInt);
        self.byte((v.sign() == num_bigint::Sign::Minus) as u8);
        self.big_limbs(v.magnitude());
    }

    /// Unsigned arbitrary-precision integer, as in `big_int` without a sign.
    pub fn big_uint(&mut self, v: &BigUint) {
        self.tag(Tag::APInt);
        self.byte(0);
        self.big_limbs(v);
    }

    fn big_limbs(&mut self, v: &BigUint) {
        let limbs: Vec<u64> = v.iter_u64_digits().collect();
        self.number(limbs.len() as u64);
        for limb in limbs {
            self.number(limb);
        }
    }

    /// Canonicalized floating-point value: the format semantics precede the
    /// bit pattern so that identical bit patterns in different formats
    /// receive different digests.
    pub fn float(
        &mut self,
        precision: u64,
        max_exponent: i16,
        min_exponent: i16,
        size_in_bits: u64,
        bits: &BigUint,
    ) {
        self.tag(Tag::APFloat);
        self.number(precision);
        self.update(&max_exponent.to_le_bytes());
        self.update(&min_exponent.to_le_bytes());
        self.number(size_in_bits);
        self.big_uint(bits);
    }

    /// Atomic memory ordering.
    pub fn ordering(&mut self, ordering: u8) {
        self.tag(Tag::AtomicOrdering);
        self.byte(ordering);
    }

    pub fn finalize(self) -> Digest {
        let out: [u8; 16] = self.hash.finalize().into();
        Digest::from_bytes(out)
    }
}

impl Default for DigestSink {
    fn default() -> Self {
        Self::new()
    }
}
