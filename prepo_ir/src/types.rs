//! Type system for the program-repository IR.
//!
//! A closed set of first-class types. Every type carries a stable one-byte
//! type ID so that the hasher can distinguish kinds on the wire without
//! depending on in-memory layout.

/// A type in the IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Float,
    Double,
    X86Fp80,
    Fp128,
    PpcFp128,
    Label,
    Metadata,
    Token,
    /// Integer with an explicit bit width.
    Integer(u32),
    /// Function type: parameter types, vararg flag, return type.
    Function {
        params: Vec<Type>,
        var_arg: bool,
        ret: Box<Type>,
    },
    /// Pointer into an address space. Pointee types are not part of the type.
    Pointer { address_space: u32 },
    /// Struct with element types and an optional packed layout.
    Struct { elements: Vec<Type>, packed: bool },
    /// Fixed-length array.
    Array { len: u64, element: Box<Type> },
    /// Fixed-length vector.
    Vector { len: u64, element: Box<Type> },
}

impl Type {
    /// Stable one-byte identifier for the type kind.
    pub fn type_id(&self) -> u8 {
        match self {
            Type::Void => 0,
            Type::Float => 1,
            Type::Double => 2,
            Type::X86Fp80 => 3,
            Type::Fp128 => 4,
            Type::PpcFp128 => 5,
            Type::Label => 6,
            Type::Metadata => 7,
            Type::Token => 8,
            Type::Integer(_) => 9,
            Type::Function { .. } => 10,
            Type::Pointer { .. } => 11,
            Type::Struct { .. } => 12,
            Type::Array { .. } => 13,
            Type::Vector { .. } => 14,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Shorthand for an address-space-zero pointer.
    pub fn ptr() -> Type {
        Type::Pointer { address_space: 0 }
    }

    /// Shorthand for a function type.
    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function {
            params,
            var_arg: false,
            ret: Box::new(ret),
        }
    }

    /// Number of parameters if this is a function type.
    pub fn num_params(&self) -> usize {
        match self {
            Type::Function { params, .. } => params.len(),
            _ => 0,
        }
    }

    /// Return type if this is a function type.
    pub fn return_type(&self) -> Option<&Type> {
        match self {
            Type::Function { ret, .. } => Some(ret),
            _ => None,
        }
    }
}
