//! Module-level IR container: globals, functions, and aliases.

use crate::constant::{Comdat, Constant};
use crate::function::Function;
use crate::types::Type;
use crate::value::{AliasId, FuncId, GlobalId};

/// Linkage of a global value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Linkage {
    External = 0,
    AvailableExternally = 1,
    LinkOnceAny = 2,
    LinkOnceOdr = 3,
    WeakAny = 4,
    WeakOdr = 5,
    Appending = 6,
    Internal = 7,
    Private = 8,
    ExternalWeak = 9,
    Common = 10,
}

/// Symbol visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Visibility {
    Default = 0,
    Hidden = 1,
    Protected = 2,
}

/// DLL storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DllStorageClass {
    Default = 0,
    Import = 1,
    Export = 2,
}

/// Thread-local storage mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadLocalMode {
    NotThreadLocal = 0,
    GeneralDynamic = 1,
    LocalDynamic = 2,
    InitialExec = 3,
    LocalExec = 4,
}

/// Unnamed-address attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnnamedAddr {
    None = 0,
    Local = 1,
    Global = 2,
}

/// A global variable.
#[derive(Debug, Clone)]
pub struct GlobalVariable {
    /// May be empty for anonymous globals.
    pub name: String,
    pub value_type: Type,
    pub is_constant: bool,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub dll_storage_class: DllStorageClass,
    pub thread_local: ThreadLocalMode,
    pub alignment: u64,
    pub unnamed_addr: UnnamedAddr,
    pub comdat: Option<Comdat>,
    pub initializer: Option<Constant>,
}

impl GlobalVariable {
    pub fn new(name: impl Into<String>, value_type: Type) -> Self {
        Self {
            name: name.into(),
            value_type,
            is_constant: false,
            linkage: Linkage::External,
            visibility: Visibility::Default,
            dll_storage_class: DllStorageClass::Default,
            thread_local: ThreadLocalMode::NotThreadLocal,
            alignment: 0,
            unnamed_addr: UnnamedAddr::None,
            comdat: None,
            initializer: None,
        }
    }

    /// Whether this global's initializer is the one the linker will use.
    pub fn has_definitive_initializer(&self) -> bool {
        self.initializer.is_some() && self.linkage != Linkage::ExternalWeak
    }
}

/// A global alias.
#[derive(Debug, Clone)]
pub struct GlobalAlias {
    pub name: String,
    pub value_type: Type,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub dll_storage_class: DllStorageClass,
    pub thread_local: ThreadLocalMode,
    pub alignment: u64,
    pub unnamed_addr: UnnamedAddr,
    /// The aliasee, possibly wrapped in pointer casts.
    pub aliasee: Constant,
}

/// Top-level IR container.
#[derive(Debug, Clone)]
pub struct Module {
    pub data_layout: String,
    pub triple: String,
    pub globals: Vec<GlobalVariable>,
    pub functions: Vec<Function>,
    pub aliases: Vec<GlobalAlias>,
}

impl Module {
    pub fn new(data_layout: impl Into<String>, triple: impl Into<String>) -> Self {
        Self {
            data_layout: data_layout.into(),
            triple: triple.into(),
            globals: Vec::new(),
            functions: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn add_global(&mut self, gv: GlobalVariable) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(gv);
        id
    }

    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(func);
        id
    }

    pub fn add_alias(&mut self, alias: GlobalAlias) -> AliasId {
        let id = AliasId(self.aliases.len() as u32);
        self.aliases.push(alias);
        id
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.0 as usize]
    }

    pub fn global_mut(&mut self, id: GlobalId) -> &mut GlobalVariable {
        &mut self.globals[id.0 as usize]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn alias(&self, id: AliasId) -> &GlobalAlias {
        &self.aliases[id.0 as usize]
    }
}
