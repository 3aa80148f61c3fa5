//! The symbol table.
//!
//! Entries are collected by name while fragments are appended, then sorted
//! so every local-binding entry precedes every global one; `.symtab`'s
//! `sh_info` is the index of the first non-local entry. Section-anchor
//! symbols (targets of internal fixups) are tracked by output section, since
//! two discriminated sections may share a display name.

use object::elf;

use crate::elf::write_symbol;
use crate::output::SectionId;
use crate::strtab::StringTable;
use prepo_store::ticket::Linkage;

/// ELF binding for a ticket-member linkage.
fn binding_for(linkage: Linkage) -> u8 {
    match linkage {
        Linkage::Internal | Linkage::Private => elf::STB_LOCAL,
        Linkage::Linkonce
        | Linkage::LinkOnceAny
        | Linkage::LinkOnceOdr
        | Linkage::WeakAny
        | Linkage::WeakOdr => elf::STB_WEAK,
        Linkage::External
        | Linkage::Common
        | Linkage::Appending
        | Linkage::AvailableExternally => elf::STB_GLOBAL,
    }
}

struct SymbolEntry {
    name_offset: u32,
    section: Option<SectionId>,
    value: u64,
    size: u64,
    binding: u8,
    sym_type: u8,
    is_common: bool,
    defined: bool,
    /// Symbol-table position, assigned by `sort()`.
    index: u32,
}

pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    by_name: std::collections::HashMap<String, usize>,
    anchors: std::collections::HashMap<SectionId, usize>,
    /// Entry ids in emission order (locals first), filled by `sort()`.
    order: Vec<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        // Entry 0 is the mandatory null symbol.
        let null = SymbolEntry {
            name_offset: 0,
            section: None,
            value: 0,
            size: 0,
            binding: elf::STB_LOCAL,
            sym_type: elf::STT_NOTYPE,
            is_common: false,
            defined: true,
            index: 0,
        };
        Self {
            entries: vec![null],
            by_name: std::collections::HashMap::new(),
            anchors: std::collections::HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Record a defined symbol. The first definition of a name wins; later
    /// definitions (same-named linkonce members) are ignored. An earlier
    /// undefined reference is upgraded in place.
    pub fn insert_symbol(
        &mut self,
        strings: &mut StringTable,
        name: &str,
        section: SectionId,
        value: u64,
        size: u64,
        linkage: Linkage,
    ) {
        match self.by_name.get(name) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if !entry.defined {
                    entry.section = Some(section);
                    entry.value = value;
                    entry.size = size;
                    entry.binding = binding_for(linkage);
                    entry.defined = true;
                }
            }
            None => {
                let i = self.entries.len();
                self.entries.push(SymbolEntry {
                    name_offset: strings.insert(name),
                    section: Some(section),
                    value,
                    size,
                    binding: binding_for(linkage),
                    sym_type: elf::STT_NOTYPE,
                    is_common: false,
                    defined: true,
                    index: 0,
                });
                self.by_name.insert(name.to_string(), i);
            }
        }
    }

    /// Record a common symbol: no output section, `SHN_COMMON`, size from
    /// the fragment's BSS payload.
    pub fn insert_common(&mut self, strings: &mut StringTable, name: &str, size: u64) {
        match self.by_name.get(name) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if !entry.defined {
                    entry.size = size;
                    entry.binding = elf::STB_GLOBAL;
                    entry.is_common = true;
                    entry.defined = true;
                }
            }
            None => {
                let i = self.entries.len();
                self.entries.push(SymbolEntry {
                    name_offset: strings.insert(name),
                    section: None,
                    value: 0,
                    size,
                    binding: elf::STB_GLOBAL,
                    sym_type: elf::STT_NOTYPE,
                    is_common: true,
                    defined: true,
                    index: 0,
                });
                self.by_name.insert(name.to_string(), i);
            }
        }
    }

    /// Record an undefined reference unless the name is already known.
    pub fn insert_undefined(&mut self, strings: &mut StringTable, name: &str) {
        if self.by_name.contains_key(name) {
            return;
        }
        let i = self.entries.len();
        self.entries.push(SymbolEntry {
            name_offset: strings.insert(name),
            section: None,
            value: 0,
            size: 0,
            binding: elf::STB_GLOBAL,
            sym_type: elf::STT_NOTYPE,
            is_common: false,
            defined: false,
            index: 0,
        });
        self.by_name.insert(name.to_string(), i);
    }

    /// Record a section-anchor symbol for the given output section.
    pub fn insert_anchor(&mut self, strings: &mut StringTable, name: &str, section: SectionId) {
        if self.anchors.contains_key(&section) {
            return;
        }
        let i = self.entries.len();
        self.entries.push(SymbolEntry {
            name_offset: strings.insert(name),
            section: Some(section),
            value: 0,
            size: 0,
            binding: elf::STB_LOCAL,
            sym_type: elf::STT_SECTION,
            is_common: false,
            defined: true,
            index: 0,
        });
        self.anchors.insert(section, i);
    }

    /// Order entries local-first (stable) and assign symbol-table indices.
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| self.entries[i].binding != elf::STB_LOCAL);
        for (index, &i) in order.iter().enumerate() {
            self.entries[i].index = index as u32;
        }
        self.order = order;
    }

    /// `sh_info` for `.symtab`: the index of the first non-local entry.
    pub fn first_non_local(&self) -> u32 {
        self.order
            .iter()
            .position(|&i| self.entries[i].binding != elf::STB_LOCAL)
            .unwrap_or(self.order.len()) as u32
    }

    /// Sorted index of a named symbol.
    pub fn find(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|&i| self.entries[i].index)
    }

    /// Sorted index of a section's anchor symbol.
    pub fn anchor_index(&self, section: SectionId) -> Option<u32> {
        self.anchors.get(&section).map(|&i| self.entries[i].index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Serialize the sorted table. `section_index` maps an output section to
    /// its section-header index.
    pub fn write<F>(&self, out: &mut Vec<u8>, section_index: F) -> (u64, u64)
    where
        F: Fn(SectionId) -> u32,
    {
        let start = out.len() as u64;
        for &i in &self.order {
            let entry = &self.entries[i];
            let shndx = if entry.is_common {
                elf::SHN_COMMON
            } else {
                match entry.section {
                    Some(id) => section_index(id) as u16,
                    None => elf::SHN_UNDEF,
                }
            };
            write_symbol(
                out,
                entry.name_offset,
                (entry.binding << 4) | entry.sym_type,
                shndx,
                entry.value,
                entry.size,
            );
        }
        (start, out.len() as u64 - start)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
