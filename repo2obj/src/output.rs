//! ELF output sections.
//!
//! Fragment sections are appended into output sections keyed by
//! `(ELF section type, discriminator)`. The discriminator is the member name
//! for linkonce members, forcing one ELF section per member name so each can
//! belong to its own COMDAT group; everything else uses a null discriminator
//! and merges by kind.

use object::elf;

use crate::error::LinkError;
use crate::strtab::StringTable;
use crate::symtab::SymbolTable;
use prepo_store::fragment::{Section, SectionKind, SECTION_KIND_COUNT};
use prepo_store::repo::{NameAddress, Repository};
use prepo_store::ticket::TicketMember;

/// ELF-level section classification: the repository section kinds plus the
/// two constructor/destructor array types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElfSectionType {
    Bss,
    Common,
    Data,
    RelRo,
    Text,
    Mergeable1ByteCString,
    Mergeable2ByteCString,
    Mergeable4ByteCString,
    MergeableConst4,
    MergeableConst8,
    MergeableConst16,
    MergeableConst32,
    MergeableConst,
    ReadOnly,
    ThreadBss,
    ThreadData,
    ThreadLocal,
    Metadata,
    InitArray,
    FiniArray,
}

/// Key of an output section.
pub type SectionId = (ElfSectionType, Option<NameAddress>);

/// Static attributes of an emittable output section.
#[derive(Debug)]
pub struct SectionAttributes {
    pub name: &'static str,
    pub sh_type: u32,
    pub sh_flags: u64,
}

/// The attribute table. Kinds without an entry cannot be emitted.
pub fn attributes(ty: ElfSectionType) -> Option<&'static SectionAttributes> {
    const BSS: SectionAttributes = SectionAttributes {
        name: ".bss",
        sh_type: elf::SHT_NOBITS,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_WRITE) as u64,
    };
    const DATA: SectionAttributes = SectionAttributes {
        name: ".data",
        sh_type: elf::SHT_PROGBITS,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_WRITE) as u64,
    };
    const TEXT: SectionAttributes = SectionAttributes {
        name: ".text",
        sh_type: elf::SHT_PROGBITS,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_EXECINSTR) as u64,
    };
    const RODATA: SectionAttributes = SectionAttributes {
        name: ".rodata",
        sh_type: elf::SHT_PROGBITS,
        sh_flags: elf::SHF_ALLOC as u64,
    };
    const TBSS: SectionAttributes = SectionAttributes {
        name: ".tbss",
        sh_type: elf::SHT_NOBITS,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_WRITE | elf::SHF_TLS) as u64,
    };
    const TDATA: SectionAttributes = SectionAttributes {
        name: ".tdata",
        sh_type: elf::SHT_PROGBITS,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_WRITE | elf::SHF_TLS) as u64,
    };
    const INIT_ARRAY: SectionAttributes = SectionAttributes {
        name: ".init_array",
        sh_type: elf::SHT_INIT_ARRAY,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_WRITE) as u64,
    };
    const FINI_ARRAY: SectionAttributes = SectionAttributes {
        name: ".fini_array",
        sh_type: elf::SHT_FINI_ARRAY,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_WRITE) as u64,
    };

    match ty {
        ElfSectionType::Bss => Some(&BSS),
        ElfSectionType::Data => Some(&DATA),
        ElfSectionType::Text => Some(&TEXT),
        ElfSectionType::ReadOnly => Some(&RODATA),
        ElfSectionType::ThreadBss => Some(&TBSS),
        ElfSectionType::ThreadData => Some(&TDATA),
        ElfSectionType::InitArray => Some(&INIT_ARRAY),
        ElfSectionType::FiniArray => Some(&FINI_ARRAY),
        _ => None,
    }
}

/// Name addresses that trigger special section placement.
pub struct SpecialNames {
    pub ctor: NameAddress,
    pub dtor: NameAddress,
}

impl SpecialNames {
    /// Resolve the constructor/destructor array names against the store's
    /// name index. A missing string stays null, which can never match a
    /// ticket member's name.
    pub fn initialize(repo: &Repository) -> Self {
        Self {
            ctor: repo
                .find_name("llvm.global_ctors")
                .unwrap_or(NameAddress::NULL),
            dtor: repo
                .find_name("llvm.global_dtors")
                .unwrap_or(NameAddress::NULL),
        }
    }
}

/// Classify a fragment section. The constructor/destructor arrays are
/// recognized by member name and remapped regardless of their section kind.
pub fn elf_section_type(
    kind: SectionKind,
    name: NameAddress,
    magics: &SpecialNames,
) -> ElfSectionType {
    if !name.is_null() {
        if name == magics.ctor {
            return ElfSectionType::InitArray;
        }
        if name == magics.dtor {
            return ElfSectionType::FiniArray;
        }
    }
    match kind {
        SectionKind::Bss => ElfSectionType::Bss,
        SectionKind::Common => ElfSectionType::Common,
        SectionKind::Data => ElfSectionType::Data,
        SectionKind::RelRo => ElfSectionType::RelRo,
        SectionKind::Text => ElfSectionType::Text,
        SectionKind::Mergeable1ByteCString => ElfSectionType::Mergeable1ByteCString,
        SectionKind::Mergeable2ByteCString => ElfSectionType::Mergeable2ByteCString,
        SectionKind::Mergeable4ByteCString => ElfSectionType::Mergeable4ByteCString,
        SectionKind::MergeableConst4 => ElfSectionType::MergeableConst4,
        SectionKind::MergeableConst8 => ElfSectionType::MergeableConst8,
        SectionKind::MergeableConst16 => ElfSectionType::MergeableConst16,
        SectionKind::MergeableConst32 => ElfSectionType::MergeableConst32,
        SectionKind::MergeableConst => ElfSectionType::MergeableConst,
        SectionKind::ReadOnly => ElfSectionType::ReadOnly,
        SectionKind::ThreadBss => ElfSectionType::ThreadBss,
        SectionKind::ThreadData => ElfSectionType::ThreadData,
        SectionKind::ThreadLocal => ElfSectionType::ThreadLocal,
        SectionKind::Metadata => ElfSectionType::Metadata,
    }
}

/// Where a relocation points.
#[derive(Debug, Clone)]
pub enum RelocTarget {
    /// A named symbol (external fixups).
    Named(String),
    /// The anchor symbol of an output section (internal fixups).
    Section(SectionId),
}

/// A pending relocation within an output section.
#[derive(Debug, Clone)]
pub struct Reloc {
    pub offset: u64,
    pub target: RelocTarget,
    pub ty: u8,
    pub addend: i64,
}

/// Placement of one fragment section: the output section it lands in and the
/// byte offset its contribution starts at. Indexed by raw section kind, this
/// is the per-fragment map through which internal fixups are rewritten.
#[derive(Debug, Clone, Copy)]
pub struct SectionInfo {
    pub id: SectionId,
    pub base: u64,
}

/// The per-fragment local section map.
pub type LocalSectionMap = [Option<SectionInfo>; SECTION_KIND_COUNT];

/// An ELF output section being accumulated.
#[derive(Debug)]
pub struct OutputSection {
    pub id: SectionId,
    pub attrs: &'static SectionAttributes,
    pub data: Vec<u8>,
    pub align: u32,
    pub relocs: Vec<Reloc>,
    /// Key of the COMDAT group this section belongs to, if any.
    pub group: Option<NameAddress>,
    /// Section-header index, assigned during emission.
    pub index: u32,
}

fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

impl OutputSection {
    pub fn new(id: SectionId) -> Result<Self, LinkError> {
        let attrs = attributes(id.0).ok_or_else(|| {
            // Only kind-mapped sections can land here; recover the kind name
            // for the diagnostic from the id.
            LinkError::UnmappedSection(unmapped_kind(id.0))
        })?;
        Ok(Self {
            id,
            attrs,
            data: Vec::new(),
            align: 1,
            relocs: Vec::new(),
            group: None,
            index: 0,
        })
    }

    /// The offset at which the next contribution with the given alignment
    /// will land. Used before `append` so a symbol's value can be recorded
    /// ahead of the copy.
    pub fn aligned_contribution_size(&self, align: u32) -> u64 {
        align_up(self.data.len() as u64, u64::from(align.max(1)))
    }

    /// Make this section a member of a COMDAT group.
    pub fn attach_to_group(&mut self, key: NameAddress) {
        self.group = Some(key);
    }

    /// Append one fragment section: pad to its alignment, copy the payload,
    /// record the member's symbol, turn external fixups into named
    /// relocations and internal fixups into section-anchor relocations
    /// rebased through the fragment's local section map.
    pub fn append(
        &mut self,
        member: &TicketMember,
        section: &Section<'_>,
        repo: &Repository,
        symbols: &mut SymbolTable,
        strings: &mut StringTable,
        locations: &LocalSectionMap,
    ) -> Result<(), LinkError> {
        let align = section.alignment().max(1);
        self.align = self.align.max(align);
        let start = self.aligned_contribution_size(align);
        self.data.resize(start as usize, 0);

        let name = repo.name(member.name)?;
        symbols.insert_symbol(
            strings,
            name,
            self.id,
            start,
            section.data().len() as u64,
            member.linkage,
        );

        self.data.extend_from_slice(section.data());

        for fixup in section.xfixups() {
            let symbol = repo.name(fixup.name)?;
            symbols.insert_undefined(strings, symbol);
            self.relocs.push(Reloc {
                offset: start + fixup.offset,
                target: RelocTarget::Named(symbol.to_string()),
                ty: fixup.ty,
                addend: fixup.addend as i64,
            });
        }

        for fixup in section.ifixups() {
            let target = locations
                .get(fixup.section as usize)
                .copied()
                .flatten()
                .ok_or(LinkError::IfixupTargetMissing {
                    section: fixup.section,
                })?;
            let target_attrs = attributes(target.id.0).ok_or_else(|| {
                LinkError::UnmappedSection(unmapped_kind(target.id.0))
            })?;
            symbols.insert_anchor(strings, target_attrs.name, target.id);
            self.relocs.push(Reloc {
                offset: start + u64::from(fixup.offset),
                target: RelocTarget::Section(target.id),
                ty: fixup.ty,
                addend: i64::from(fixup.addend) + target.base as i64,
            });
        }

        Ok(())
    }
}

/// A COMDAT group: signature name, member sections, and the header slot
/// reserved for it (0 = unassigned).
pub struct GroupInfo {
    pub signature: NameAddress,
    pub members: Vec<SectionId>,
    pub section_index: u32,
}

impl GroupInfo {
    pub fn new(signature: NameAddress) -> Self {
        Self {
            signature,
            members: Vec::new(),
            section_index: 0,
        }
    }
}

/// Best-effort reverse mapping for diagnostics about unmappable kinds.
fn unmapped_kind(ty: ElfSectionType) -> SectionKind {
    match ty {
        ElfSectionType::Common => SectionKind::Common,
        ElfSectionType::RelRo => SectionKind::RelRo,
        ElfSectionType::Mergeable1ByteCString => SectionKind::Mergeable1ByteCString,
        ElfSectionType::Mergeable2ByteCString => SectionKind::Mergeable2ByteCString,
        ElfSectionType::Mergeable4ByteCString => SectionKind::Mergeable4ByteCString,
        ElfSectionType::MergeableConst4 => SectionKind::MergeableConst4,
        ElfSectionType::MergeableConst8 => SectionKind::MergeableConst8,
        ElfSectionType::MergeableConst16 => SectionKind::MergeableConst16,
        ElfSectionType::MergeableConst32 => SectionKind::MergeableConst32,
        ElfSectionType::MergeableConst => SectionKind::MergeableConst,
        ElfSectionType::ThreadLocal => SectionKind::ThreadLocal,
        ElfSectionType::Metadata => SectionKind::Metadata,
        // Mapped kinds never reach this path.
        ElfSectionType::Bss => SectionKind::Bss,
        ElfSectionType::Data => SectionKind::Data,
        ElfSectionType::Text => SectionKind::Text,
        ElfSectionType::ReadOnly => SectionKind::ReadOnly,
        ElfSectionType::ThreadBss => SectionKind::ThreadBss,
        ElfSectionType::ThreadData => SectionKind::ThreadData,
        ElfSectionType::InitArray => SectionKind::Data,
        ElfSectionType::FiniArray => SectionKind::Data,
    }
}
