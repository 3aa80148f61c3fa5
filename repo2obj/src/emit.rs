//! Two-pass ELF emission.
//!
//! Group sections must precede their members in the section-header table,
//! and their headers carry the signature symbol's index, which exists only
//! after the symbol sort. The writer therefore reserves group header slots
//! while members are written, patches group/string/symbol headers as their
//! data lands, and rewrites the file header once the section-header table
//! offset is known.

use indexmap::IndexMap;
use object::elf;

use crate::elf::{
    align_to, write_file_header, write_rela, EHDR_SIZE, RELA_SIZE, SYM_SIZE, SectionHeader,
    SectionIndices,
};
use crate::error::LinkError;
use crate::output::{
    attributes, elf_section_type, GroupInfo, LocalSectionMap, OutputSection, RelocTarget,
    SectionId, SectionInfo, SpecialNames,
};
use crate::strtab::StringTable;
use crate::symtab::SymbolTable;
use prepo_store::fragment::{SectionKind, SECTION_KIND_COUNT};
use prepo_store::repo::{NameAddress, Repository};
use prepo_store::ticket::{Linkage, Ticket};

/// All mutable state of one materialization run.
pub struct ElfState {
    pub sections: IndexMap<SectionId, OutputSection>,
    pub groups: IndexMap<NameAddress, GroupInfo>,
    pub strings: StringTable,
    pub symbols: SymbolTable,
    pub headers: Vec<SectionHeader>,
}

impl ElfState {
    fn new() -> Self {
        Self {
            sections: IndexMap::new(),
            groups: IndexMap::new(),
            strings: StringTable::new(),
            symbols: SymbolTable::new(),
            headers: Vec::new(),
        }
    }

    /// Headers 0..=2: null, `.strtab`, `.symtab`.
    fn init_standard_sections(&mut self) {
        debug_assert_eq!(self.headers.len(), SectionIndices::NULL as usize);
        self.headers.push(SectionHeader::default());

        let mut strtab = SectionHeader::default();
        strtab.sh_name = self.strings.insert(".strtab");
        strtab.sh_type = elf::SHT_STRTAB;
        strtab.sh_addralign = 1;
        debug_assert_eq!(self.headers.len(), SectionIndices::STRTAB as usize);
        self.headers.push(strtab);

        let mut symtab = SectionHeader::default();
        symtab.sh_name = self.strings.insert(".symtab");
        symtab.sh_type = elf::SHT_SYMTAB;
        symtab.sh_link = SectionIndices::STRTAB;
        symtab.sh_entsize = SYM_SIZE as u64;
        symtab.sh_addralign = 8;
        debug_assert_eq!(self.headers.len(), SectionIndices::SYMTAB as usize);
        self.headers.push(symtab);
    }

    /// Reserve a group's section-header slot, filling in the signature
    /// symbol's index. Requires sorted symbols.
    fn build_group_header(
        &mut self,
        repo: &Repository,
        group_key: NameAddress,
    ) -> Result<(), LinkError> {
        let Some(group) = self.groups.get_mut(&group_key) else {
            return Ok(());
        };
        if group.section_index != 0 {
            return Ok(());
        }

        let signature = repo.name(group.signature)?;
        let symbol = self
            .symbols
            .find(signature)
            .ok_or_else(|| LinkError::UnresolvedSymbol(signature.to_string()))?;

        let mut sh = SectionHeader::default();
        sh.sh_name = self.strings.insert(".group");
        sh.sh_type = elf::SHT_GROUP;
        sh.sh_link = SectionIndices::SYMTAB;
        sh.sh_info = symbol;
        sh.sh_entsize = 4;
        sh.sh_addralign = 4;

        group.section_index = self.headers.len() as u32;
        self.headers.push(sh);
        Ok(())
    }

    /// Write one output section's payload (and its `.rela.*` sibling when it
    /// has relocations), appending their headers.
    fn write_section(&mut self, out: &mut Vec<u8>, key: SectionId) -> Result<(), LinkError> {
        let Some(section) = self.sections.get(&key) else {
            return Ok(());
        };

        let mut sh = SectionHeader::default();
        sh.sh_name = self.strings.insert(section.attrs.name);
        sh.sh_type = section.attrs.sh_type;
        sh.sh_flags = section.attrs.sh_flags
            | if section.group.is_some() {
                u64::from(elf::SHF_GROUP)
            } else {
                0
            };
        sh.sh_addralign = u64::from(section.align);
        align_to(out, section.align.max(1) as usize);
        sh.sh_offset = out.len() as u64;
        sh.sh_size = section.data.len() as u64;
        if sh.sh_type != elf::SHT_NOBITS {
            out.extend_from_slice(&section.data);
        }
        self.headers.push(sh);

        if section.relocs.is_empty() {
            return Ok(());
        }

        let mut rh = SectionHeader::default();
        rh.sh_name = self.strings.insert(&format!(".rela{}", section.attrs.name));
        rh.sh_type = elf::SHT_RELA;
        // The sibling is listed in the member's group body, so it must carry
        // SHF_GROUP like the payload section does.
        rh.sh_flags = u64::from(elf::SHF_INFO_LINK)
            | if section.group.is_some() {
                u64::from(elf::SHF_GROUP)
            } else {
                0
            };
        align_to(out, 8);
        rh.sh_offset = out.len() as u64;
        for reloc in &section.relocs {
            let symbol = match &reloc.target {
                RelocTarget::Named(name) => self
                    .symbols
                    .find(name)
                    .ok_or_else(|| LinkError::UnresolvedSymbol(name.clone()))?,
                RelocTarget::Section(id) => self.symbols.anchor_index(*id).ok_or_else(|| {
                    let name = attributes(id.0).map(|a| a.name).unwrap_or("?");
                    LinkError::UnresolvedSymbol(name.to_string())
                })?,
            };
            write_rela(out, reloc.offset, symbol, u32::from(reloc.ty), reloc.addend);
        }
        rh.sh_size = (section.relocs.len() * RELA_SIZE) as u64;
        rh.sh_link = SectionIndices::SYMTAB;
        rh.sh_info = section.index;
        rh.sh_addralign = 8;
        rh.sh_entsize = RELA_SIZE as u64;
        self.headers.push(rh);
        Ok(())
    }

    /// Write the group bodies recorded by earlier `build_group_header` calls
    /// and patch their headers with the final location and size.
    fn write_group_sections(&mut self, out: &mut Vec<u8>) {
        for group in self.groups.values() {
            align_to(out, 4);
            let start = out.len();
            out.extend_from_slice(&elf::GRP_COMDAT.to_le_bytes());

            for member in &group.members {
                let Some(section) = self.sections.get(member) else {
                    continue;
                };
                out.extend_from_slice(&section.index.to_le_bytes());
                if !section.relocs.is_empty() {
                    // The member's .rela.* sibling is grouped with it.
                    out.extend_from_slice(&(section.index + 1).to_le_bytes());
                }
            }

            let header = &mut self.headers[group.section_index as usize];
            header.sh_offset = start as u64;
            header.sh_size = (out.len() - start) as u64;
        }
    }
}

/// Process one ticket member: fetch its fragment, select output sections,
/// and append each fragment section.
fn process_member(
    state: &mut ElfState,
    repo: &Repository,
    magics: &SpecialNames,
    member: &prepo_store::ticket::TicketMember,
) -> Result<(), LinkError> {
    let fragment = repo.fragment(&member.digest)?;

    // Common symbols carry no section data of their own: the fragment must
    // be a sole BSS section whose size becomes the symbol's size.
    if member.linkage == Linkage::Common {
        let name = repo.name(member.name)?;
        if fragment.num_sections() != 1 || !fragment.has_section(SectionKind::Bss) {
            return Err(LinkError::CommonNotSoleBss(name.to_string()));
        }
        if let Some(section) = fragment.section(SectionKind::Bss) {
            state
                .symbols
                .insert_common(&mut state.strings, name, section.data().len() as u64);
        }
        return Ok(());
    }

    let is_link_once = member.linkage.is_link_once();
    let discriminator = if is_link_once { Some(member.name) } else { None };

    // First pass over the fragment's sections: select (or create) the ELF
    // output section each will land in and record where its contribution
    // will start, so symbols and rebased internal fixups can be resolved
    // before any bytes are copied.
    let mut locations: LocalSectionMap = [None; SECTION_KIND_COUNT];
    for kind in fragment.kinds() {
        let Some(fragment_section) = fragment.section(kind) else {
            continue;
        };
        let ty = elf_section_type(kind, member.name, magics);
        let id = (ty, discriminator);

        let is_new = !state.sections.contains_key(&id);
        if is_new {
            state.sections.insert(id, OutputSection::new(id)?);
            // A fresh ELF section for a linkonce member joins the member's
            // COMDAT group.
            if is_link_once {
                let group = state
                    .groups
                    .entry(member.name)
                    .or_insert_with(|| GroupInfo::new(member.name));
                group.members.push(id);
                if let Some(section) = state.sections.get_mut(&id) {
                    section.attach_to_group(member.name);
                }
            }
        }

        let base = state.sections[&id].aligned_contribution_size(fragment_section.alignment());
        locations[kind as usize] = Some(SectionInfo { id, base });
    }

    // Second pass: append the data. This cannot fold into the first loop
    // because appends consult the completed local section map.
    for kind in fragment.kinds() {
        let Some(fragment_section) = fragment.section(kind) else {
            continue;
        };
        let Some(info) = locations[kind as usize] else {
            continue;
        };
        let Some(section) = state.sections.get_mut(&info.id) else {
            continue;
        };
        section.append(
            member,
            &fragment_section,
            repo,
            &mut state.symbols,
            &mut state.strings,
            &locations,
        )?;
    }

    Ok(())
}

/// Materialize the relocatable ELF image for a ticket.
pub fn materialize(repo: &Repository, ticket: &Ticket) -> Result<Vec<u8>, LinkError> {
    let mut state = ElfState::new();
    let magics = SpecialNames::initialize(repo);

    for member in &ticket.members {
        process_member(&mut state, repo, &magics, member)?;
    }

    state.symbols.sort();

    let mut out = vec![0u8; EHDR_SIZE];
    write_file_header(&mut out, 0, 0);
    state.init_standard_sections();

    let keys: Vec<SectionId> = state.sections.keys().copied().collect();
    for key in keys {
        if let Some(group_key) = state.sections[&key].group {
            state.build_group_header(repo, group_key)?;
        }
        let index = state.headers.len() as u32;
        if let Some(section) = state.sections.get_mut(&key) {
            section.index = index;
        }
        state.write_section(&mut out, key)?;
    }

    state.write_group_sections(&mut out);

    // The string table, then patch its header.
    {
        let header = &mut state.headers[SectionIndices::STRTAB as usize];
        header.sh_offset = out.len() as u64;
        header.sh_size = state.strings.len() as u64;
    }
    out.extend_from_slice(state.strings.as_bytes());

    // The symbol table, local entries first, then patch its header.
    align_to(&mut out, 8);
    let sections = &state.sections;
    let (symtab_offset, symtab_size) = state
        .symbols
        .write(&mut out, |id| sections[&id].index);
    {
        let header = &mut state.headers[SectionIndices::SYMTAB as usize];
        header.sh_offset = symtab_offset;
        header.sh_size = symtab_size;
        header.sh_info = state.symbols.first_non_local();
    }

    // The section-header table, then the real file header.
    align_to(&mut out, 8);
    let shoff = out.len() as u64;
    for header in &state.headers {
        header.encode(&mut out);
    }
    write_file_header(&mut out, shoff, state.headers.len() as u16);

    Ok(out)
}
