//! ELF64LE record serialization.
//!
//! The writer targets one ELF class and endianness per invocation: 64-bit
//! little-endian relocatable objects for x86-64. Constants come from
//! `object::elf`; the records themselves are laid down by hand so the writer
//! controls every offset.

use object::elf;

pub const EHDR_SIZE: usize = 64;
pub const SHDR_SIZE: usize = 64;
pub const SYM_SIZE: usize = 24;
pub const RELA_SIZE: usize = 24;

/// Fixed section-index allocation. All further indices are assigned in
/// section creation order.
pub struct SectionIndices;

impl SectionIndices {
    pub const NULL: u32 = 0;
    pub const STRTAB: u32 = 1;
    pub const SYMTAB: u32 = 2;
}

/// A section header accumulated during emission and serialized at the end.
#[derive(Debug, Clone, Default)]
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl SectionHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sh_name.to_le_bytes());
        out.extend_from_slice(&self.sh_type.to_le_bytes());
        out.extend_from_slice(&self.sh_flags.to_le_bytes());
        out.extend_from_slice(&self.sh_addr.to_le_bytes());
        out.extend_from_slice(&self.sh_offset.to_le_bytes());
        out.extend_from_slice(&self.sh_size.to_le_bytes());
        out.extend_from_slice(&self.sh_link.to_le_bytes());
        out.extend_from_slice(&self.sh_info.to_le_bytes());
        out.extend_from_slice(&self.sh_addralign.to_le_bytes());
        out.extend_from_slice(&self.sh_entsize.to_le_bytes());
    }
}

/// Write the ELF file header into the first `EHDR_SIZE` bytes of the image.
/// Called twice: once with placeholder values, and again at the end when the
/// section-header offset and count are known.
pub fn write_file_header(image: &mut [u8], e_shoff: u64, e_shnum: u16) {
    let buf = &mut image[..EHDR_SIZE];
    buf.fill(0);
    buf[0..4].copy_from_slice(&elf::ELFMAG);
    buf[4] = elf::ELFCLASS64;
    buf[5] = elf::ELFDATA2LSB;
    buf[6] = elf::EV_CURRENT;
    buf[7] = elf::ELFOSABI_NONE;
    // e_ident[EI_ABIVERSION] and padding stay zero.
    buf[16..18].copy_from_slice(&elf::ET_REL.to_le_bytes());
    buf[18..20].copy_from_slice(&elf::EM_X86_64.to_le_bytes());
    buf[20..24].copy_from_slice(&u32::from(elf::EV_CURRENT).to_le_bytes());
    // e_entry and e_phoff stay zero.
    buf[40..48].copy_from_slice(&e_shoff.to_le_bytes());
    // e_flags stays zero.
    buf[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    // e_phentsize and e_phnum stay zero.
    buf[58..60].copy_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
    buf[60..62].copy_from_slice(&e_shnum.to_le_bytes());
    buf[62..64].copy_from_slice(&(SectionIndices::STRTAB as u16).to_le_bytes());
}

/// Append one symbol-table entry.
pub fn write_symbol(
    out: &mut Vec<u8>,
    st_name: u32,
    st_info: u8,
    st_shndx: u16,
    st_value: u64,
    st_size: u64,
) {
    out.extend_from_slice(&st_name.to_le_bytes());
    out.push(st_info);
    out.push(0); // st_other
    out.extend_from_slice(&st_shndx.to_le_bytes());
    out.extend_from_slice(&st_value.to_le_bytes());
    out.extend_from_slice(&st_size.to_le_bytes());
}

/// Append one RELA entry.
pub fn write_rela(out: &mut Vec<u8>, r_offset: u64, symbol: u32, ty: u32, r_addend: i64) {
    out.extend_from_slice(&r_offset.to_le_bytes());
    let r_info = (u64::from(symbol) << 32) | u64::from(ty);
    out.extend_from_slice(&r_info.to_le_bytes());
    out.extend_from_slice(&r_addend.to_le_bytes());
}

/// Pad the image with zero bytes up to the given alignment.
pub fn align_to(out: &mut Vec<u8>, align: usize) {
    debug_assert!(align.is_power_of_two());
    while out.len() % align != 0 {
        out.push(0);
    }
}
