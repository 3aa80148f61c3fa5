//! The packed fragment model.
//!
//! A fragment maps section kinds to sections, where a section is payload
//! bytes plus internal (section-relative) and external (symbol-relative)
//! fix-ups. A fragment is a single contiguous byte block: a sparse-array
//! header followed by naturally aligned section records. This is also the
//! store's on-disk form, so a fragment loaded from the store is a zero-copy
//! view and is immutable once built.

use std::fmt;

use crate::repo::NameAddress;

/// Section kinds. At most one section of each kind per fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SectionKind {
    Bss = 0,
    Common = 1,
    Data = 2,
    RelRo = 3,
    Text = 4,
    Mergeable1ByteCString = 5,
    Mergeable2ByteCString = 6,
    Mergeable4ByteCString = 7,
    MergeableConst4 = 8,
    MergeableConst8 = 9,
    MergeableConst16 = 10,
    MergeableConst32 = 11,
    MergeableConst = 12,
    ReadOnly = 13,
    ThreadBss = 14,
    ThreadData = 15,
    ThreadLocal = 16,
    Metadata = 17,
}

pub const SECTION_KIND_COUNT: usize = 18;

impl SectionKind {
    pub const ALL: [SectionKind; SECTION_KIND_COUNT] = [
        SectionKind::Bss,
        SectionKind::Common,
        SectionKind::Data,
        SectionKind::RelRo,
        SectionKind::Text,
        SectionKind::Mergeable1ByteCString,
        SectionKind::Mergeable2ByteCString,
        SectionKind::Mergeable4ByteCString,
        SectionKind::MergeableConst4,
        SectionKind::MergeableConst8,
        SectionKind::MergeableConst16,
        SectionKind::MergeableConst32,
        SectionKind::MergeableConst,
        SectionKind::ReadOnly,
        SectionKind::ThreadBss,
        SectionKind::ThreadData,
        SectionKind::ThreadLocal,
        SectionKind::Metadata,
    ];

    pub fn from_u8(v: u8) -> Option<SectionKind> {
        Self::ALL.get(v as usize).copied()
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::Bss => "bss",
            SectionKind::Common => "common",
            SectionKind::Data => "data",
            SectionKind::RelRo => "rel_ro",
            SectionKind::Text => "text",
            SectionKind::Mergeable1ByteCString => "mergeable_1_byte_c_string",
            SectionKind::Mergeable2ByteCString => "mergeable_2_byte_c_string",
            SectionKind::Mergeable4ByteCString => "mergeable_4_byte_c_string",
            SectionKind::MergeableConst4 => "mergeable_const_4",
            SectionKind::MergeableConst8 => "mergeable_const_8",
            SectionKind::MergeableConst16 => "mergeable_const_16",
            SectionKind::MergeableConst32 => "mergeable_const_32",
            SectionKind::MergeableConst => "mergeable_const",
            SectionKind::ReadOnly => "read_only",
            SectionKind::ThreadBss => "thread_bss",
            SectionKind::ThreadData => "thread_data",
            SectionKind::ThreadLocal => "thread_local",
            SectionKind::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

/// A fix-up whose target lies within the same fragment.
///
/// 12 bytes on the wire: section, type, two padding bytes, then 32-bit
/// offset and addend. The 32-bit offset is a deliberate limit: internal
/// fix-ups land within a single section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalFixup {
    /// Target section kind, as a raw `SectionKind` value.
    pub section: u8,
    /// Relocation type.
    pub ty: u8,
    pub offset: u32,
    pub addend: u32,
}

impl InternalFixup {
    pub const SIZE: usize = 12;

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.section);
        out.push(self.ty);
        out.extend_from_slice(&[0u8; 2]);
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.addend.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> InternalFixup {
        InternalFixup {
            section: bytes[0],
            ty: bytes[1],
            offset: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            addend: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        }
    }
}

/// A fix-up naming an external symbol. 32 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalFixup {
    /// Address of the symbol name in the store's name table.
    pub name: NameAddress,
    /// Relocation type.
    pub ty: u8,
    pub offset: u64,
    pub addend: u64,
}

impl ExternalFixup {
    pub const SIZE: usize = 32;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name.0.to_le_bytes());
        out.push(self.ty);
        out.extend_from_slice(&[0u8; 7]);
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.addend.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> ExternalFixup {
        ExternalFixup {
            name: NameAddress(u64::from_le_bytes(bytes[0..8].try_into().unwrap())),
            ty: bytes[8],
            offset: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            addend: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
        }
    }
}

/// The mutable form of a section, used while a fragment is assembled.
#[derive(Debug, Clone)]
pub struct SectionContent {
    pub kind: SectionKind,
    /// Power-of-two byte alignment of the payload.
    pub alignment: u32,
    pub data: Vec<u8>,
    pub ifixups: Vec<InternalFixup>,
    pub xfixups: Vec<ExternalFixup>,
}

impl SectionContent {
    pub fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            alignment: 1,
            data: Vec::new(),
            ifixups: Vec::new(),
            xfixups: Vec::new(),
        }
    }
}

/// Errors raised while building or reading fragments.
#[derive(Debug)]
pub enum FragmentError {
    DuplicateSection(SectionKind),
    BadAlignment(SectionKind, u32),
    IfixupOutOfRange {
        kind: SectionKind,
        offset: u32,
        size: u64,
    },
    Truncated,
}

impl fmt::Display for FragmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentError::DuplicateSection(kind) => {
                write!(f, "fragment contains more than one {kind} section")
            }
            FragmentError::BadAlignment(kind, align) => {
                write!(f, "{kind} section alignment {align} is not a power of two")
            }
            FragmentError::IfixupOutOfRange { kind, offset, size } => write!(
                f,
                "internal fixup offset {offset} lies outside the {kind} section ({size} bytes)"
            ),
            FragmentError::Truncated => write!(f, "fragment storage is truncated"),
        }
    }
}

impl std::error::Error for FragmentError {}

// ---------------------------------------------------------------------------
// Wire layout
// ---------------------------------------------------------------------------

// Sparse-array header: a presence bitmap padded to 8 bytes, then one u64
// section offset per present kind, in kind order.
const BITMAP_SIZE: usize = 8;
// Section record: ifixup count, xfixup count, data size, alignment, reserved.
const SECTION_RECORD_SIZE: usize = 24;

fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

fn section_size_bytes(data_len: usize, num_ifixups: usize, num_xfixups: usize) -> usize {
    let mut size = SECTION_RECORD_SIZE + data_len;
    if num_ifixups > 0 {
        size = align_up(size, 4) + num_ifixups * InternalFixup::SIZE;
    }
    if num_xfixups > 0 {
        size = align_up(size, 8) + num_xfixups * ExternalFixup::SIZE;
    }
    size
}

/// A read-only view of one section within a fragment.
#[derive(Clone, Copy)]
pub struct Section<'a> {
    bytes: &'a [u8],
}

impl<'a> Section<'a> {
    fn num_ifixups(&self) -> usize {
        u32::from_le_bytes(self.bytes[0..4].try_into().unwrap()) as usize
    }

    fn num_xfixups(&self) -> usize {
        u32::from_le_bytes(self.bytes[4..8].try_into().unwrap()) as usize
    }

    fn data_len(&self) -> usize {
        u64::from_le_bytes(self.bytes[8..16].try_into().unwrap()) as usize
    }

    pub fn alignment(&self) -> u32 {
        u32::from_le_bytes(self.bytes[16..20].try_into().unwrap())
    }

    /// The payload bytes, borrowed from the fragment's storage.
    pub fn data(&self) -> &'a [u8] {
        &self.bytes[SECTION_RECORD_SIZE..SECTION_RECORD_SIZE + self.data_len()]
    }

    fn ifixups_start(&self) -> usize {
        align_up(SECTION_RECORD_SIZE + self.data_len(), 4)
    }

    pub fn ifixups(&self) -> impl Iterator<Item = InternalFixup> + 'a {
        let start = self.ifixups_start();
        let bytes = self.bytes;
        (0..self.num_ifixups()).map(move |i| {
            InternalFixup::decode(&bytes[start + i * InternalFixup::SIZE..])
        })
    }

    pub fn xfixups(&self) -> impl Iterator<Item = ExternalFixup> + 'a {
        let mut start = self.ifixups_start();
        if self.num_ifixups() > 0 {
            start += self.num_ifixups() * InternalFixup::SIZE;
        }
        start = align_up(start, 8);
        let bytes = self.bytes;
        (0..self.num_xfixups()).map(move |i| {
            ExternalFixup::decode(&bytes[start + i * ExternalFixup::SIZE..])
        })
    }

    fn size_bytes(&self) -> usize {
        section_size_bytes(self.data_len(), self.num_ifixups(), self.num_xfixups())
    }
}

/// A read-only view of a packed fragment.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    bytes: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Wrap and validate a fragment byte block.
    pub fn new(bytes: &'a [u8]) -> Result<Fragment<'a>, FragmentError> {
        if bytes.len() < BITMAP_SIZE {
            return Err(FragmentError::Truncated);
        }
        let fragment = Fragment { bytes };
        for kind in fragment.kinds() {
            let offset = fragment.section_offset(kind).ok_or(FragmentError::Truncated)?;
            if offset + SECTION_RECORD_SIZE > bytes.len() {
                return Err(FragmentError::Truncated);
            }
            let section = Section {
                bytes: &bytes[offset..],
            };
            if offset + section.size_bytes() > bytes.len() {
                return Err(FragmentError::Truncated);
            }
        }
        Ok(fragment)
    }

    fn bitmap(&self) -> u32 {
        u32::from_le_bytes(self.bytes[0..4].try_into().unwrap())
    }

    pub fn num_sections(&self) -> usize {
        self.bitmap().count_ones() as usize
    }

    pub fn has_section(&self, kind: SectionKind) -> bool {
        self.bitmap() & (1 << kind as u32) != 0
    }

    /// Present section kinds, in kind order.
    pub fn kinds(&self) -> impl Iterator<Item = SectionKind> + 'a {
        let bitmap = self.bitmap();
        SectionKind::ALL
            .into_iter()
            .filter(move |k| bitmap & (1 << *k as u32) != 0)
    }

    fn section_offset(&self, kind: SectionKind) -> Option<usize> {
        if !self.has_section(kind) {
            return None;
        }
        // The offset slot index is the rank of the kind among present kinds.
        let rank = (self.bitmap() & ((1u32 << kind as u32) - 1)).count_ones() as usize;
        let slot = BITMAP_SIZE + rank * 8;
        if slot + 8 > self.bytes.len() {
            return None;
        }
        Some(u64::from_le_bytes(self.bytes[slot..slot + 8].try_into().unwrap()) as usize)
    }

    pub fn section(&self, kind: SectionKind) -> Option<Section<'a>> {
        let offset = self.section_offset(kind)?;
        Some(Section {
            bytes: &self.bytes[offset..],
        })
    }

    /// Pack section contents into a fragment byte block.
    ///
    /// Computes the total size up front and lays the sparse-array header and
    /// the aligned section records into a single allocation. Each internal
    /// fixup offset must lie within its section's payload; the u32 offset
    /// field is the enforced range limit.
    pub fn build(contents: &[SectionContent]) -> Result<Vec<u8>, FragmentError> {
        let mut bitmap = 0u32;
        for content in contents {
            let bit = 1u32 << content.kind as u32;
            if bitmap & bit != 0 {
                return Err(FragmentError::DuplicateSection(content.kind));
            }
            bitmap |= bit;
            if !content.alignment.is_power_of_two() {
                return Err(FragmentError::BadAlignment(content.kind, content.alignment));
            }
            for fixup in &content.ifixups {
                if u64::from(fixup.offset) >= content.data.len() as u64 {
                    return Err(FragmentError::IfixupOutOfRange {
                        kind: content.kind,
                        offset: fixup.offset,
                        size: content.data.len() as u64,
                    });
                }
            }
        }

        let mut ordered: Vec<&SectionContent> = contents.iter().collect();
        ordered.sort_by_key(|c| c.kind);

        let header_size = BITMAP_SIZE + ordered.len() * 8;
        let mut out = Vec::new();
        out.extend_from_slice(&bitmap.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.resize(header_size, 0);

        for (slot, content) in ordered.iter().enumerate() {
            let offset = align_up(out.len(), 8);
            out.resize(offset, 0);
            out[BITMAP_SIZE + slot * 8..BITMAP_SIZE + slot * 8 + 8]
                .copy_from_slice(&(offset as u64).to_le_bytes());

            out.extend_from_slice(&(content.ifixups.len() as u32).to_le_bytes());
            out.extend_from_slice(&(content.xfixups.len() as u32).to_le_bytes());
            out.extend_from_slice(&(content.data.len() as u64).to_le_bytes());
            out.extend_from_slice(&content.alignment.to_le_bytes());
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&content.data);

            if !content.ifixups.is_empty() {
                let padded = align_up(out.len() - offset, 4) + offset;
                out.resize(padded, 0);
                for fixup in &content.ifixups {
                    fixup.encode(&mut out);
                }
            }
            if !content.xfixups.is_empty() {
                let padded = align_up(out.len() - offset, 8) + offset;
                out.resize(padded, 0);
                for fixup in &content.xfixups {
                    fixup.encode(&mut out);
                }
            }
        }

        Ok(out)
    }
}
