//! The store file: a read-only repository view and its builder.
//!
//! A store is a single file holding three regions located by a fixed header:
//! an interned name table, packed fragment payloads indexed by digest, and
//! ticket records indexed by UUID. The reader memory-maps the file once and
//! hands out zero-copy fragment views for the lifetime of the map.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use prepo_hash::Digest;

use crate::fragment::{Fragment, FragmentError, SectionContent};
use crate::ticket::{Linkage, Ticket, TicketMember};
use crate::uuid::Uuid;

/// Address of an interned string: the byte offset of its entry in the store.
/// Address zero is the null address and never names a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameAddress(pub u64);

impl NameAddress {
    pub const NULL: NameAddress = NameAddress(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

const STORE_MAGIC: &[u8; 8] = b"RepoStor";
const STORE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 64;

const FRAGMENT_INDEX_ENTRY_SIZE: usize = 32;
const TICKET_INDEX_ENTRY_SIZE: usize = 24;
const TICKET_MEMBER_SIZE: usize = 25;

/// Errors raised by store access.
#[derive(Debug)]
pub enum StoreError {
    Io(PathBuf, io::Error),
    NotAStoreFile(PathBuf),
    Corrupt(String),
    TicketNotFound(Uuid),
    FragmentNotFound(Digest),
    Fragment(FragmentError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(path, err) => write!(f, "'{}' ({err})", path.display()),
            StoreError::NotAStoreFile(path) => {
                write!(f, "'{}' is not a program repository", path.display())
            }
            StoreError::Corrupt(what) => write!(f, "repository is corrupt: {what}"),
            StoreError::TicketNotFound(uuid) => write!(f, "ticket {uuid} was not found"),
            StoreError::FragmentNotFound(digest) => {
                write!(f, "fragment {digest} was not found")
            }
            StoreError::Fragment(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<FragmentError> for StoreError {
    fn from(err: FragmentError) -> Self {
        StoreError::Fragment(err)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A read-only view over a store file. Opened once per run and held open;
/// fragment views borrow the underlying map.
pub struct Repository {
    map: Mmap,
    names: HashMap<String, NameAddress>,
    fragments: HashMap<Digest, (usize, usize)>,
    tickets: HashMap<Uuid, usize>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(offset..offset + 4)?.try_into().ok()?))
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.get(offset..offset + 8)?.try_into().ok()?))
}

impl Repository {
    /// Open a store file read-only and load its indices.
    pub fn open(path: &Path) -> Result<Repository, StoreError> {
        let file = File::open(path).map_err(|err| StoreError::Io(path.to_path_buf(), err))?;
        let map = unsafe { Mmap::map(&file) }
            .map_err(|err| StoreError::Io(path.to_path_buf(), err))?;

        let bytes: &[u8] = &map;
        if bytes.len() < HEADER_SIZE
            || &bytes[..8] != STORE_MAGIC
            || read_u32(bytes, 8) != Some(STORE_VERSION)
        {
            return Err(StoreError::NotAStoreFile(path.to_path_buf()));
        }

        // The length check above covers the whole fixed header.
        let header_field = |offset: usize| {
            u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("header field"))
                as usize
        };
        let names_offset = header_field(16);
        let names_size = header_field(24);
        let fragment_index = header_field(32);
        let fragment_count = header_field(40);
        let ticket_index = header_field(48);
        let ticket_count = header_field(56);

        // Name table: length-prefixed UTF-8 entries laid end to end.
        let mut names = HashMap::new();
        let names_end = names_offset
            .checked_add(names_size)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| StoreError::Corrupt("name table out of bounds".into()))?;
        let mut pos = names_offset;
        while pos < names_end {
            let len = read_u32(bytes, pos)
                .ok_or_else(|| StoreError::Corrupt("name entry truncated".into()))?
                as usize;
            let start = pos + 4;
            if start + len > names_end {
                return Err(StoreError::Corrupt("name entry truncated".into()));
            }
            let text = std::str::from_utf8(&bytes[start..start + len])
                .map_err(|_| StoreError::Corrupt("name entry is not UTF-8".into()))?;
            names.insert(text.to_string(), NameAddress(pos as u64));
            pos = start + len;
        }

        // Fragment index: (digest, offset, size) triples.
        let mut fragments = HashMap::with_capacity(fragment_count);
        for i in 0..fragment_count {
            let entry = fragment_index + i * FRAGMENT_INDEX_ENTRY_SIZE;
            let digest_bytes: [u8; 16] = bytes
                .get(entry..entry + 16)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| StoreError::Corrupt("fragment index truncated".into()))?;
            let offset = read_u64(bytes, entry + 16)
                .ok_or_else(|| StoreError::Corrupt("fragment index truncated".into()))?
                as usize;
            let size = read_u64(bytes, entry + 24)
                .ok_or_else(|| StoreError::Corrupt("fragment index truncated".into()))?
                as usize;
            if offset + size > bytes.len() {
                return Err(StoreError::Corrupt("fragment payload out of bounds".into()));
            }
            fragments.insert(Digest::from_bytes(digest_bytes), (offset, size));
        }

        // Ticket index: (uuid, offset) pairs.
        let mut tickets = HashMap::with_capacity(ticket_count);
        for i in 0..ticket_count {
            let entry = ticket_index + i * TICKET_INDEX_ENTRY_SIZE;
            let uuid_bytes: [u8; 16] = bytes
                .get(entry..entry + 16)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| StoreError::Corrupt("ticket index truncated".into()))?;
            let offset = read_u64(bytes, entry + 16)
                .ok_or_else(|| StoreError::Corrupt("ticket index truncated".into()))?
                as usize;
            tickets.insert(Uuid::from_bytes(uuid_bytes), offset);
        }

        Ok(Repository {
            map,
            names,
            fragments,
            tickets,
        })
    }

    /// Look up a ticket by UUID.
    pub fn ticket(&self, uuid: &Uuid) -> Result<Ticket, StoreError> {
        let bytes: &[u8] = &self.map;
        let offset = *self
            .tickets
            .get(uuid)
            .ok_or(StoreError::TicketNotFound(*uuid))?;
        let count = read_u64(bytes, offset)
            .ok_or_else(|| StoreError::Corrupt("ticket record truncated".into()))?
            as usize;

        let mut members = Vec::with_capacity(count);
        for i in 0..count {
            let entry = offset + 8 + i * TICKET_MEMBER_SIZE;
            let name = read_u64(bytes, entry)
                .ok_or_else(|| StoreError::Corrupt("ticket member truncated".into()))?;
            let digest_bytes: [u8; 16] = bytes
                .get(entry + 8..entry + 24)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| StoreError::Corrupt("ticket member truncated".into()))?;
            let linkage = bytes
                .get(entry + 24)
                .copied()
                .and_then(Linkage::from_u8)
                .ok_or_else(|| StoreError::Corrupt("ticket member has bad linkage".into()))?;
            members.push(TicketMember {
                name: NameAddress(name),
                digest: Digest::from_bytes(digest_bytes),
                linkage,
            });
        }
        Ok(Ticket { members })
    }

    /// Look up a fragment by digest. The returned view borrows the map.
    pub fn fragment(&self, digest: &Digest) -> Result<Fragment<'_>, StoreError> {
        let &(offset, size) = self
            .fragments
            .get(digest)
            .ok_or(StoreError::FragmentNotFound(*digest))?;
        Ok(Fragment::new(&self.map[offset..offset + size])?)
    }

    /// Resolve a name address to its string.
    pub fn name(&self, addr: NameAddress) -> Result<&str, StoreError> {
        let bytes: &[u8] = &self.map;
        let offset = addr.0 as usize;
        let len = read_u32(bytes, offset)
            .ok_or_else(|| StoreError::Corrupt(format!("bad name address {}", addr.0)))?
            as usize;
        let start = offset + 4;
        let data = bytes
            .get(start..start + len)
            .ok_or_else(|| StoreError::Corrupt(format!("bad name address {}", addr.0)))?;
        std::str::from_utf8(data)
            .map_err(|_| StoreError::Corrupt(format!("bad name address {}", addr.0)))
    }

    /// Find the address of an interned name, if present.
    pub fn find_name(&self, name: &str) -> Option<NameAddress> {
        self.names.get(name).copied()
    }

    /// Number of interned names.
    pub fn num_names(&self) -> usize {
        self.names.len()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a store file: interned names, packed fragments, and tickets.
pub struct StoreBuilder {
    names: Vec<u8>,
    name_map: HashMap<String, NameAddress>,
    fragments: Vec<(Digest, Vec<u8>)>,
    tickets: Vec<(Uuid, Vec<TicketMember>)>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            name_map: HashMap::new(),
            fragments: Vec::new(),
            tickets: Vec::new(),
        }
    }

    /// Intern a name, returning its final address in the store file.
    pub fn intern(&mut self, name: &str) -> NameAddress {
        if let Some(&addr) = self.name_map.get(name) {
            return addr;
        }
        // The name region starts directly after the header, so entry
        // addresses are final as soon as they are assigned.
        let addr = NameAddress((HEADER_SIZE + self.names.len()) as u64);
        self.names
            .extend_from_slice(&(name.len() as u32).to_le_bytes());
        self.names.extend_from_slice(name.as_bytes());
        self.name_map.insert(name.to_string(), addr);
        addr
    }

    /// Pack and record a fragment under the given digest.
    pub fn add_fragment(
        &mut self,
        digest: Digest,
        contents: &[SectionContent],
    ) -> Result<(), FragmentError> {
        let packed = Fragment::build(contents)?;
        self.fragments.push((digest, packed));
        Ok(())
    }

    /// Record a ticket.
    pub fn add_ticket(&mut self, uuid: Uuid, members: Vec<TicketMember>) {
        self.tickets.push((uuid, members));
    }

    /// Write the store file.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        fn align8(out: &mut Vec<u8>) {
            while out.len() % 8 != 0 {
                out.push(0);
            }
        }

        let mut out = vec![0u8; HEADER_SIZE];
        out.extend_from_slice(&self.names);
        let names_size = self.names.len() as u64;

        let mut fragment_entries = Vec::with_capacity(self.fragments.len());
        for (digest, packed) in &self.fragments {
            align8(&mut out);
            fragment_entries.push((*digest, out.len() as u64, packed.len() as u64));
            out.extend_from_slice(packed);
        }

        let mut ticket_entries = Vec::with_capacity(self.tickets.len());
        for (uuid, members) in &self.tickets {
            align8(&mut out);
            ticket_entries.push((*uuid, out.len() as u64));
            out.extend_from_slice(&(members.len() as u64).to_le_bytes());
            for member in members {
                out.extend_from_slice(&member.name.0.to_le_bytes());
                out.extend_from_slice(member.digest.as_bytes());
                out.push(member.linkage as u8);
            }
        }

        align8(&mut out);
        let fragment_index = out.len() as u64;
        for (digest, offset, size) in &fragment_entries {
            out.extend_from_slice(digest.as_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }

        align8(&mut out);
        let ticket_index = out.len() as u64;
        for (uuid, offset) in &ticket_entries {
            out.extend_from_slice(uuid.as_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
        }

        out[0..8].copy_from_slice(STORE_MAGIC);
        out[8..12].copy_from_slice(&STORE_VERSION.to_le_bytes());
        out[16..24].copy_from_slice(&(HEADER_SIZE as u64).to_le_bytes());
        out[24..32].copy_from_slice(&names_size.to_le_bytes());
        out[32..40].copy_from_slice(&fragment_index.to_le_bytes());
        out[40..48].copy_from_slice(&(fragment_entries.len() as u64).to_le_bytes());
        out[48..56].copy_from_slice(&ticket_index.to_le_bytes());
        out[56..64].copy_from_slice(&(ticket_entries.len() as u64).to_le_bytes());

        std::fs::write(path, &out)
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
