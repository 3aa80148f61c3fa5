//! Tickets: the manifest of one compiled translation unit.
//!
//! A ticket lives in the store; a small sidecar file next to the compiler's
//! output carries the ticket's UUID so that tools can find it again.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use prepo_hash::Digest;

use crate::repo::NameAddress;
use crate::uuid::Uuid;

/// Linkage of a ticket member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Linkage {
    External = 0,
    Internal = 1,
    Linkonce = 2,
    Common = 3,
    Private = 4,
    Appending = 5,
    AvailableExternally = 6,
    WeakAny = 7,
    WeakOdr = 8,
    LinkOnceAny = 9,
    LinkOnceOdr = 10,
}

impl Linkage {
    pub fn from_u8(v: u8) -> Option<Linkage> {
        match v {
            0 => Some(Linkage::External),
            1 => Some(Linkage::Internal),
            2 => Some(Linkage::Linkonce),
            3 => Some(Linkage::Common),
            4 => Some(Linkage::Private),
            5 => Some(Linkage::Appending),
            6 => Some(Linkage::AvailableExternally),
            7 => Some(Linkage::WeakAny),
            8 => Some(Linkage::WeakOdr),
            9 => Some(Linkage::LinkOnceAny),
            10 => Some(Linkage::LinkOnceOdr),
            _ => None,
        }
    }

    /// Members of the linkonce family get a COMDAT group of their own.
    pub fn is_link_once(self) -> bool {
        matches!(
            self,
            Linkage::Linkonce | Linkage::LinkOnceAny | Linkage::LinkOnceOdr
        )
    }
}

/// One `(name, digest, linkage)` entry of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketMember {
    pub name: NameAddress,
    pub digest: Digest,
    pub linkage: Linkage,
}

/// A ticket: the members of one translation unit, in definition order.
#[derive(Debug, Clone, Default)]
pub struct Ticket {
    pub members: Vec<TicketMember>,
}

// ---------------------------------------------------------------------------
// Ticket sidecar files
// ---------------------------------------------------------------------------

/// Signature bytes of a ticket sidecar file.
pub const TICKET_FILE_MAGIC: &[u8; 8] = b"RepoUuid";

/// Total size of a ticket sidecar file: signature plus UUID.
pub const TICKET_FILE_SIZE: usize = TICKET_FILE_MAGIC.len() + Uuid::SIZE;

/// Errors reading a ticket sidecar file.
#[derive(Debug)]
pub enum TicketFileError {
    Io(PathBuf, io::Error),
    /// Wrong size or wrong signature.
    NotATicketFile(PathBuf),
}

impl fmt::Display for TicketFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketFileError::Io(path, err) => {
                write!(f, "'{}' ({err})", path.display())
            }
            TicketFileError::NotATicketFile(path) => {
                write!(f, "file \"{}\" was not a Repo ticket file", path.display())
            }
        }
    }
}

impl std::error::Error for TicketFileError {}

/// Read the UUID out of a ticket sidecar file.
pub fn read_ticket_file(path: &Path) -> Result<Uuid, TicketFileError> {
    let contents =
        fs::read(path).map_err(|err| TicketFileError::Io(path.to_path_buf(), err))?;
    if contents.len() != TICKET_FILE_SIZE || &contents[..8] != TICKET_FILE_MAGIC {
        return Err(TicketFileError::NotATicketFile(path.to_path_buf()));
    }
    let mut bytes = [0u8; Uuid::SIZE];
    bytes.copy_from_slice(&contents[8..]);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a ticket sidecar file.
pub fn write_ticket_file(path: &Path, uuid: &Uuid) -> io::Result<()> {
    let mut contents = Vec::with_capacity(TICKET_FILE_SIZE);
    contents.extend_from_slice(TICKET_FILE_MAGIC);
    contents.extend_from_slice(uuid.as_bytes());
    fs::write(path, contents)
}
