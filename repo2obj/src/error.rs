//! Errors surfaced at the tool boundary.

use std::fmt;
use std::io;
use std::path::PathBuf;

use prepo_store::fragment::SectionKind;
use prepo_store::ticket::TicketFileError;
use prepo_store::StoreError;

/// Everything that can go fatally wrong while materializing an object.
/// There is no local recovery: each of these terminates the run with a
/// one-line diagnostic, and the partially written output is discarded.
#[derive(Debug)]
pub enum LinkError {
    Store(StoreError),
    TicketFile(TicketFileError),
    /// A common-linkage member's fragment must hold exactly one BSS section.
    CommonNotSoleBss(String),
    /// The fragment carries a section kind with no ELF output mapping.
    UnmappedSection(SectionKind),
    /// An internal fixup targets a section kind absent from its fragment.
    IfixupTargetMissing { section: u8 },
    /// A relocation or group refers to a symbol that was never recorded.
    UnresolvedSymbol(String),
    Output(PathBuf, io::Error),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Store(err) => err.fmt(f),
            LinkError::TicketFile(err) => err.fmt(f),
            LinkError::CommonNotSoleBss(name) => write!(
                f,
                "Fragment for common symbol \"{name}\" did not contain a sole BSS section"
            ),
            LinkError::UnmappedSection(kind) => {
                write!(f, "no ELF output section mapping for {kind} sections")
            }
            LinkError::IfixupTargetMissing { section } => write!(
                f,
                "internal fixup targets section kind {section} which is absent from its fragment"
            ),
            LinkError::UnresolvedSymbol(name) => {
                write!(f, "symbol \"{name}\" was never recorded")
            }
            LinkError::Output(path, err) => {
                write!(f, "error writing '{}': {err}", path.display())
            }
        }
    }
}

impl std::error::Error for LinkError {}

impl From<StoreError> for LinkError {
    fn from(err: StoreError) -> Self {
        LinkError::Store(err)
    }
}

impl From<TicketFileError> for LinkError {
    fn from(err: TicketFileError) -> Self {
        LinkError::TicketFile(err)
    }
}
