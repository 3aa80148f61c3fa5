//! repo2obj: materialize a relocatable ELF object from a repository ticket.
//!
//! Given a ticket (a manifest of digests) and the content-addressed store of
//! fragments, this crate stitches fragment payloads into ELF output sections,
//! deduplicates linkonce definitions through COMDAT groups, and emits a
//! self-consistent section-header/symbol/string-table layout.

pub mod elf;
pub mod emit;
pub mod error;
pub mod output;
pub mod strtab;
pub mod symtab;

pub use emit::materialize;
pub use error::LinkError;
pub use output::SpecialNames;
