//! Tests for the fragment layout and the store round trip.

use prepo_hash::Digest;

use crate::fragment::{
    ExternalFixup, Fragment, FragmentError, InternalFixup, SectionContent, SectionKind,
};
use crate::repo::{NameAddress, Repository, StoreBuilder, StoreError};
use crate::ticket::{
    Linkage, TicketMember, read_ticket_file, write_ticket_file, TicketFileError,
};
use crate::uuid::Uuid;

fn digest(fill: u8) -> Digest {
    Digest::from_bytes([fill; 16])
}

fn uuid(fill: u8) -> Uuid {
    Uuid::from_bytes([fill; 16])
}

fn text_section(data: &[u8]) -> SectionContent {
    let mut section = SectionContent::new(SectionKind::Text);
    section.alignment = 16;
    section.data = data.to_vec();
    section
}

// ---------------------------------------------------------------------------
// Fragment packing
// ---------------------------------------------------------------------------

#[test]
fn fragment_round_trip() {
    let mut text = text_section(&[0x55, 0x48, 0x89, 0xe5, 0xc3]);
    text.ifixups.push(InternalFixup {
        section: SectionKind::ReadOnly as u8,
        ty: 2,
        offset: 1,
        addend: 4,
    });
    text.xfixups.push(ExternalFixup {
        name: NameAddress(64),
        ty: 1,
        offset: 3,
        addend: 0,
    });

    let mut rodata = SectionContent::new(SectionKind::ReadOnly);
    rodata.alignment = 8;
    rodata.data = vec![1, 2, 3, 4, 5, 6, 7, 8];

    let packed = Fragment::build(&[text, rodata]).unwrap();
    let fragment = Fragment::new(&packed).unwrap();

    assert_eq!(fragment.num_sections(), 2);
    assert!(fragment.has_section(SectionKind::Text));
    assert!(fragment.has_section(SectionKind::ReadOnly));
    assert!(!fragment.has_section(SectionKind::Data));
    assert_eq!(
        fragment.kinds().collect::<Vec<_>>(),
        vec![SectionKind::Text, SectionKind::ReadOnly]
    );

    let text = fragment.section(SectionKind::Text).unwrap();
    assert_eq!(text.data(), &[0x55, 0x48, 0x89, 0xe5, 0xc3]);
    assert_eq!(text.alignment(), 16);
    let ifixups: Vec<_> = text.ifixups().collect();
    assert_eq!(ifixups.len(), 1);
    assert_eq!(ifixups[0].section, SectionKind::ReadOnly as u8);
    assert_eq!(ifixups[0].offset, 1);
    assert_eq!(ifixups[0].addend, 4);
    let xfixups: Vec<_> = text.xfixups().collect();
    assert_eq!(xfixups.len(), 1);
    assert_eq!(xfixups[0].name, NameAddress(64));
    assert_eq!(xfixups[0].offset, 3);

    let rodata = fragment.section(SectionKind::ReadOnly).unwrap();
    assert_eq!(rodata.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(rodata.ifixups().count(), 0);
    assert_eq!(rodata.xfixups().count(), 0);
}

#[test]
fn fragment_rejects_duplicate_kind() {
    let err = Fragment::build(&[text_section(&[1]), text_section(&[2])]).unwrap_err();
    assert!(matches!(
        err,
        FragmentError::DuplicateSection(SectionKind::Text)
    ));
}

#[test]
fn fragment_rejects_out_of_range_internal_fixup() {
    let mut text = text_section(&[0x90; 4]);
    text.ifixups.push(InternalFixup {
        section: SectionKind::Text as u8,
        ty: 1,
        offset: 4,
        addend: 0,
    });
    let err = Fragment::build(&[text]).unwrap_err();
    assert!(matches!(err, FragmentError::IfixupOutOfRange { .. }));
}

#[test]
fn fragment_rejects_non_power_of_two_alignment() {
    let mut text = text_section(&[0x90]);
    text.alignment = 3;
    let err = Fragment::build(&[text]).unwrap_err();
    assert!(matches!(err, FragmentError::BadAlignment(_, 3)));
}

#[test]
fn fragment_rejects_truncated_storage() {
    let packed = Fragment::build(&[text_section(&[0x90; 32])]).unwrap();
    assert!(matches!(
        Fragment::new(&packed[..packed.len() - 8]),
        Err(FragmentError::Truncated)
    ));
}

#[test]
fn fixup_wire_sizes() {
    assert_eq!(InternalFixup::SIZE, 12);
    assert_eq!(ExternalFixup::SIZE, 32);
}

// ---------------------------------------------------------------------------
// Store round trip
// ---------------------------------------------------------------------------

#[test]
fn store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("clang.db");

    let mut builder = StoreBuilder::new();
    let main_name = builder.intern("main");
    let helper_name = builder.intern("helper");
    assert_eq!(builder.intern("main"), main_name);

    builder
        .add_fragment(digest(0xaa), &[text_section(&[0x55, 0xc3])])
        .unwrap();
    builder.add_ticket(
        uuid(1),
        vec![
            TicketMember {
                name: main_name,
                digest: digest(0xaa),
                linkage: Linkage::External,
            },
            TicketMember {
                name: helper_name,
                digest: digest(0xaa),
                linkage: Linkage::Internal,
            },
        ],
    );
    builder.write(&store_path).unwrap();

    let repo = Repository::open(&store_path).unwrap();
    assert_eq!(repo.num_names(), 2);
    assert_eq!(repo.name(main_name).unwrap(), "main");
    assert_eq!(repo.name(helper_name).unwrap(), "helper");
    assert_eq!(repo.find_name("main"), Some(main_name));
    assert_eq!(repo.find_name("absent"), None);

    let ticket = repo.ticket(&uuid(1)).unwrap();
    assert_eq!(ticket.members.len(), 2);
    assert_eq!(ticket.members[0].name, main_name);
    assert_eq!(ticket.members[0].linkage, Linkage::External);
    assert_eq!(ticket.members[1].linkage, Linkage::Internal);

    let fragment = repo.fragment(&digest(0xaa)).unwrap();
    assert_eq!(
        fragment.section(SectionKind::Text).unwrap().data(),
        &[0x55, 0xc3]
    );
}

#[test]
fn store_reports_missing_resources() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("clang.db");
    StoreBuilder::new().write(&store_path).unwrap();

    let repo = Repository::open(&store_path).unwrap();
    let err = repo.ticket(&uuid(9)).unwrap_err();
    assert!(matches!(err, StoreError::TicketNotFound(_)));
    assert!(err.to_string().contains("was not found"));
    assert!(
        err.to_string()
            .contains("09090909-0909-0909-0909-090909090909")
    );

    let err = repo.fragment(&digest(7)).unwrap_err();
    assert!(matches!(err, StoreError::FragmentNotFound(_)));
    assert!(err.to_string().contains("07070707"));
}

#[test]
fn store_rejects_non_store_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-store");
    std::fs::write(&path, b"definitely not a repository").unwrap();
    assert!(matches!(
        Repository::open(&path),
        Err(StoreError::NotAStoreFile(_))
    ));
}

// ---------------------------------------------------------------------------
// Ticket sidecar files
// ---------------------------------------------------------------------------

#[test]
fn ticket_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.o");
    let id = uuid(0x42);
    write_ticket_file(&path, &id).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 24);
    assert_eq!(read_ticket_file(&path).unwrap(), id);
}

#[test]
fn ticket_file_rejects_wrong_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short");
    std::fs::write(&path, &[0u8; 23]).unwrap();
    let err = read_ticket_file(&path).unwrap_err();
    assert!(matches!(err, TicketFileError::NotATicketFile(_)));
    assert!(err.to_string().contains("was not a Repo ticket file"));
}

#[test]
fn ticket_file_rejects_wrong_signature() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("badsig");
    let mut contents = b"RepoUuix".to_vec();
    contents.extend_from_slice(&[0u8; 16]);
    std::fs::write(&path, contents).unwrap();
    assert!(matches!(
        read_ticket_file(&path).unwrap_err(),
        TicketFileError::NotATicketFile(_)
    ));
}

#[test]
fn uuid_renders_dashed_hex() {
    let id = Uuid::from_bytes([
        0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
        0xcd, 0xef,
    ]);
    assert_eq!(id.to_string(), "01234567-89ab-cdef-0123-456789abcdef");
}
