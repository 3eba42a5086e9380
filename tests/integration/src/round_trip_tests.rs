//! Generate → validate round trips over real directory trees.

use pretty_assertions::assert_eq;
use snap_codec::ValueCodec;
use snap_hash::HashAlgorithm;
use snap_manifest::sign::Signer as _;
use snap_manifest::{FilterSet, GenerateOptions, Signing, generate, read_signature_doc};
use snap_test_utils::{MemArchive, StubKey, TestTree};
use snap_verify::{FixLevel, SignatureCheck, ValidateOptions, validate};

const ALGORITHMS: &[HashAlgorithm] = &[HashAlgorithm::Md5, HashAlgorithm::Sha256];

fn generate_options<'a>(codecs: &'a [&'a dyn ValueCodec]) -> GenerateOptions<'a> {
    GenerateOptions {
        algorithms: ALGORITHMS,
        codecs,
        detect_text: true,
        filters: FilterSet::new(),
        block_size: 4096,
    }
}

fn validate_options(level: FixLevel) -> ValidateOptions<'static> {
    ValidateOptions {
        level,
        algorithms: ALGORITHMS,
        restore_eol: "\n",
        ..Default::default()
    }
}

/// Build a tree touching every entry kind and flag the manifest records.
#[cfg(unix)]
fn populated_tree() -> TestTree {
    let tree = TestTree::new();
    tree.file("notes.txt", b"alpha\nbeta\ngamma\n");
    tree.file("blob.bin", &[0u8, 159, 146, 150, 0, 255]);
    tree.dir("sub/deep");
    tree.file("sub/deep/nested.txt", b"one\ntwo\n");
    tree.file("tool.sh", b"#!/bin/sh\nexit 0\n");
    tree.chmod("tool.sh", 0o755);
    tree.file("locked.txt", b"keep me\n");
    tree.chmod("locked.txt", 0o444);
    tree.symlink("shortcut", "notes.txt");
    // Pin mtimes so the manifest records something other than "now".
    for rel in ["notes.txt", "blob.bin", "sub/deep/nested.txt", "tool.sh", "locked.txt"] {
        tree.set_mtime(rel, 1_650_000_000);
    }
    tree.set_mtime("sub/deep", 1_650_000_100);
    tree.set_mtime("sub", 1_650_000_200);
    tree
}

#[cfg(unix)]
#[test]
fn reconstructs_identical_tree_into_empty_directory() {
    let source = populated_tree();
    let mut archive = MemArchive::new();
    let mut manifest = Vec::new();
    generate(
        source.root(),
        &mut manifest,
        &generate_options(&[]),
        Some(&mut archive),
        None,
    )
    .unwrap();

    let restored = TestTree::new();
    let problems = validate(
        manifest.as_slice(),
        restored.root(),
        &validate_options(FixLevel::RepairVerify),
        Some(&mut archive),
        None,
    )
    .unwrap();

    // Everything was missing, so every entry shows up once.
    assert!(!problems.is_empty());
    assert!(problems.iter().all(|p| p.description.contains("does not exist")));

    // Contents, byte for byte.
    assert_eq!(restored.read("notes.txt"), source.read("notes.txt"));
    assert_eq!(restored.read("blob.bin"), source.read("blob.bin"));
    assert_eq!(
        restored.read("sub/deep/nested.txt"),
        source.read("sub/deep/nested.txt")
    );

    // Flags and timestamps, to the second.
    let tool = restored.inspect("tool.sh");
    assert!(tool.executable);
    let locked = restored.inspect("locked.txt");
    assert!(locked.readonly);
    assert_eq!(restored.inspect("notes.txt").modified, 1_650_000_000);
    assert_eq!(restored.inspect("sub/deep").modified, 1_650_000_100);
    assert_eq!(restored.inspect("sub").modified, 1_650_000_200);

    // Symlink target survives verbatim.
    assert_eq!(restored.link_target("shortcut"), "notes.txt");

    // Second pass over the repaired tree finds nothing.
    let mut archive_again = archive.clone();
    let problems = validate(
        manifest.as_slice(),
        restored.root(),
        &validate_options(FixLevel::RepairVerify),
        Some(&mut archive_again),
        None,
    )
    .unwrap();
    assert_eq!(problems, vec![]);
}

#[cfg(unix)]
#[test]
fn store_only_archive_falls_back_to_wholesale_store() {
    let source = TestTree::new();
    source.file("a.txt", b"hello\nworld\n");
    source.set_mtime("a.txt", 1_650_000_000);

    let mut archive = MemArchive::store_only();
    let mut manifest = Vec::new();
    generate(
        source.root(),
        &mut manifest,
        &generate_options(&[]),
        Some(&mut archive),
        None,
    )
    .unwrap();

    // The payload landed despite the refused stream, and the manifest
    // still carries hashes.
    assert_eq!(archive.payload("a.txt").unwrap(), b"hello\nworld\n");
    let text = String::from_utf8(manifest.clone()).unwrap();
    assert!(text.contains("<hash algorithm='md5'"));

    let restored = TestTree::new();
    validate(
        manifest.as_slice(),
        restored.root(),
        &validate_options(FixLevel::RepairVerify),
        Some(&mut archive),
        None,
    )
    .unwrap();
    assert_eq!(restored.read("a.txt"), b"hello\nworld\n");
}

#[test]
fn signed_manifest_validates_and_detects_tampering() {
    let source = TestTree::new();
    source.file("a.txt", b"hello\nworld\n");
    source.set_mtime("a.txt", 1_650_000_000);

    let key = StubKey::private(0x77);
    let mut manifest = Vec::new();
    let mut signature_doc = Vec::new();
    generate(
        source.root(),
        &mut manifest,
        &generate_options(&[]),
        None,
        Some(Signing {
            key: &key,
            out: &mut signature_doc,
        }),
    )
    .unwrap();

    let (public, signatures) = read_signature_doc(signature_doc.as_slice(), 4096).unwrap();
    assert_eq!(public, key.public());
    // One binary and one text signature per algorithm.
    assert_eq!(signatures.len(), ALGORITHMS.len() * 2);

    // Untampered manifest against the untouched tree: clean pass.
    let problems = validate(
        manifest.as_slice(),
        source.root(),
        &validate_options(FixLevel::ReportOnly),
        None,
        Some(SignatureCheck {
            key: &key,
            signatures: &signatures,
        }),
    )
    .unwrap();
    assert_eq!(problems, vec![]);

    // Any byte change breaks the signature.
    let tampered = String::from_utf8(manifest).unwrap().replace("a.txt", "a.tyt");
    let result = validate(
        tampered.as_bytes(),
        source.root(),
        &validate_options(FixLevel::ReportOnly),
        None,
        Some(SignatureCheck {
            key: &key,
            signatures: &signatures,
        }),
    );
    assert!(matches!(
        result,
        Err(snap_verify::Error::SignatureMismatch { .. })
    ));
}

#[cfg(unix)]
#[test]
fn repair_levels_are_idempotent() {
    let source = populated_tree();
    let mut archive = MemArchive::new();
    let mut manifest = Vec::new();
    generate(
        source.root(),
        &mut manifest,
        &generate_options(&[]),
        Some(&mut archive),
        None,
    )
    .unwrap();

    for level in [FixLevel::Repair, FixLevel::RepairVerify] {
        // Drift: delete one file, unlock another.
        source.chmod("locked.txt", 0o644);
        std::fs::remove_file(source.path("blob.bin")).unwrap();

        let mut first_archive = archive.clone();
        let first = validate(
            manifest.as_slice(),
            source.root(),
            &validate_options(level),
            Some(&mut first_archive),
            None,
        )
        .unwrap();
        assert!(!first.is_empty());

        let mut second_archive = archive.clone();
        let second = validate(
            manifest.as_slice(),
            source.root(),
            &validate_options(level),
            Some(&mut second_archive),
            None,
        )
        .unwrap();
        assert_eq!(second, vec![]);
    }
}
