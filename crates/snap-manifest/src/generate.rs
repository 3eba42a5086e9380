//! Snapshot a directory tree into a manifest document.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use snap_codec::ValueCodec;
use snap_hash::{HashAlgorithm, HasherSlot, StreamHasher, transfer_and_hash};
use walkdir::WalkDir;

use crate::archive::Archive;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::meta::{DiskKind, inspect};
use crate::path::relative_to;
use crate::sign::{Signer, write_signature_doc};
use crate::writer::ManifestWriter;

/// Settings for one generation pass.
pub struct GenerateOptions<'a> {
    /// Algorithms to hash file contents with.
    pub algorithms: &'a [HashAlgorithm],
    /// Codecs available for embedding extended attribute values.
    pub codecs: &'a [&'a dyn ValueCodec],
    /// Classify file contents and record text hashes and line counts.
    pub detect_text: bool,
    /// Paths to leave out of the manifest entirely.
    pub filters: FilterSet,
    /// Transfer block size in bytes.
    pub block_size: usize,
}

impl Default for GenerateOptions<'_> {
    fn default() -> Self {
        Self {
            algorithms: &[],
            codecs: &[],
            detect_text: true,
            filters: FilterSet::new(),
            block_size: 4096,
        }
    }
}

/// A private key plus the stream the signature document goes to.
pub struct Signing<'a> {
    pub key: &'a dyn Signer,
    pub out: &'a mut dyn Write,
}

/// Walk `root` and serialize its manifest to `out`.
///
/// Files are hashed block-wise; with an archive attached, payloads are
/// streamed into it during the same read (or stored wholesale when the
/// archive cannot stream). With `signing`, the manifest's own bytes are
/// hashed as they are written and a signature document is produced after
/// the walk; the key must be private.
pub fn generate<W: Write>(
    root: &Path,
    out: W,
    options: &GenerateOptions<'_>,
    mut archive: Option<&mut dyn Archive>,
    signing: Option<Signing<'_>>,
) -> Result<()> {
    if let Some(signing) = &signing {
        if !signing.key.is_private() {
            return Err(Error::KeyNotPrivate);
        }
    }

    let slots = if signing.is_some() && !options.algorithms.is_empty() {
        HasherSlot::paired(options.algorithms)
    } else {
        Vec::new()
    };
    let mut hashed_out = StreamHasher::new(out, slots);

    let mut writer = ManifestWriter::new(&mut hashed_out, options.codecs);
    writer.begin()?;
    writer.filters(&options.filters)?;

    let walk = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|item| {
            relative_to(root, item.path())
                .is_none_or(|rel| rel.is_empty() || !options.filters.skip(&rel))
        });

    for item in walk {
        let item = match item {
            Ok(item) => item,
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable item during walk");
                continue;
            }
        };
        let full_path = item.path();
        let Some(rel_path) = relative_to(root, full_path) else {
            continue;
        };
        let meta = match inspect(full_path) {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(path = %full_path.display(), %error, "cannot stat, skipping");
                continue;
            }
        };

        let mut entry = match meta.kind {
            DiskKind::Directory => Entry::new(EntryKind::Directory, rel_path),
            DiskKind::File => Entry::file(rel_path, meta.size),
            DiskKind::Link => {
                let target = fs::read_link(full_path)
                    .map_err(|e| Error::io(full_path, e))?
                    .to_string_lossy()
                    .into_owned();
                Entry::link(rel_path, target)
            }
            DiskKind::Other => continue,
        };
        entry.modified = Some(meta.modified);
        entry.readonly = meta.readonly;
        entry.executable = meta.executable;

        if entry.kind == EntryKind::File
            && (archive.is_some() || !options.algorithms.is_empty() || options.detect_text)
        {
            let outcome = hash_and_archive(full_path, &entry.path, options, archive.as_deref_mut())?;
            if options.detect_text && outcome.lines >= 0 {
                entry.lines = Some(outcome.lines);
            }
            entry.hashes = outcome.hashes;
        }

        entry.xattrs = read_xattrs(full_path);
        writer.entry(&entry)?;
    }

    writer.end()?;
    drop(writer);

    if hashed_out.is_hashing() {
        if let Some(signing) = signing {
            let manifest_hashes = hashed_out.into_hashes();
            write_signature_doc(signing.out, signing.key, &manifest_hashes)?;
        }
    }

    Ok(())
}

/// Hash one file, streaming its payload into the archive when possible.
fn hash_and_archive(
    full_path: &Path,
    rel_path: &str,
    options: &GenerateOptions<'_>,
    archive: Option<&mut (dyn Archive + '_)>,
) -> Result<snap_hash::TransferOutcome> {
    let mut source = fs::File::open(full_path).map_err(|e| Error::io(full_path, e))?;

    if let Some(archive) = archive {
        match archive.open_write(rel_path) {
            Ok(mut payload) => {
                let outcome = transfer_and_hash(
                    &mut source,
                    options.algorithms,
                    Some(&mut payload),
                    options.detect_text,
                    None, // archived payloads keep their line endings
                    options.block_size,
                )
                .map_err(|e| Error::io(full_path, e))?;
                payload.flush().map_err(|e| Error::io(full_path, e))?;
                return Ok(outcome);
            }
            Err(Error::StreamingUnsupported { .. }) => {
                tracing::debug!(path = rel_path, "archive cannot stream, storing wholesale");
                archive.store(full_path, rel_path)?;
            }
            Err(error) => return Err(error),
        }
    }

    transfer_and_hash(
        &mut source,
        options.algorithms,
        None,
        options.detect_text,
        None,
        options.block_size,
    )
    .map_err(|e| Error::io(full_path, e))
}

#[cfg(unix)]
fn read_xattrs(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut attrs = BTreeMap::new();
    let names = match xattr::list(path) {
        Ok(names) => names,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "cannot list extended attributes");
            return attrs;
        }
    };
    for name in names {
        match xattr::get(path, &name) {
            Ok(Some(value)) => {
                attrs.insert(name.to_string_lossy().into_owned(), value);
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "cannot read extended attribute");
            }
        }
    }
    attrs
}

#[cfg(not(unix))]
fn read_xattrs(_path: &Path) -> BTreeMap<String, Vec<u8>> {
    BTreeMap::new()
}
