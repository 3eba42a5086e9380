//! The repair engine: reconciles manifest entries against a live tree.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use snap_hash::{HashAlgorithm, hash_lists_match, transfer_and_hash};
use snap_manifest::entry::{Entry, EntryKind};
use snap_manifest::filter::FilterSet;
use snap_manifest::meta::{DiskKind, ItemMeta, inspect};
use snap_manifest::path::{native_path, relative_to};
use snap_manifest::reader::EntrySink;
use snap_manifest::timefmt::format_timestamp;
use snap_manifest::{Archive, Error as ManifestError};
use walkdir::WalkDir;

use crate::fsops::{ensure_parent_dir, make_symlink, read_link_string, remove_tree, set_modified};
use crate::level::FixLevel;
use crate::problem::{Problem, ProblemLog};

#[cfg(unix)]
use crate::fsops::{EXEC_BITS, WRITE_BITS, apply_mode};

/// Reconciles each dispatched entry against the directory at `base`.
///
/// Used as the [`EntrySink`] of a manifest parse: `entry` runs the
/// per-record checks and repairs, `finish` the globally-ordered cleanup.
/// Between the two, the only state carried is the problem list, the set of
/// paths confirmed to belong, and three deferred-work queues: symlinks
/// whose creation failed (their target may simply not exist yet),
/// directory mtimes (perturbed by every child write, so applied after all
/// structural changes), and read-only directories (made writable during
/// the pass so their children stay fixable, restored last).
pub struct Verifier<'a> {
    base: PathBuf,
    level: FixLevel,
    archive: Option<&'a mut dyn Archive>,
    algorithms: Vec<HashAlgorithm>,
    restore_eol: String,
    block_size: usize,
    expected: HashSet<String>,
    pending_links: Vec<Entry>,
    pending_dir_mtimes: Vec<(PathBuf, i64)>,
    pending_readonly_dirs: Vec<(PathBuf, u32)>,
    problems: ProblemLog,
}

type MResult<T> = snap_manifest::Result<T>;

impl<'a> Verifier<'a> {
    pub fn new(
        base: impl Into<PathBuf>,
        level: FixLevel,
        archive: Option<&'a mut dyn Archive>,
        algorithms: &[HashAlgorithm],
        restore_eol: impl Into<String>,
        block_size: usize,
    ) -> Self {
        Self {
            base: base.into(),
            level,
            archive,
            algorithms: algorithms.to_vec(),
            restore_eol: restore_eol.into(),
            block_size,
            expected: HashSet::new(),
            pending_links: Vec::new(),
            pending_dir_mtimes: Vec::new(),
            pending_readonly_dirs: Vec::new(),
            problems: ProblemLog::new(),
        }
    }

    /// Every problem recorded so far, in discovery order.
    pub fn problems(&self) -> &[Problem] {
        self.problems.items()
    }

    pub fn into_problems(self) -> Vec<Problem> {
        self.problems.into_vec()
    }

    /// Paths the manifest says should exist on disk.
    pub fn expected_paths(&self) -> &HashSet<String> {
        &self.expected
    }

    /// Record a discrepancy. Under [`FixLevel::FailFast`] the first newly
    /// recorded discrepancy aborts the pass.
    fn record(&mut self, path: &str, description: String) -> MResult<()> {
        let recorded = self.problems.record(path, description.as_str());
        if recorded && self.level.fails_fast() {
            return Err(ManifestError::Halted {
                path: path.to_string(),
                message: description,
            });
        }
        Ok(())
    }

    /// Create a missing item of the entry's kind, to the extent the level
    /// and collaborators allow. Failures are not problems here; the
    /// caller re-stats and reports what is still missing. A failed symlink
    /// is queued for one retry in `finish`, when its target must exist.
    fn create(&mut self, full: &Path, entry: &Entry) -> MResult<()> {
        match entry.kind {
            EntryKind::Link => {
                if self.level.repairs() {
                    let Some(target) = entry.target.clone() else {
                        tracing::warn!(path = %entry.path, "link entry without target");
                        return Ok(());
                    };
                    let attempt =
                        ensure_parent_dir(full).and_then(|()| make_symlink(&target, full));
                    if let Err(error) = attempt {
                        tracing::debug!(
                            path = %full.display(),
                            %error,
                            "deferring symlink until finish"
                        );
                        self.pending_links.push(entry.clone());
                    }
                }
            }
            EntryKind::Directory => {
                if self.level.repairs() {
                    if let Err(error) = fs::create_dir_all(full) {
                        tracing::warn!(path = %full.display(), %error, "cannot create directory");
                    }
                }
            }
            EntryKind::File => {
                if self.level.repairs() && self.archive.is_some() {
                    if let Err(error) = self.restore_file(full, entry) {
                        tracing::warn!(
                            path = %full.display(),
                            %error,
                            "cannot restore file from archive"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Stream a file's payload out of the archive, converting line endings
    /// only for entries recorded as text.
    fn restore_file(&mut self, full: &Path, entry: &Entry) -> MResult<()> {
        let Some(archive) = self.archive.as_deref_mut() else {
            return Ok(());
        };
        let mut payload = archive.open_read(&entry.path)?;
        ensure_parent_dir(full).map_err(|e| ManifestError::io(full, e))?;
        let mut local = fs::File::create(full).map_err(|e| ManifestError::io(full, e))?;
        let eol = entry.is_text().then_some(self.restore_eol.as_str());
        transfer_and_hash(
            &mut payload,
            &self.algorithms,
            Some(&mut local),
            false,
            eol,
            self.block_size,
        )
        .map_err(|e| ManifestError::io(full, e))?;
        Ok(())
    }

    /// Delete whatever is at `full` and recreate it from the entry.
    /// Returns the fresh metadata, or `None` when recreation failed.
    fn recreate(&mut self, full: &Path, entry: &Entry) -> MResult<Option<ItemMeta>> {
        if let Err(error) = remove_tree(full) {
            tracing::warn!(path = %full.display(), %error, "cannot remove for recreation");
            return Ok(None);
        }
        self.create(full, entry)?;
        Ok(inspect(full).ok())
    }

    /// Re-hash a file with the algorithms common to the entry and our
    /// configured set. `None` means the file could not be read (already
    /// recorded); `Some(true)` includes the no-comparable-hash case.
    fn file_hashes_match(&mut self, full: &Path, entry: &Entry) -> MResult<Option<bool>> {
        let common: Vec<HashAlgorithm> = self
            .algorithms
            .iter()
            .copied()
            .filter(|a| entry.hashes.iter().any(|h| h.algorithm == a.name()))
            .collect();
        let mut file = match fs::File::open(full) {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(path = %full.display(), %error, "cannot open for verification");
                self.record(&entry.path, format!("Unable to read {}", full.display()))?;
                return Ok(None);
            }
        };
        let outcome = match transfer_and_hash(
            &mut file,
            &common,
            None,
            entry.is_text(),
            None,
            self.block_size,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(path = %full.display(), %error, "read failed during verification");
                self.record(&entry.path, format!("Unable to read {}", full.display()))?;
                return Ok(None);
            }
        };
        let is_text = outcome.is_text() && entry.is_text();
        Ok(Some(hash_lists_match(
            &outcome.hashes,
            &entry.hashes,
            is_text,
            true,
        )))
    }

    fn check_entry(&mut self, entry: &Entry) -> MResult<()> {
        self.expected.insert(entry.path.clone());
        let full = self.base.join(native_path(&entry.path));
        let mut was_created = false;

        // Missing entirely?
        let mut meta = match inspect(&full) {
            Ok(meta) => meta,
            Err(_) => {
                self.record(
                    &entry.path,
                    format!("{} does not exist: {}", entry.kind, full.display()),
                )?;
                self.create(&full, entry)?;
                match inspect(&full) {
                    Ok(meta) => {
                        was_created = true;
                        meta
                    }
                    Err(_) => {
                        let attempted = self.level.repairs()
                            && (self.archive.is_some() || entry.kind != EntryKind::File);
                        if attempted && entry.kind != EntryKind::Link {
                            self.record(
                                &entry.path,
                                format!("Unable to create {} {}", entry.kind, full.display()),
                            )?;
                        }
                        return Ok(());
                    }
                }
            }
        };

        // Wrong kind on disk?
        let kind_mismatch = match meta.kind {
            DiskKind::Directory => entry.kind != EntryKind::Directory,
            DiskKind::File => entry.kind != EntryKind::File,
            DiskKind::Link | DiskKind::Other => entry.kind != EntryKind::Link,
        };
        if kind_mismatch {
            self.record(
                &entry.path,
                format!("{} was expected to be a {} but it isn't", full.display(), entry.kind),
            )?;
            if self.level.repairs() && (self.archive.is_some() || entry.kind != EntryKind::File) {
                match self.recreate(&full, entry)? {
                    Some(fresh) => {
                        meta = fresh;
                        was_created = true;
                    }
                    None => {
                        if entry.kind != EntryKind::Link {
                            self.record(
                                &entry.path,
                                format!("Unable to create {} {}", entry.kind, full.display()),
                            )?;
                        }
                        return Ok(());
                    }
                }
            }
        }

        let is_dir = meta.kind == DiskKind::Directory;
        let is_file = meta.kind == DiskKind::File;

        let mtime_matches = entry
            .modified
            .is_none_or(|expected| meta.modified == expected);

        let mut size_matches = true;
        let mut expected_size = 0i64;
        let mut delta = 0i64;
        if let Some(size) = entry.size {
            expected_size = size as i64;
            // Text files restored with a different EOL width legitimately
            // differ by exactly one byte per line.
            delta = entry.lines.unwrap_or(0);
            let actual = meta.size as i64;
            size_matches = expected_size == actual || (expected_size - actual).abs() == delta;
        }

        if is_file && !was_created {
            if !size_matches {
                self.record(
                    &entry.path,
                    format!(
                        "File size varies on {} expected {}, {} or {} but found {}",
                        full.display(),
                        expected_size,
                        expected_size + delta,
                        expected_size - delta,
                        meta.size
                    ),
                )?;
                if self.level.repairs() && self.archive.is_some() {
                    match self.recreate(&full, entry)? {
                        Some(fresh) => {
                            meta = fresh;
                            was_created = true;
                        }
                        None => {
                            self.record(
                                &entry.path,
                                format!("Unable to create file {}", full.display()),
                            )?;
                            return Ok(());
                        }
                    }
                }
            } else if (!mtime_matches || self.level.verifies_content())
                && !entry.hashes.is_empty()
                && !self.algorithms.is_empty()
                && self.file_hashes_match(&full, entry)? == Some(false)
            {
                self.record(&entry.path, format!("Contents changed {}", full.display()))?;
                if self.level.repairs() && self.archive.is_some() {
                    match self.recreate(&full, entry)? {
                        Some(fresh) => {
                            meta = fresh;
                            was_created = true;
                        }
                        None => {
                            self.record(
                                &entry.path,
                                format!("Unable to create file {}", full.display()),
                            )?;
                            return Ok(());
                        }
                    }
                }
            }
        }

        // A file we just wrote gets one immediate re-check under full
        // verification; if it still fails the archive copy is bad and
        // there is nothing more to try.
        if is_file
            && was_created
            && self.level.verifies_content()
            && self.file_hashes_match(&full, entry)? == Some(false)
        {
            self.record(
                &entry.path,
                format!("File corrupted from archive: {}", full.display()),
            )?;
        }

        // Permission bits are only meaningful for files and directories;
        // a chmod through a symlink path would land on its target.
        if is_dir || is_file {
            self.reconcile_permissions(&full, entry, &meta, is_dir, was_created)?;
        }

        // Symlink pointing at the wrong place? (A non-link on disk was
        // already reported as a kind mismatch above.)
        if entry.kind == EntryKind::Link && meta.kind == DiskKind::Link {
            match read_link_string(&full) {
                Ok(actual_target) => {
                    let expected_target = entry.target.clone().unwrap_or_default();
                    if expected_target != actual_target {
                        self.record(
                            &entry.path,
                            format!(
                                "Link contents for {} expected to be {} but is {}",
                                full.display(),
                                expected_target,
                                actual_target
                            ),
                        )?;
                        if self.level.repairs() {
                            if let Err(error) = remove_tree(&full) {
                                tracing::warn!(path = %full.display(), %error, "cannot remove link");
                            } else {
                                self.create(&full, entry)?;
                            }
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(path = %full.display(), %error, "cannot read link target");
                    self.record(&entry.path, format!("Unable to read link {}", full.display()))?;
                }
            }
        }

        self.reconcile_xattrs(&full, entry)?;

        // Link mtimes are not settable through the path, so links are out.
        if let Some(expected_mtime) = entry.modified {
            if !mtime_matches && (is_dir || is_file) {
                if !was_created {
                    self.record(
                        &entry.path,
                        format!(
                            "Modification date for {} should have been {} but was {}",
                            full.display(),
                            format_timestamp(expected_mtime),
                            format_timestamp(meta.modified)
                        ),
                    )?;
                }
                if self.level.repairs() {
                    if is_dir {
                        // Child repairs would clobber it; apply in finish.
                        self.pending_dir_mtimes.push((full.clone(), expected_mtime));
                    } else if let Err(error) = set_modified(&full, expected_mtime) {
                        tracing::warn!(path = %full.display(), %error, "cannot set mtime");
                        self.record(
                            &entry.path,
                            format!("Unable to fix modification date of {}", full.display()),
                        )?;
                    }
                }
            }
        }

        Ok(())
    }

    #[cfg(unix)]
    fn reconcile_permissions(
        &mut self,
        full: &Path,
        entry: &Entry,
        meta: &ItemMeta,
        is_dir: bool,
        was_created: bool,
    ) -> MResult<()> {
        let expected_exec = entry.executable;
        let expected_ro = entry.readonly;
        let mut mode = meta.mode;

        if (expected_exec != meta.executable && !is_dir) || expected_ro != meta.readonly {
            if !is_dir && expected_exec != meta.executable && !was_created {
                self.record(
                    &entry.path,
                    format!("Executability was not correct: {}", full.display()),
                )?;
            }
            if expected_ro != meta.readonly && !was_created {
                self.record(
                    &entry.path,
                    format!("Write flag was not correct: {}", full.display()),
                )?;
            }
            if expected_exec && !meta.executable {
                mode |= EXEC_BITS;
            } else if !is_dir && !expected_exec && meta.executable {
                mode &= !EXEC_BITS;
            }
            if expected_ro && !meta.readonly {
                mode &= !WRITE_BITS;
            } else if !expected_ro && meta.readonly {
                mode |= WRITE_BITS;
            }
            if !is_dir && self.level.repairs() {
                if let Err(error) = apply_mode(full, mode) {
                    tracing::warn!(path = %full.display(), %error, "cannot change permissions");
                    self.record(
                        &entry.path,
                        format!("Unable to fix permissions on {}", full.display()),
                    )?;
                }
            }
        }

        // A directory that should end up read-only must stay writable for
        // the rest of the pass; re-applied last in finish.
        if is_dir && expected_ro && self.level.repairs() {
            if meta.readonly {
                if let Err(error) = apply_mode(full, mode | WRITE_BITS) {
                    tracing::warn!(path = %full.display(), %error, "cannot unlock directory");
                }
            }
            self.pending_readonly_dirs.push((full.to_path_buf(), mode));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn reconcile_permissions(
        &mut self,
        full: &Path,
        entry: &Entry,
        meta: &ItemMeta,
        _is_dir: bool,
        was_created: bool,
    ) -> MResult<()> {
        if entry.readonly != meta.readonly && !was_created {
            self.record(
                &entry.path,
                format!("Write flag was not correct: {}", full.display()),
            )?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn reconcile_xattrs(&mut self, full: &Path, entry: &Entry) -> MResult<()> {
        if entry.xattrs.is_empty() {
            return Ok(());
        }
        let existing: Vec<String> = match xattr::list(full) {
            Ok(names) => names.map(|n| n.to_string_lossy().into_owned()).collect(),
            Err(error) => {
                tracing::warn!(path = %full.display(), %error, "cannot list extended attributes");
                Vec::new()
            }
        };
        for (name, expected_value) in &entry.xattrs {
            if existing.iter().any(|e| e == name) {
                match xattr::get(full, name) {
                    Ok(Some(actual)) if actual == *expected_value => continue,
                    _ => {
                        self.record(&entry.path, format!("Attribute {name} value is wrong"))?;
                    }
                }
            } else {
                self.record(&entry.path, format!("Attribute {name} is missing"))?;
            }
            if self.level.repairs() {
                if let Err(error) = xattr::set(full, name, expected_value) {
                    tracing::warn!(path = %full.display(), %error, "cannot set extended attribute");
                }
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn reconcile_xattrs(&mut self, _full: &Path, _entry: &Entry) -> MResult<()> {
        Ok(())
    }

    fn finish_pass(&mut self, filters: &FilterSet) -> MResult<()> {
        // Deferred symlinks first: every entry has been seen, so targets
        // that will ever exist exist now. A second failure is final.
        let links = std::mem::take(&mut self.pending_links);
        for entry in links {
            let full = self.base.join(native_path(&entry.path));
            let target = entry.target.clone().unwrap_or_default();
            let attempt = ensure_parent_dir(&full).and_then(|()| make_symlink(&target, &full));
            match attempt {
                Ok(()) => self.reconcile_xattrs(&full, &entry)?,
                Err(error) => {
                    tracing::warn!(path = %full.display(), %error, "deferred symlink failed");
                    self.record(&entry.path, format!("Could not create symlink to {target}"))?;
                }
            }
        }

        // Orphans: on disk, not expected, not filtered. Collect first so
        // the walk never descends into trees it just deleted.
        let mut orphans: Vec<PathBuf> = Vec::new();
        for item in WalkDir::new(&self.base).min_depth(1).follow_links(false) {
            let item = match item {
                Ok(item) => item,
                Err(error) => {
                    tracing::warn!(%error, "skipping unreadable item during orphan walk");
                    continue;
                }
            };
            let Some(rel_path) = relative_to(&self.base, item.path()) else {
                continue;
            };
            if rel_path.is_empty() || filters.skip(&rel_path) {
                continue;
            }
            if !self.expected.contains(&rel_path) {
                self.record(&rel_path, format!("Should not exist: {}", item.path().display()))?;
                if self.level.repairs() {
                    orphans.push(item.path().to_path_buf());
                }
            }
        }
        for orphan in orphans {
            if let Err(error) = remove_tree(&orphan) {
                tracing::warn!(path = %orphan.display(), %error, "cannot delete orphan");
            }
        }

        // Directory mtimes only after every structural mutation is done.
        for (path, seconds) in std::mem::take(&mut self.pending_dir_mtimes) {
            if let Err(error) = set_modified(&path, seconds) {
                tracing::warn!(path = %path.display(), %error, "cannot set directory mtime");
            }
        }

        // Read-only directories last of all, so nothing above was blocked.
        #[cfg(unix)]
        for (path, mode) in std::mem::take(&mut self.pending_readonly_dirs) {
            if let Err(error) = apply_mode(&path, mode) {
                tracing::warn!(path = %path.display(), %error, "cannot re-apply read-only mode");
            }
        }
        Ok(())
    }
}

impl EntrySink for Verifier<'_> {
    fn entry(&mut self, entry: Entry) -> MResult<()> {
        self.check_entry(&entry)
    }

    fn finish(&mut self, filters: &FilterSet) -> MResult<()> {
        self.finish_pass(filters)
    }
}
