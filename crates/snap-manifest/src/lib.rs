//! Directory snapshot manifests.
//!
//! A manifest is a markup inventory of one directory tree: files,
//! directories and symlinks with their metadata, content hashes, and
//! extended attributes. This crate owns the document format: generation
//! from a live tree ([`generate`]), streaming parse-and-dispatch into an
//! [`EntrySink`] ([`parse`]), plus the consumed collaborator interfaces
//! for payload archives ([`Archive`]) and manifest signing ([`Signer`]).

pub mod archive;
pub mod entry;
pub mod error;
pub mod filter;
pub mod generate;
pub mod meta;
pub mod path;
pub mod reader;
pub mod sign;
pub mod timefmt;
pub mod writer;

pub use archive::{Archive, DirArchive};
pub use entry::{Entry, EntryKind};
pub use error::{Error, Result};
pub use filter::FilterSet;
pub use generate::{GenerateOptions, Signing, generate};
pub use meta::{DiskKind, ItemMeta, inspect};
pub use path::{manifest_path, native_path, relative_to};
pub use reader::{EntrySink, parse};
pub use sign::{SignedDigest, Signer, read_signature_doc, write_signature_doc};
pub use timefmt::{format_timestamp, parse_timestamp};
pub use writer::ManifestWriter;
