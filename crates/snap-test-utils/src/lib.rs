//! Shared test utilities for the snapshot-manager workspace.
//!
//! [`TestTree`] builds throwaway directory trees, [`MemArchive`] is an
//! in-memory payload archive (optionally store-only, to exercise the
//! streaming fallback), and [`StubKey`] is a deterministic toy signer.

mod archive;
mod sign;
mod tree;

pub use archive::MemArchive;
pub use sign::StubKey;
pub use tree::TestTree;
