//! Streaming hashing primitives for manifest generation and validation.
//!
//! Provides the multi-algorithm digest registry, the block-wise
//! transfer-and-hash routine with text/binary classification and
//! line-ending rewriting, and a stream wrapper that hashes bytes as they
//! pass through.

pub mod algorithm;
pub mod stream;
pub mod transfer;

pub use algorithm::{HashAlgorithm, HashValue, from_hex, hash_lists_match, to_hex};
pub use stream::{HasherSlot, StreamHasher};
pub use transfer::{TransferOutcome, normalize_eol, platform_eol, transfer_and_hash};
