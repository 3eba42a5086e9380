//! Deterministic toy signer.

use snap_manifest::Signer;

/// "Signs" by xoring the digest with a secret byte.
///
/// Worthless cryptographically, but deterministic and cheap: exactly what
/// signature-plumbing tests need.
#[derive(Debug, Clone, Copy)]
pub struct StubKey {
    secret: u8,
    private: bool,
}

impl StubKey {
    /// A key that can sign.
    pub fn private(secret: u8) -> Self {
        Self {
            secret,
            private: true,
        }
    }

    /// The public half: can validate, refuses to sign.
    pub fn public_only(secret: u8) -> Self {
        Self {
            secret,
            private: false,
        }
    }
}

impl Signer for StubKey {
    fn is_private(&self) -> bool {
        self.private
    }

    fn public(&self) -> String {
        format!("stub:{:02x}", self.secret)
    }

    fn sign(&self, digest: &[u8]) -> Vec<u8> {
        digest.iter().map(|b| b ^ self.secret).collect()
    }

    fn validate(&self, signature: &[u8], digest: &[u8]) -> bool {
        self.sign(digest) == signature
    }
}
