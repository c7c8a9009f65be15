use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Pending authorization challenge, persisted between `login` and `callback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub state: String,
    pub verifier: String,
}

impl Challenge {
    /// Fresh random state and S256 verifier.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            state: random_url_safe::<16>(),
            verifier: random_url_safe::<48>(),
        }
    }

    /// `BASE64URL(SHA256(verifier))`
    #[must_use]
    pub fn code_challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.verifier.as_bytes()))
    }
}

fn random_url_safe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}
