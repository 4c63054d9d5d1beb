//! PKCE challenge lifecycle.
//!
//! A tenant starting a flow gets a fresh verifier/challenge pair. The
//! challenge goes out in the authorize URL; the verifier is persisted under
//! the tenant id until the callback consumes it.

mod store;

pub use store::{run_challenge_sweep, ChallengeStore, PendingChallenge};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes behind a verifier. 32 bytes encode to 43 base64url characters,
/// the RFC 7636 minimum.
const VERIFIER_BYTES: usize = 32;

/// Challenge method sent alongside the challenge.
pub const CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier and its S256 challenge.
#[derive(Clone)]
pub struct Pkce {
    /// Secret kept server-side until the token exchange.
    pub verifier: String,
    /// `base64url(sha256(verifier))`, sent in the authorize URL.
    pub challenge: String,
}

impl Pkce {
    /// Generates a new verifier/challenge pair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);

        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = compute_challenge(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    /// Checks that `challenge` was derived from `verifier`.
    #[must_use]
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        compute_challenge(verifier) == challenge
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 43);
        assert_eq!(pkce.challenge.len(), 43);
        assert!(Pkce::verify(&pkce.verifier, &pkce.challenge));
        assert!(!Pkce::verify("some-other-verifier", &pkce.challenge));
    }

    #[test]
    fn test_verifier_is_url_safe() {
        let pkce = Pkce::generate();
        assert!(pkce
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_known_vector() {
        // RFC 7636 appendix B
        assert!(Pkce::verify(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        ));
    }

    #[test]
    fn test_pairs_are_unique() {
        let a = Pkce::generate();
        let b = Pkce::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
    }

    #[test]
    fn test_debug_hides_verifier() {
        let pkce = Pkce::generate();
        let printed = format!("{pkce:?}");
        assert!(!printed.contains(&pkce.verifier));
        assert!(printed.contains(&pkce.challenge));
    }
}
