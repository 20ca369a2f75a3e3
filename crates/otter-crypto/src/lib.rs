/*!
# Otter Key Material

Long-term node identity for the governance engine.

A node holds one Ed25519 keypair. The 32-byte seed is persisted as
`otter.key` (hex, owner-only permissions) in the node's data directory;
the public key is derived from it and embedded in the node's bootstrap
member record. The same keypair doubles as X25519 material for deriving
shared secrets with peers, which in turn seal payloads with
AES-256-GCM.

Replacing the key file replaces the node's governance identity, so a
malformed key is an error — it is never silently regenerated.
*/

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng as AeadOsRng},
    Aes256Gcm, Key, Nonce,
};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use otter_types::{PublicKey, Signature};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the key file inside the data directory.
pub const KEY_FILE: &str = "otter.key";

const NONCE_LEN: usize = 12;
const SHARED_KEY_CONTEXT: &str = "otter-governance 2025 shared secret";

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed key file {path}: {reason}")]
    MalformedKey { path: PathBuf, reason: String },

    #[error("invalid peer public key")]
    InvalidPeerKey,

    #[error("sealing failed: {0}")]
    SealFailed(String),

    #[error("opening failed: {0}")]
    OpenFailed(String),
}

pub type Result<T> = std::result::Result<T, KeyStoreError>;

/// The node's identity keystore: signs, verifies and derives shared
/// secrets with the node's long-term keypair.
pub struct KeyStore {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl KeyStore {
    /// Generate a fresh random keystore without touching disk.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Deterministic keystore from a 32-byte seed. Intended for tests
    /// and reproducible fixtures.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    /// Load the key file from `data_dir`, or generate and persist a new
    /// keypair when no file exists yet.
    ///
    /// A present-but-unreadable key is a hard error: regenerating would
    /// replace the node's governance identity.
    pub fn load_or_generate(data_dir: &Path) -> Result<Self> {
        let key_path = data_dir.join(KEY_FILE);

        if key_path.exists() {
            let store = Self::load(&key_path)?;
            debug!(path = %key_path.display(), "Loaded node identity key");
            return Ok(store);
        }

        let store = Self::generate();
        store.persist(&key_path)?;
        info!(
            path = %key_path.display(),
            public_key = %store.public_key,
            "Generated new node identity key"
        );
        Ok(store)
    }

    fn load(key_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(key_path)?;
        let seed_bytes = hex::decode(contents.trim()).map_err(|e| KeyStoreError::MalformedKey {
            path: key_path.to_path_buf(),
            reason: format!("invalid hex: {}", e),
        })?;

        let seed: [u8; 32] = seed_bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| KeyStoreError::MalformedKey {
                path: key_path.to_path_buf(),
                reason: format!("expected 32 key bytes, found {}", bytes.len()),
            })?;

        Ok(Self::from_seed(&seed))
    }

    fn persist(&self, key_path: &Path) -> Result<()> {
        if let Some(dir) = key_path.parent() {
            fs::create_dir_all(dir)?;
        }

        fs::write(key_path, hex::encode(self.signing_key.to_bytes()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(key_path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign arbitrary bytes with the node key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::new(signature.to_bytes().to_vec())
    }

    /// Verify a signature against a public key. Any malformed input
    /// simply fails verification.
    pub fn verify(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.as_bytes()) else {
            return false;
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }

    /// Derive a 32-byte shared secret with a peer via X25519.
    ///
    /// Both Ed25519 keys are mapped to their Montgomery form, so two
    /// nodes exchanging governance public keys arrive at the same
    /// secret from either side.
    pub fn derive_shared(&self, peer: &PublicKey) -> Result<[u8; 32]> {
        let peer_key =
            VerifyingKey::from_bytes(peer.as_bytes()).map_err(|_| KeyStoreError::InvalidPeerKey)?;
        let peer_montgomery = peer_key.to_montgomery().to_bytes();

        let raw = x25519_dalek::x25519(self.signing_key.to_scalar_bytes(), peer_montgomery);
        Ok(blake3::derive_key(SHARED_KEY_CONTEXT, &raw))
    }

    /// Seal a payload with AES-256-GCM under a derived shared secret.
    /// The random nonce is prepended to the ciphertext.
    pub fn seal(plaintext: &[u8], shared: &[u8; 32]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(shared));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        AeadOsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| KeyStoreError::SealFailed(e.to_string()))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a payload sealed by [`KeyStore::seal`].
    pub fn open(sealed: &[u8], shared: &[u8; 32]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(KeyStoreError::OpenFailed("sealed payload too short".into()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(shared));

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| KeyStoreError::OpenFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sign_verify_round_trip() {
        let store = KeyStore::generate();
        let message = b"adopt rule: say hello";

        let signature = store.sign(message);
        assert!(KeyStore::verify(message, &signature, &store.public_key()));
        assert!(!KeyStore::verify(b"other message", &signature, &store.public_key()));

        let stranger = KeyStore::generate();
        assert!(!KeyStore::verify(message, &signature, &stranger.public_key()));
    }

    #[test]
    fn test_load_or_generate_round_trip() {
        let dir = TempDir::new().unwrap();

        let first = KeyStore::load_or_generate(dir.path()).unwrap();
        let second = KeyStore::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.public_key(), second.public_key());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join(KEY_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_malformed_key_is_not_regenerated() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join(KEY_FILE);

        fs::write(&key_path, "not hex at all").unwrap();
        assert!(matches!(
            KeyStore::load_or_generate(dir.path()),
            Err(KeyStoreError::MalformedKey { .. })
        ));

        fs::write(&key_path, hex::encode([0u8; 16])).unwrap();
        assert!(matches!(
            KeyStore::load_or_generate(dir.path()),
            Err(KeyStoreError::MalformedKey { .. })
        ));

        // The bad file must survive untouched.
        assert_eq!(fs::read_to_string(&key_path).unwrap(), hex::encode([0u8; 16]));
    }

    #[test]
    fn test_shared_secret_agreement() {
        let alice = KeyStore::from_seed(&[1u8; 32]);
        let bob = KeyStore::from_seed(&[2u8; 32]);

        let alice_shared = alice.derive_shared(&bob.public_key()).unwrap();
        let bob_shared = bob.derive_shared(&alice.public_key()).unwrap();
        assert_eq!(alice_shared, bob_shared);

        let carol = KeyStore::from_seed(&[3u8; 32]);
        assert_ne!(alice_shared, carol.derive_shared(&alice.public_key()).unwrap());
    }

    #[test]
    fn test_seal_open_round_trip() {
        let alice = KeyStore::generate();
        let bob = KeyStore::generate();
        let shared = alice.derive_shared(&bob.public_key()).unwrap();

        let sealed = KeyStore::seal(b"raft rules attached", &shared).unwrap();
        let opened = KeyStore::open(&sealed, &shared).unwrap();
        assert_eq!(opened, b"raft rules attached");

        let mut tampered = sealed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        assert!(KeyStore::open(&tampered, &shared).is_err());
    }
}
