//! # Cipher Hook
//!
//! The symmetric-cipher seam used by the frame transport.
//!
//! The key exchange that produces a [`SessionKey`] is negotiated outside the core; the
//! transport only needs something implementing [`Cipher`] plus the key. [`CipherSlot`] holds
//! both for the lifetime of one connection and is shared between the read and write paths.
//!
//! [`XChaChaCipher`] is the bundled implementation: XChaCha20-Poly1305 with a random
//! 24-byte nonce prepended to every ciphertext.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use std::fmt;
use std::sync::{Arc, RwLock};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{constants, BitswarmError, CipherError, FrameError, Result};

/// Length of the nonce prefixed to each XChaCha20-Poly1305 ciphertext
pub const NONCE_LEN: usize = 24;

/// Opaque key material negotiated during the handshake. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey([REDACTED; {}])", self.0.len())
    }
}

/// Symmetric cipher applied to frame payloads.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, key: &SessionKey, plaintext: &[u8]) -> std::result::Result<Vec<u8>, CipherError>;

    fn decrypt(&self, key: &SessionKey, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CipherError>;
}

/// XChaCha20-Poly1305 AEAD; expects a 32-byte session key.
#[derive(Debug, Default, Clone, Copy)]
pub struct XChaChaCipher;

impl XChaChaCipher {
    fn aead(key: &SessionKey) -> std::result::Result<XChaCha20Poly1305, CipherError> {
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CipherError::Encrypt)
    }

    /// Generate a random 32-byte key, for tests and local tooling
    pub fn generate_key() -> SessionKey {
        let mut key = vec![0u8; 32];
        rand::rng().fill_bytes(&mut key);
        SessionKey(key)
    }
}

impl Cipher for XChaChaCipher {
    fn encrypt(&self, key: &SessionKey, plaintext: &[u8]) -> std::result::Result<Vec<u8>, CipherError> {
        let aead = Self::aead(key)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = aead
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &SessionKey, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CipherError::Decrypt);
        }
        let aead = Self::aead(key).map_err(|_| CipherError::Decrypt)?;
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        aead.decrypt(XNonce::from_slice(nonce), body)
            .map_err(|_| CipherError::Decrypt)
    }
}

struct CipherState {
    cipher: Arc<dyn Cipher>,
    key: SessionKey,
}

/// Per-connection cipher state shared by the TCP reader and writer.
#[derive(Default)]
pub struct CipherSlot {
    state: RwLock<Option<CipherState>>,
}

impl CipherSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the negotiated cipher; later frames are encrypted.
    pub fn install(&self, cipher: Arc<dyn Cipher>, key: SessionKey) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_SESSION_LOCK))?;
        *state = Some(CipherState { cipher, key });
        Ok(())
    }

    /// Drop the cipher and wipe the key.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            state.take();
        }
    }

    pub fn is_installed(&self) -> bool {
        self.state.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Encrypt when a cipher is installed; `None` means the payload goes out in clear.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self
            .state
            .read()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_SESSION_LOCK))?;
        match state.as_ref() {
            Some(s) => Ok(Some(s.cipher.encrypt(&s.key, plaintext)?)),
            None => Ok(None),
        }
    }

    /// Decrypt an inbound payload flagged as encrypted.
    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let state = self
            .state
            .read()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_SESSION_LOCK))?;
        let s = state.as_ref().ok_or(FrameError::MissingCipher)?;
        Ok(s.cipher.decrypt(&s.key, ciphertext)?)
    }
}

impl fmt::Debug for CipherSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}
