//! XChaCha20-Poly1305 stream frame decryption.
//!
//! An encrypted stream is a sequence of frames, each prefixed with its
//! length as a big-endian `u32`. A frame is `nonce || ciphertext`. The
//! cipher key is the SHA-256 digest of the per-track key string.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::{Decryptor, PipelineError};

/// Nonce length for XChaCha20-Poly1305.
pub const NONCE_LEN: usize = 24;

/// Length of the big-endian frame length prefix.
pub(crate) const FRAME_HEADER_LEN: usize = 4;

const KEY_LEN: usize = 32;

/// Reference [`Decryptor`] for XChaCha20-Poly1305 frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct XChaChaDecryptor;

impl XChaChaDecryptor {
    /// Creates a decryptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encrypts one frame under `key` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Decryption`] if the cipher rejects the input.
    pub fn seal(&self, plaintext: &[u8], key: &str) -> Result<Vec<u8>, PipelineError> {
        let cipher = cipher_for(key);

        let mut nonce = [0_u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| PipelineError::decryption("frame encryption failed"))?;

        let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Splits `plaintext` into sealed, length-prefixed frames of at most
    /// `frame_size` bytes each. Produces the wire format the HTTP fetcher reads.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Decryption`] if sealing fails.
    pub fn seal_stream(
        &self,
        plaintext: &[u8],
        key: &str,
        frame_size: usize,
    ) -> Result<Vec<u8>, PipelineError> {
        let mut out = Vec::new();
        for chunk in plaintext.chunks(frame_size.max(1)) {
            let frame = self.seal(chunk, key)?;
            let len = u32::try_from(frame.len())
                .map_err(|_| PipelineError::decryption("frame too large"))?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&frame);
        }
        Ok(out)
    }
}

impl Decryptor for XChaChaDecryptor {
    fn decrypt(&self, frame: &[u8], key: &str) -> Result<Vec<u8>, PipelineError> {
        if frame.len() < NONCE_LEN {
            return Err(PipelineError::decryption(format!(
                "frame of {} bytes is shorter than the nonce",
                frame.len()
            )));
        }

        let (nonce, ciphertext) = frame.split_at(NONCE_LEN);
        cipher_for(key)
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| PipelineError::decryption("frame failed authentication"))
    }
}

fn cipher_for(key: &str) -> XChaCha20Poly1305 {
    let digest = Sha256::digest(key.as_bytes());
    let mut key_bytes = [0_u8; KEY_LEN];
    key_bytes.copy_from_slice(&digest[..KEY_LEN]);
    XChaCha20Poly1305::new(Key::from_slice(&key_bytes))
}
