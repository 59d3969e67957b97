//! Agency-scoped PIN encryption.
//!
//! Every agency owns a random 256-bit key, generated once at creation and
//! stored base64-encoded. Agent PINs are sealed with XChaCha20-Poly1305 under
//! that key; the stored value is `base64(nonce || ciphertext)`.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::{Rng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{EngineError, ResultEngine};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;
pub const PIN_LEN: usize = 6;

/// Symmetric key of one agency.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AgencyKey([u8; KEY_LEN]);

impl AgencyKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> ResultEngine<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|err| EngineError::Crypto(format!("invalid agency key: {err}")))?,
        );
        let bytes: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| EngineError::Crypto("agency key must be 32 bytes".to_string()))?;
        Ok(Self(bytes))
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&self.0).into())
    }

    /// Seals a PIN. The PIN must already be validated.
    pub fn seal(&self, pin: &str) -> ResultEngine<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(XNonce::from_slice(&nonce), pin.as_bytes())
            .map_err(|err| EngineError::Crypto(err.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Opens a sealed PIN. The plaintext is wiped on drop.
    pub fn open(&self, sealed: &str) -> ResultEngine<Zeroizing<String>> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|err| EngineError::Crypto(format!("invalid sealed pin: {err}")))?;
        if bytes.len() <= NONCE_LEN {
            return Err(EngineError::Crypto("sealed pin is truncated".to_string()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|err| EngineError::Crypto(err.to_string()))?;
        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| EngineError::Crypto("sealed pin is not utf-8".to_string()))
    }

    /// `true` only when `sealed` opens to exactly `candidate`.
    pub fn matches(&self, sealed: &str, candidate: &str) -> bool {
        match self.open(sealed) {
            Ok(plain) => plain.as_bytes().ct_eq(candidate.as_bytes()).into(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for AgencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AgencyKey(..)")
    }
}

/// A PIN is exactly six ASCII digits.
pub fn validate_pin(pin: &str) -> ResultEngine<()> {
    if pin.len() != PIN_LEN || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::Validation(
            "PIN must be exactly 6 digits".to_string(),
        ));
    }
    Ok(())
}

/// Random six-digit code, zero padded. Used for transfer verification.
pub(crate) fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:06}")
}
