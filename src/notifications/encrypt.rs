//! Push message payload encryption.
//!
//! Implements both Web Push content encodings over P-256 ECDH, HKDF-SHA256
//! and AES-128-GCM:
//!
//! - `aesgcm` (draft-ietf-webpush-encryption-04): salt and ephemeral key
//!   travel in the `Encryption` and `Crypto-Key` headers, the body is the
//!   bare record with a 2-byte padding-length prefix.
//! - `aes128gcm` (RFC 8291 / RFC 8188): salt, record size and ephemeral key
//!   are prepended to the body, the record ends with a `0x02` delimiter.
//!
//! Every message uses a fresh ephemeral key pair and a fresh salt. Payloads
//! always fit a single 4096-byte record, so the record counter is zero and
//! the derived nonce is used as-is.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::rand_core::OsRng;
use p256::{PublicKey, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::codec;
use crate::constants::{
    AUTH_SECRET_LEN, MAX_ENCRYPTED_PAYLOAD, RECORD_SIZE, SALT_LEN, TAG_LEN, UNCOMPRESSED_POINT_LEN,
};
use crate::error::EncryptionError;

/// Length of the `aesgcm` padding-length prefix.
const AESGCM_PAD_PREFIX_LEN: usize = 2;

/// `aes128gcm` header: salt, 4-byte record size, key id length, key id.
const AES128GCM_HEADER_LEN: usize = SALT_LEN + 4 + 1 + UNCOMPRESSED_POINT_LEN;

/// `aes128gcm` last-record padding delimiter.
const AES128GCM_LAST_RECORD: u8 = 0x02;

/// Content coding of an encrypted push body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// Legacy draft coding, still accepted by every push service.
    #[default]
    AesGcm,
    /// RFC 8291 coding.
    Aes128Gcm,
}

impl ContentEncoding {
    /// Value of the `Content-Encoding` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AesGcm => "aesgcm",
            Self::Aes128Gcm => "aes128gcm",
        }
    }

    /// Largest plaintext that still fits the push service body limit.
    pub fn max_plaintext_len(self) -> usize {
        match self {
            Self::AesGcm => MAX_ENCRYPTED_PAYLOAD - AESGCM_PAD_PREFIX_LEN - TAG_LEN,
            Self::Aes128Gcm => MAX_ENCRYPTED_PAYLOAD - AES128GCM_HEADER_LEN - 1 - TAG_LEN,
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aesgcm" => Ok(Self::AesGcm),
            "aes128gcm" => Ok(Self::Aes128Gcm),
            other => Err(format!("unknown content encoding '{other}' (expected aesgcm or aes128gcm)")),
        }
    }
}

/// A subscriber's validated `p256dh` key and auth secret.
#[derive(Clone, Debug)]
pub struct SubscriberKeys {
    public_key: PublicKey,
    public_bytes: [u8; UNCOMPRESSED_POINT_LEN],
    auth: [u8; AUTH_SECRET_LEN],
}

impl SubscriberKeys {
    /// Validate raw key bytes.
    pub fn new(p256dh: &[u8], auth: &[u8]) -> Result<Self, EncryptionError> {
        let public_bytes: [u8; UNCOMPRESSED_POINT_LEN] = p256dh.try_into().map_err(|_| {
            EncryptionError::InvalidPublicKey(format!("expected 65 bytes, got {}", p256dh.len()))
        })?;
        if public_bytes[0] != 0x04 {
            return Err(EncryptionError::InvalidPublicKey(
                "not an uncompressed point".to_string(),
            ));
        }
        let public_key = PublicKey::from_sec1_bytes(&public_bytes)
            .map_err(|e| EncryptionError::InvalidPublicKey(format!("not on P-256: {e}")))?;
        let auth: [u8; AUTH_SECRET_LEN] = auth
            .try_into()
            .map_err(|_| EncryptionError::InvalidAuthSecret(auth.len()))?;

        Ok(Self {
            public_key,
            public_bytes,
            auth,
        })
    }

    /// Validate base64url keys as found in a browser subscription.
    pub fn from_base64url(p256dh: &str, auth: &str) -> Result<Self, EncryptionError> {
        Self::new(&codec::decode(p256dh)?, &codec::decode(auth)?)
    }

    /// Uncompressed subscriber public key.
    pub fn public_key_bytes(&self) -> &[u8; UNCOMPRESSED_POINT_LEN] {
        &self.public_bytes
    }
}

/// The subscriber side of a subscription: private key plus auth secret.
///
/// Push services never hold this; it exists so messages can be decrypted
/// the way a browser would, e.g. to check what a relay sends.
pub struct ReceiverKeys {
    secret: SecretKey,
    public_bytes: [u8; UNCOMPRESSED_POINT_LEN],
    auth: [u8; AUTH_SECRET_LEN],
}

impl fmt::Debug for ReceiverKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverKeys")
            .field("public_key", &codec::encode(&self.public_bytes))
            .finish_non_exhaustive()
    }
}

impl ReceiverKeys {
    /// Wrap an existing subscriber key pair.
    pub fn new(secret: SecretKey, auth: [u8; AUTH_SECRET_LEN]) -> Self {
        let public_bytes = uncompressed_point(&secret.public_key());
        Self {
            secret,
            public_bytes,
            auth,
        }
    }

    /// Fresh key pair and auth secret, as a browser creates on subscribe.
    pub fn generate() -> Self {
        let mut auth = [0u8; AUTH_SECRET_LEN];
        rand::rng().fill_bytes(&mut auth);
        Self::new(SecretKey::random(&mut OsRng), auth)
    }

    /// Base64url `p256dh` value for a subscription.
    pub fn p256dh_base64url(&self) -> String {
        codec::encode(&self.public_bytes)
    }

    /// Base64url `auth` value for a subscription.
    pub fn auth_base64url(&self) -> String {
        codec::encode(&self.auth)
    }

    /// The public half, as an encrypting sender sees it.
    pub fn subscriber_keys(&self) -> SubscriberKeys {
        SubscriberKeys {
            public_key: self.secret.public_key(),
            public_bytes: self.public_bytes,
            auth: self.auth,
        }
    }
}

/// An encrypted push body and the values its headers need.
#[derive(Clone, Debug)]
pub struct EncryptedPayload {
    /// Coding the body was produced with.
    pub content_encoding: ContentEncoding,
    /// Request body.
    pub body: Vec<u8>,
    /// HKDF salt.
    pub salt: [u8; SALT_LEN],
    /// Ephemeral sender public key.
    pub sender_public_key: [u8; UNCOMPRESSED_POINT_LEN],
}

impl EncryptedPayload {
    /// Headers the coding requires besides `Content-Encoding`.
    ///
    /// For `aesgcm` these are `Encryption: salt=...` and `Crypto-Key: dh=...`.
    /// `aes128gcm` carries everything in the body.
    pub fn crypto_headers(&self) -> Vec<(&'static str, String)> {
        match self.content_encoding {
            ContentEncoding::AesGcm => vec![
                ("Encryption", format!("salt={}", codec::encode(&self.salt))),
                ("Crypto-Key", format!("dh={}", codec::encode(&self.sender_public_key))),
            ],
            ContentEncoding::Aes128Gcm => Vec::new(),
        }
    }
}

/// Encrypt `plaintext` for a subscriber with a fresh ephemeral key and salt.
pub fn encrypt(
    plaintext: &[u8],
    keys: &SubscriberKeys,
    encoding: ContentEncoding,
) -> Result<EncryptedPayload, EncryptionError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    encrypt_with(plaintext, keys, encoding, &SecretKey::random(&mut OsRng), salt)
}

fn encrypt_with(
    plaintext: &[u8],
    keys: &SubscriberKeys,
    encoding: ContentEncoding,
    ephemeral: &SecretKey,
    salt: [u8; SALT_LEN],
) -> Result<EncryptedPayload, EncryptionError> {
    let max = encoding.max_plaintext_len();
    if plaintext.len() > max {
        return Err(EncryptionError::PayloadTooLarge {
            len: plaintext.len(),
            max,
        });
    }

    let sender_public_key = uncompressed_point(&ephemeral.public_key());
    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), keys.public_key.as_affine());
    let (cek, nonce) = derive_key_and_nonce(
        encoding,
        shared.raw_secret_bytes(),
        &keys.auth,
        &salt,
        &keys.public_bytes,
        &sender_public_key,
    )?;

    let mut record = Zeroizing::new(Vec::with_capacity(plaintext.len() + AESGCM_PAD_PREFIX_LEN));
    match encoding {
        ContentEncoding::AesGcm => {
            record.extend_from_slice(&[0, 0]);
            record.extend_from_slice(plaintext);
        }
        ContentEncoding::Aes128Gcm => {
            record.extend_from_slice(plaintext);
            record.push(AES128GCM_LAST_RECORD);
        }
    }

    let cipher = Aes128Gcm::new_from_slice(cek.as_slice())
        .map_err(|e| EncryptionError::Cipher(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), record.as_slice())
        .map_err(|e| EncryptionError::Cipher(e.to_string()))?;

    let body = match encoding {
        ContentEncoding::AesGcm => ciphertext,
        ContentEncoding::Aes128Gcm => {
            let mut body = Vec::with_capacity(AES128GCM_HEADER_LEN + ciphertext.len());
            body.extend_from_slice(&salt);
            body.extend_from_slice(&(RECORD_SIZE as u32).to_be_bytes());
            body.push(UNCOMPRESSED_POINT_LEN as u8);
            body.extend_from_slice(&sender_public_key);
            body.extend_from_slice(&ciphertext);
            body
        }
    };

    Ok(EncryptedPayload {
        content_encoding: encoding,
        body,
        salt,
        sender_public_key,
    })
}

/// Decrypt an `aesgcm` body given the `salt` and `dh` header values.
pub fn decrypt_aesgcm(
    body: &[u8],
    salt: &[u8],
    sender_public_key: &[u8],
    receiver: &ReceiverKeys,
) -> Result<Vec<u8>, EncryptionError> {
    if body.len() < AESGCM_PAD_PREFIX_LEN + TAG_LEN || body.len() > RECORD_SIZE + TAG_LEN {
        return Err(EncryptionError::Decryption(format!(
            "body of {} bytes is not a single aesgcm record",
            body.len()
        )));
    }
    let record = decrypt_record(ContentEncoding::AesGcm, body, salt, sender_public_key, receiver)?;

    let pad = usize::from(u16::from_be_bytes([record[0], record[1]]));
    let padding = record
        .get(AESGCM_PAD_PREFIX_LEN..AESGCM_PAD_PREFIX_LEN + pad)
        .ok_or_else(|| EncryptionError::Decryption("padding longer than record".to_string()))?;
    if padding.iter().any(|&b| b != 0) {
        return Err(EncryptionError::Decryption("bad padding".to_string()));
    }
    Ok(record[AESGCM_PAD_PREFIX_LEN + pad..].to_vec())
}

/// Decrypt an `aes128gcm` body, reading salt and key from its header.
pub fn decrypt_aes128gcm(body: &[u8], receiver: &ReceiverKeys) -> Result<Vec<u8>, EncryptionError> {
    if body.len() < AES128GCM_HEADER_LEN + TAG_LEN + 1 {
        return Err(EncryptionError::Decryption("body shorter than header".to_string()));
    }
    let salt = &body[..SALT_LEN];
    let record_size = u32::from_be_bytes([body[16], body[17], body[18], body[19]]) as usize;
    let key_id_len = usize::from(body[20]);
    if key_id_len != UNCOMPRESSED_POINT_LEN {
        return Err(EncryptionError::Decryption(format!(
            "key id must be a 65-byte point, got {key_id_len} bytes"
        )));
    }
    let sender_public_key = &body[21..AES128GCM_HEADER_LEN];
    let ciphertext = &body[AES128GCM_HEADER_LEN..];
    if ciphertext.len() > record_size {
        return Err(EncryptionError::Decryption("multi-record bodies are not supported".to_string()));
    }

    let mut record = decrypt_record(ContentEncoding::Aes128Gcm, ciphertext, salt, sender_public_key, receiver)?;
    while record.last() == Some(&0) {
        record.pop();
    }
    if record.pop() != Some(AES128GCM_LAST_RECORD) {
        return Err(EncryptionError::Decryption("missing last-record delimiter".to_string()));
    }
    Ok(record)
}

fn decrypt_record(
    encoding: ContentEncoding,
    ciphertext: &[u8],
    salt: &[u8],
    sender_public_key: &[u8],
    receiver: &ReceiverKeys,
) -> Result<Vec<u8>, EncryptionError> {
    let salt: [u8; SALT_LEN] = salt
        .try_into()
        .map_err(|_| EncryptionError::Decryption(format!("salt must be 16 bytes, got {}", salt.len())))?;
    let sender_bytes: [u8; UNCOMPRESSED_POINT_LEN] = sender_public_key.try_into().map_err(|_| {
        EncryptionError::InvalidPublicKey(format!("sender key: expected 65 bytes, got {}", sender_public_key.len()))
    })?;
    let sender = PublicKey::from_sec1_bytes(&sender_bytes)
        .map_err(|e| EncryptionError::InvalidPublicKey(format!("sender key not on P-256: {e}")))?;

    let shared = diffie_hellman(receiver.secret.to_nonzero_scalar(), sender.as_affine());
    let (cek, nonce) = derive_key_and_nonce(
        encoding,
        shared.raw_secret_bytes(),
        &receiver.auth,
        &salt,
        &receiver.public_bytes,
        &sender_bytes,
    )?;

    let cipher = Aes128Gcm::new_from_slice(cek.as_slice())
        .map_err(|e| EncryptionError::Decryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext)
        .map_err(|_| EncryptionError::Decryption("authentication tag mismatch".to_string()))
}

/// Derive the content encryption key and nonce for one message.
///
/// `receiver` is the subscriber's key, `sender` the ephemeral key.
fn derive_key_and_nonce(
    encoding: ContentEncoding,
    ecdh_secret: &[u8],
    auth: &[u8; AUTH_SECRET_LEN],
    salt: &[u8; SALT_LEN],
    receiver: &[u8; UNCOMPRESSED_POINT_LEN],
    sender: &[u8; UNCOMPRESSED_POINT_LEN],
) -> Result<(Zeroizing<[u8; 16]>, [u8; 12]), EncryptionError> {
    let mut ikm = Zeroizing::new([0u8; 32]);
    let mut cek = Zeroizing::new([0u8; 16]);
    let mut nonce = [0u8; 12];

    match encoding {
        ContentEncoding::AesGcm => {
            hkdf_expand(auth, ecdh_secret, b"Content-Encoding: auth\0", ikm.as_mut_slice())?;

            let mut context = Vec::with_capacity(6 + 2 * (2 + UNCOMPRESSED_POINT_LEN));
            context.extend_from_slice(b"P-256\0");
            for key in [receiver, sender] {
                context.extend_from_slice(&(UNCOMPRESSED_POINT_LEN as u16).to_be_bytes());
                context.extend_from_slice(key);
            }

            let key_info = [b"Content-Encoding: aesgcm\0".as_slice(), context.as_slice()].concat();
            let nonce_info = [b"Content-Encoding: nonce\0".as_slice(), context.as_slice()].concat();
            hkdf_expand(salt, ikm.as_slice(), &key_info, cek.as_mut_slice())?;
            hkdf_expand(salt, ikm.as_slice(), &nonce_info, &mut nonce)?;
        }
        ContentEncoding::Aes128Gcm => {
            let key_info = [b"WebPush: info\0".as_slice(), receiver.as_slice(), sender.as_slice()].concat();
            hkdf_expand(auth, ecdh_secret, &key_info, ikm.as_mut_slice())?;

            hkdf_expand(salt, ikm.as_slice(), b"Content-Encoding: aes128gcm\0", cek.as_mut_slice())?;
            hkdf_expand(salt, ikm.as_slice(), b"Content-Encoding: nonce\0", &mut nonce)?;
        }
    }

    Ok((cek, nonce))
}

/// HKDF-SHA256 extract-and-expand into `out`.
fn hkdf_expand(salt: &[u8], ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), EncryptionError> {
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(info, out)
        .map_err(|e| EncryptionError::Cipher(format!("HKDF expansion failed: {e}")))
}

fn uncompressed_point(key: &PublicKey) -> [u8; UNCOMPRESSED_POINT_LEN] {
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let point = key.to_encoded_point(false);
    let mut bytes = [0u8; UNCOMPRESSED_POINT_LEN];
    bytes.copy_from_slice(point.as_bytes());
    bytes
}
