//! VAPID keys and token signing for Web Push (RFC 8292).
//!
//! The application server proves it owns the key pair the browser was
//! given at subscribe time by attaching a short-lived ES256 JWT to every
//! push request. The token is scoped to the push service origin (`aud`)
//! and names a contact URI (`sub`).

use std::fmt;

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::rand_core::OsRng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::codec;
use crate::constants::{MAX_VAPID_EXPIRY_SECS, PRIVATE_KEY_LEN, UNCOMPRESSED_POINT_LEN};
use crate::error::SigningError;

/// Base64url key pair as it travels between the browser page and the relay.
///
/// Matches the `applicationKeys` object the page posts: `{public, private}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationKeys {
    /// Uncompressed public key (65 bytes decoded).
    pub public: String,
    /// Raw private scalar (32 bytes decoded).
    pub private: String,
}

/// VAPID keypair for web push authentication.
///
/// Holds the P-256 signing key and its uncompressed SEC1 public point.
/// Construction always checks that the public key is the one derived from
/// the private scalar, so a pair can never be half-swapped.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "ApplicationKeys", into = "ApplicationKeys")]
pub struct VapidKeys {
    signing_key: SigningKey,
    public_key: [u8; UNCOMPRESSED_POINT_LEN],
}

impl fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key_base64url())
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    /// Generate a fresh VAPID keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let point = signing_key.verifying_key().to_encoded_point(false);
        let mut public_key = [0u8; UNCOMPRESSED_POINT_LEN];
        public_key.copy_from_slice(point.as_bytes());
        Self {
            signing_key,
            public_key,
        }
    }

    /// Reconstruct from the base64url private scalar alone.
    pub fn from_private_base64url(private_key_b64: &str) -> Result<Self, SigningError> {
        let priv_bytes = Zeroizing::new(codec::decode(private_key_b64)?);
        if priv_bytes.len() != PRIVATE_KEY_LEN {
            return Err(SigningError::InvalidKey(format!(
                "private key must be a 32-byte P-256 scalar, got {} bytes",
                priv_bytes.len()
            )));
        }
        let signing_key = SigningKey::from_bytes(priv_bytes.as_slice().into())
            .map_err(|e| SigningError::InvalidKey(format!("not a valid P-256 scalar: {e}")))?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Reconstruct from base64url-encoded strings.
    ///
    /// Validates the public key format and the private key scalar, then
    /// checks the public key is `private * G`.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str) -> Result<Self, SigningError> {
        let pub_bytes = codec::decode(public_key_b64)?;
        if pub_bytes.len() != UNCOMPRESSED_POINT_LEN || pub_bytes[0] != 0x04 {
            return Err(SigningError::InvalidKey(
                "public key must be a 65-byte uncompressed P-256 point".to_string(),
            ));
        }

        let keys = Self::from_private_base64url(private_key_b64)?;
        if keys.public_key.as_slice() != pub_bytes.as_slice() {
            return Err(SigningError::KeyMismatch);
        }
        Ok(keys)
    }

    /// Base64url-encoded uncompressed public key.
    ///
    /// This is what browsers receive as the `applicationServerKey`.
    pub fn public_key_base64url(&self) -> String {
        codec::encode(&self.public_key)
    }

    /// Base64url-encoded raw 32-byte private key scalar.
    pub fn private_key_base64url(&self) -> Zeroizing<String> {
        Zeroizing::new(codec::encode(&self.signing_key.to_bytes()))
    }

    /// Uncompressed public key bytes.
    pub fn public_key_bytes(&self) -> &[u8; UNCOMPRESSED_POINT_LEN] {
        &self.public_key
    }

    /// Sign a token for the push service that owns `endpoint`.
    ///
    /// `expiry_secs` must be within `1..=86400`.
    pub fn sign_for_endpoint(
        &self,
        endpoint: &str,
        subject: &str,
        expiry_secs: u32,
    ) -> Result<VapidToken, SigningError> {
        if expiry_secs == 0 || expiry_secs > MAX_VAPID_EXPIRY_SECS {
            return Err(SigningError::InvalidExpiry {
                got: expiry_secs,
                max: MAX_VAPID_EXPIRY_SECS,
            });
        }
        validate_subject(subject)?;

        let claims = VapidClaims {
            aud: audience_for(endpoint)?,
            exp: chrono::Utc::now().timestamp() + i64::from(expiry_secs),
            sub: subject.to_string(),
        };
        self.sign_claims(&claims)
    }

    /// Sign arbitrary claims without checking the expiry window.
    pub fn sign_claims(&self, claims: &VapidClaims) -> Result<VapidToken, SigningError> {
        let header = JwtHeader {
            typ: "JWT".to_string(),
            alg: JWT_ALG.to_string(),
        };
        let signing_input = format!(
            "{}.{}",
            codec::encode(&serde_json::to_vec(&header)?),
            codec::encode(&serde_json::to_vec(claims)?)
        );

        // ES256: SHA-256 digest, raw 64-byte r || s (not DER).
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let token = format!("{signing_input}.{}", codec::encode(&signature.to_bytes()));

        Ok(VapidToken {
            token,
            public_key: self.public_key_base64url(),
        })
    }
}

impl TryFrom<ApplicationKeys> for VapidKeys {
    type Error = SigningError;

    fn try_from(keys: ApplicationKeys) -> Result<Self, Self::Error> {
        Self::from_base64url(&keys.public, &keys.private)
    }
}

impl From<VapidKeys> for ApplicationKeys {
    fn from(keys: VapidKeys) -> Self {
        Self {
            public: keys.public_key_base64url(),
            private: keys.private_key_base64url().to_string(),
        }
    }
}

const JWT_ALG: &str = "ES256";

#[derive(Serialize, Deserialize)]
struct JwtHeader {
    typ: String,
    alg: String,
}

/// Claims carried by a VAPID token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VapidClaims {
    /// Origin of the push service.
    pub aud: String,
    /// Expiry as seconds since the Unix epoch.
    pub exp: i64,
    /// Contact URI for the application server operator.
    pub sub: String,
}

/// A signed VAPID token and the public key that verifies it.
#[derive(Clone, Debug)]
pub struct VapidToken {
    /// Compact JWT (`header.claims.signature`).
    pub token: String,
    /// Base64url uncompressed public key.
    pub public_key: String,
}

impl VapidToken {
    /// `Authorization` header value.
    pub fn authorization(&self) -> String {
        format!("vapid t={}, k={}", self.token, self.public_key)
    }

    /// This token's contribution to the `Crypto-Key` header.
    pub fn crypto_key(&self) -> String {
        format!("p256ecdsa={}", self.public_key)
    }
}

/// Origin (scheme, host and non-default port) of a push endpoint.
///
/// Push services reject tokens whose `aud` carries a path, so the path and
/// query are always dropped.
pub fn audience_for(endpoint: &str) -> Result<String, SigningError> {
    let url = Url::parse(endpoint).map_err(|e| SigningError::InvalidAudience(format!("{endpoint}: {e}")))?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(SigningError::InvalidAudience(endpoint.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

/// Require a `mailto:` or `https:` contact URI.
pub fn validate_subject(subject: &str) -> Result<(), SigningError> {
    let valid = subject
        .strip_prefix("mailto:")
        .or_else(|| subject.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty());
    if valid {
        Ok(())
    } else {
        Err(SigningError::InvalidSubject(subject.to_string()))
    }
}

/// Verify a token against `public_key` (65-byte point) and the current time.
pub fn verify(token: &str, public_key: &[u8]) -> Result<VapidClaims, SigningError> {
    verify_at(token, public_key, chrono::Utc::now().timestamp())
}

/// Verify a token against `public_key` as of `now` (Unix seconds).
pub fn verify_at(token: &str, public_key: &[u8], now: i64) -> Result<VapidClaims, SigningError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SigningError::MalformedToken("expected three segments".to_string()));
    };

    let header: JwtHeader = serde_json::from_slice(&codec::decode(header_b64)?)?;
    if header.alg != JWT_ALG {
        return Err(SigningError::MalformedToken(format!("unsupported alg {}", header.alg)));
    }

    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| SigningError::InvalidKey(format!("public key: {e}")))?;
    let signature = Signature::from_slice(&codec::decode(sig_b64)?)
        .map_err(|e| SigningError::MalformedToken(format!("signature: {e}")))?;
    let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| SigningError::BadSignature)?;

    let claims: VapidClaims = serde_json::from_slice(&codec::decode(claims_b64)?)?;
    if claims.exp <= now {
        return Err(SigningError::Expired { exp: claims.exp });
    }
    Ok(claims)
}
