//! Signed session tokens.
//!
//! A session token is `base64url(header).base64url(claims).base64url(sig)`
//! with an HMAC-SHA256 signature over the first two segments, keyed by the
//! process-wide session secret. Claims bind the account id, its role and the
//! issuance time; validity is a fixed 24-hour window from issuance. Tokens
//! are tamper-evident but stateless: nothing is persisted server-side.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{fmt, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Fixed session lifetime: 24 hours from issuance.
pub const SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

type HmacSha256 = Hmac<Sha256>;

/// Account role carried in session claims and stored with each account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "doctor" => Ok(Self::Doctor),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl SessionTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Decoded, signature-checked payload of a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    #[must_use]
    pub const fn account_id(&self) -> Uuid {
        self.sub
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm")]
    Algorithm,
    #[error("signature verification failed")]
    Signature,
    #[error("token expired")]
    Expired,
}

/// Signs and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: secret.to_vec(),
        }
    }

    /// Issue a token for the account, valid for [`SESSION_TTL_SECONDS`].
    ///
    /// # Errors
    /// Returns [`TokenError::Json`] if claims serialization fails.
    pub fn sign(
        &self,
        account_id: Uuid,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let header = SessionTokenHeader::hs256();
        let claims = SessionClaims {
            sub: account_id,
            role,
            iat: now.timestamp(),
            exp: now.timestamp() + SESSION_TTL_SECONDS,
        };

        let header_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header)?);
        let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&claims)?);
        let message = format!("{header_b64}.{claims_b64}");

        let signature = self.mac().chain_update(message.as_bytes()).finalize();
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature.into_bytes());

        Ok(format!("{message}.{signature_b64}"))
    }

    /// Verify signature and expiry, returning the embedded claims.
    ///
    /// # Errors
    /// [`TokenError::Signature`] for a forged or foreign-secret token,
    /// [`TokenError::Expired`] once `now` passes the expiry, and format
    /// errors for anything that is not a well-formed token.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::TokenFormat);
        };

        let header_bytes =
            Base64UrlUnpadded::decode_vec(header_b64).map_err(|_| TokenError::Base64)?;
        let header: SessionTokenHeader = serde_json::from_slice(&header_bytes)?;
        if header.alg != "HS256" {
            return Err(TokenError::Algorithm);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| TokenError::Base64)?;
        let message = format!("{header_b64}.{claims_b64}");
        self.mac()
            .chain_update(message.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| TokenError::Signature)?;

        let claims_bytes =
            Base64UrlUnpadded::decode_vec(claims_b64).map_err(|_| TokenError::Base64)?;
        let claims: SessionClaims = serde_json::from_slice(&claims_bytes)?;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self) -> HmacSha256 {
        // Hmac accepts keys of any length, new_from_slice cannot fail here
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}
