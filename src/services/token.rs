//! Bearer token verification.
//!
//! Tokens are HS256 JWTs carrying `{ "userID": <uuid>, "exp": <unix secs> }`.
//! Issuing happens in the auth service; this side only checks signature,
//! expiry, and that the remaining lifetime is within the configured window.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Clock skew tolerated on the lifetime ceiling.
const LIFETIME_LEEWAY_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is not a user id")]
    BadSubject,
    #[error("token lifetime exceeds {max_secs}s")]
    LifetimeTooLong { max_secs: i64 },
}

pub trait TokenService: Send + Sync {
    /// Return the user id a valid token was issued for.
    ///
    /// # Errors
    ///
    /// `Invalid` for bad signatures, malformed or expired tokens.
    /// `BadSubject` when the `userID` claim is empty or not a UUID.
    /// `LifetimeTooLong` when `exp` lies further out than the configured window.
    fn verify(&self, token: &str) -> Result<Uuid, TokenError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "userID")]
    user_id: String,
    exp: i64,
}

pub struct JwtTokenService {
    decoding: DecodingKey,
    max_lifetime_secs: i64,
    #[cfg(test)]
    encoding: jsonwebtoken::EncodingKey,
}

impl JwtTokenService {
    /// `expiration_hours` is the longest lifetime a token may still have
    /// when presented.
    #[must_use]
    pub fn new(secret: &[u8], expiration_hours: u64) -> Self {
        let max_lifetime_secs = i64::try_from(expiration_hours.saturating_mul(3600)).unwrap_or(i64::MAX);
        Self {
            decoding: DecodingKey::from_secret(secret),
            max_lifetime_secs,
            #[cfg(test)]
            encoding: jsonwebtoken::EncodingKey::from_secret(secret),
        }
    }
}

impl TokenService for JwtTokenService {
    fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        let Claims { user_id, exp } = data.claims;

        let ceiling = OffsetDateTime::now_utc()
            .unix_timestamp()
            .saturating_add(self.max_lifetime_secs)
            .saturating_add(LIFETIME_LEEWAY_SECS);
        if exp > ceiling {
            return Err(TokenError::LifetimeTooLong { max_secs: self.max_lifetime_secs });
        }

        if user_id.is_empty() {
            return Err(TokenError::BadSubject);
        }
        Uuid::parse_str(&user_id).map_err(|_| TokenError::BadSubject)
    }
}

#[cfg(test)]
impl JwtTokenService {
    pub fn issue(&self, user_id: String, exp: i64) -> Result<String, TokenError> {
        use jsonwebtoken::{Header, encode};

        let claims = Claims { user_id, exp };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Token for `user_id` expiring at the end of the allowed window.
    pub fn generate(&self, user_id: Uuid) -> Result<String, TokenError> {
        let exp = OffsetDateTime::now_utc().unix_timestamp().saturating_add(self.max_lifetime_secs);
        self.issue(user_id.to_string(), exp)
    }
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
