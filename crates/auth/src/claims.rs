//! Read timing claims out of a bearer token.
//!
//! The console does not hold the signing key; the server remains the
//! authority. Claims only schedule renewal; the signature is not checked here.

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Expiration, epoch seconds.
    #[serde(default)]
    pub exp: Option<i64>,

    /// Issued-at, epoch seconds.
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|s| DateTime::from_timestamp(s, 0))
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|s| DateTime::from_timestamp(s, 0))
    }
}

/// Peek at the `exp`/`iat` claims of a JWT. Returns `None` for opaque tokens.
pub fn peek_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match jsonwebtoken::decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => Some(data.claims),
        Err(err) => {
            tracing::debug!("token claims unavailable: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    #[test]
    fn reads_exp_and_iat_without_the_key() {
        let token = jsonwebtoken::encode(
            &Header::default(),
            &json!({"sub": "1", "iat": 1_700_000_000, "exp": 1_700_003_600}),
            &EncodingKey::from_secret(b"server-only"),
        )
        .unwrap();

        let claims = peek_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_003_600));
        assert_eq!(
            claims.issued_at(),
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn opaque_tokens_have_no_claims() {
        assert_eq!(peek_claims("not-a-jwt"), None);
    }
}
