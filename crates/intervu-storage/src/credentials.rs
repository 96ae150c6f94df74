//! Caller identity for upload and analysis requests.
//!
//! A request is only sent when a usable bearer credential is available. JWT
//! credentials are decoded (without signature verification, which is the
//! server's job) so that an expired token fails locally instead of costing a
//! round trip.

use std::collections::HashSet;

use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Source of the caller's bearer credential.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Current credential, if the caller is signed in.
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed credential, typically read from `INTERVU_AUTH_TOKEN`.
#[derive(Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// No credential at all.
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn from_env() -> Self {
        Self {
            token: std::env::var("INTERVU_AUTH_TOKEN").ok(),
        }
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Resolve a usable bearer token or fail with `Unauthenticated`.
pub fn require_bearer(provider: &dyn CredentialProvider) -> StorageResult<String> {
    let token = provider
        .bearer_token()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StorageError::unauthenticated("no credential available"))?;

    // Opaque tokens are passed through as-is.
    let Ok(header) = decode_header(&token) else {
        return Ok(token);
    };

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    match decode::<serde_json::Value>(&token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(_) => Ok(token),
        Err(e) => {
            debug!(error = %e, "Rejecting bearer credential");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(StorageError::unauthenticated("credential has expired"))
                }
                _ => Err(StorageError::unauthenticated(format!(
                    "credential is not a valid token: {}",
                    e
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn jwt(exp_offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
        encode(
            &Header::default(),
            &json!({ "sub": "user-1", "exp": exp }),
            &EncodingKey::from_secret(b"server-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_credential_is_unauthenticated() {
        let mut provider = MockCredentialProvider::new();
        provider.expect_bearer_token().returning(|| None);

        let err = require_bearer(&provider).unwrap_err();
        assert!(matches!(err, StorageError::Unauthenticated(_)));
    }

    #[test]
    fn test_blank_credential_is_unauthenticated() {
        let provider = StaticCredential::new("   ");
        assert!(matches!(
            require_bearer(&provider),
            Err(StorageError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_opaque_token_accepted() {
        let provider = StaticCredential::new("opaque-session-token");
        assert_eq!(require_bearer(&provider).unwrap(), "opaque-session-token");
    }

    #[test]
    fn test_valid_jwt_accepted() {
        let token = jwt(3600);
        let provider = StaticCredential::new(token.clone());
        assert_eq!(require_bearer(&provider).unwrap(), token);
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let provider = StaticCredential::new(jwt(-3600));
        let err = require_bearer(&provider).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let provider = StaticCredential::new("secret-token");
        assert!(!format!("{:?}", provider).contains("secret-token"));
    }
}
