//! JWT decoding and signature verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token decoding failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a bearer token and yields its claims.
///
/// Trait boundary so the HTTP layer stays independent of the signing scheme
/// and tests can substitute a permissive validator.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// HS256 shared-secret validator.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is enforced by validate_claims against our own timestamp
        // claims, so the registered exp/iat claims are not required.
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| JwtError::Decode(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use farmstock_core::TenantId;

    use crate::{PrincipalId, Role};

    const SECRET: &[u8] = b"test-secret";

    fn mint(claims: &JwtClaims, secret: &[u8]) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn valid_claims() -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("admin")],
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn round_trips_a_valid_token() {
        let claims = valid_claims();
        let token = mint(&claims, SECRET);

        let validator = Hs256JwtValidator::new(SECRET);
        let decoded = validator.validate(&token, Utc::now()).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint(&valid_claims(), b"other-secret");

        let validator = Hs256JwtValidator::new(SECRET);
        assert!(matches!(
            validator.validate(&token, Utc::now()),
            Err(JwtError::Decode(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let claims = JwtClaims {
            expires_at: now - Duration::minutes(1),
            issued_at: now - Duration::hours(1),
            ..valid_claims()
        };
        let token = mint(&claims, SECRET);

        let validator = Hs256JwtValidator::new(SECRET);
        assert!(matches!(
            validator.validate(&token, Utc::now()),
            Err(JwtError::Claims(TokenValidationError::Expired))
        ));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let validator = Hs256JwtValidator::new(SECRET);
        assert!(matches!(
            validator.validate("not.a.token", Utc::now()),
            Err(JwtError::Decode(_))
        ));
    }
}
