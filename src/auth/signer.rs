/// JWT Token Signing and Verification
///
/// Seals claims with HS256 under the configured secret and checks them back.
/// Expiry is reported separately from every other failure so the rotation
/// flow can accept a genuine but expired access token.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenSubject};
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError};

/// Why a token failed verification
#[derive(Error, Debug)]
pub enum TokenError {
    /// Signature, issuer and audience are fine; only the lifetime has passed.
    /// Carries the verified claims.
    #[error("Token has expired")]
    Expired(Box<Claims>),
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

pub struct Signer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
}

impl Signer {
    /// Build a signer from the JWT settings
    ///
    /// # Errors
    /// Returns `ConfigError` if the secret, issuer or audience is missing
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        // Expiry is checked in `verify` so it can be told apart from tampering
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        })
    }

    /// Sign an access token for `subject` that lives for `ttl`
    ///
    /// A fresh `jti` is generated for every call.
    ///
    /// # Errors
    /// Returns `Internal` if encoding fails
    pub fn sign(&self, subject: &TokenSubject, ttl: Duration) -> Result<SignedToken, AppError> {
        let issued_at = Utc::now().timestamp();
        let expires_at = issued_at + ttl.num_seconds();
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: subject.user_id.to_string(),
            username: subject.username.clone(),
            email: subject.email.clone(),
            jti: jti.clone(),
            roles: subject.roles.clone(),
            iat: issued_at,
            exp: expires_at,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        let expires_at = Utc
            .timestamp_opt(expires_at, 0)
            .single()
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

        Ok(SignedToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Check signature, issuer, audience and expiry
    ///
    /// # Errors
    /// - `Expired` if only the expiry check fails
    /// - `Invalid` for anything else (bad signature, malformed payload,
    ///   issuer or audience mismatch)
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                TokenError::Invalid(e.to_string())
            })?;

        if claims.is_expired() {
            return Err(TokenError::Expired(Box::new(claims)));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> JwtSettings {
        JwtSettings::new(
            "test-secret-key-at-least-32-characters-long",
            "test",
            "test-api",
        )
    }

    fn test_subject() -> TokenSubject {
        TokenSubject {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            roles: vec!["Admin".to_string(), "User".to_string()],
        }
    }

    fn replace_char(token: &str, index: usize) -> String {
        token
            .char_indices()
            .map(|(i, c)| {
                if i != index {
                    c
                } else if c == 'A' {
                    'B'
                } else {
                    'A'
                }
            })
            .collect()
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let signer = Signer::new(&get_test_config()).unwrap();
        let subject = test_subject();

        let signed = signer.sign(&subject, Duration::minutes(5)).expect("Failed to sign");
        let claims = signer.verify(&signed.token).expect("Failed to verify");

        assert_eq!(claims.subject().unwrap(), subject);
        assert_eq!(claims.jti, signed.jti);
        assert_eq!(claims.exp, signed.expires_at.timestamp());
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.aud, "test-api");
    }

    #[test]
    fn test_each_signature_gets_a_new_jti() {
        let signer = Signer::new(&get_test_config()).unwrap();
        let subject = test_subject();

        let first = signer.sign(&subject, Duration::minutes(5)).unwrap();
        let second = signer.sign(&subject, Duration::minutes(5)).unwrap();

        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_zero_ttl_is_expired_not_invalid() {
        let signer = Signer::new(&get_test_config()).unwrap();
        let subject = test_subject();

        let signed = signer.sign(&subject, Duration::zero()).unwrap();

        match signer.verify(&signed.token) {
            Err(TokenError::Expired(claims)) => assert_eq!(claims.subject().unwrap(), subject),
            other => panic!("Expected Expired, got {:?}", other),
        }
    }

    #[test]
    fn test_past_expiry_is_expired() {
        let signer = Signer::new(&get_test_config()).unwrap();

        let signed = signer.sign(&test_subject(), Duration::hours(-1)).unwrap();

        assert!(matches!(signer.verify(&signed.token), Err(TokenError::Expired(_))));
    }

    #[test]
    fn test_tampering_anywhere_is_invalid() {
        let signer = Signer::new(&get_test_config()).unwrap();

        // Expired tokens too: tampering must never be reported as expiry
        for ttl in [Duration::minutes(5), Duration::zero()] {
            let token = signer.sign(&test_subject(), ttl).unwrap().token;

            for (index, c) in token.char_indices() {
                if c == '.' {
                    continue;
                }
                let tampered = replace_char(&token, index);
                assert!(
                    matches!(signer.verify(&tampered), Err(TokenError::Invalid(_))),
                    "Tampering at position {} was not rejected as invalid",
                    index
                );
            }
        }
    }

    #[test]
    fn test_invalid_token() {
        let signer = Signer::new(&get_test_config()).unwrap();

        assert!(matches!(
            signer.verify("invalid.token.here"),
            Err(TokenError::Invalid(_))
        ));
        assert!(matches!(signer.verify(""), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = get_test_config();
        let token = Signer::new(&config)
            .unwrap()
            .sign(&test_subject(), Duration::minutes(5))
            .unwrap()
            .token;

        config.issuer = "wrong-issuer".to_string();
        let result = Signer::new(&config).unwrap().verify(&token);

        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_wrong_audience() {
        let mut config = get_test_config();
        let token = Signer::new(&config)
            .unwrap()
            .sign(&test_subject(), Duration::minutes(5))
            .unwrap()
            .token;

        config.audience = "another-api".to_string();
        let result = Signer::new(&config).unwrap().verify(&token);

        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let mut config = get_test_config();
        let token = Signer::new(&config)
            .unwrap()
            .sign(&test_subject(), Duration::zero())
            .unwrap()
            .token;

        config.secret = "a-completely-different-secret-value".to_string();
        let result = Signer::new(&config).unwrap().verify(&token);

        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_empty_secret_is_config_error() {
        let mut config = get_test_config();
        config.secret = String::new();

        assert!(matches!(
            Signer::new(&config),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
