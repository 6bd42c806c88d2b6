use super::error::{SecurityError, SecurityErrorExt};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use plm_domain::config::JwtConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

const MIN_SECRET_LEN: usize = 16;

/// Registered claims carried by a bearer token. `sub` is the login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: Option<String>,
    ttl_seconds: i64,
}

/// HS256 token issuer/verifier. Cloning shares the keys.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<TokenKeys>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.keys.issuer)
            .field("audience", &self.keys.audience)
            .field("ttl_seconds", &self.keys.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// # Errors
    /// [`SecurityError::InvalidConfiguration`] for a secret shorter than 16 bytes or an
    /// empty issuer.
    pub fn from_config(config: &JwtConfig) -> Result<Self, SecurityError> {
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(SecurityError::InvalidConfiguration {
                message: format!("JWT secret must be at least {MIN_SECRET_LEN} bytes").into(),
                context: Some("security.identity.jwt.secret".into()),
            });
        }
        if config.issuer.trim().is_empty() {
            return Err(SecurityError::InvalidConfiguration {
                message: "JWT issuer must not be empty".into(),
                context: Some("security.identity.jwt.issuer".into()),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = config.clock_skew_seconds;
        match &config.audience {
            Some(aud) => validation.set_audience(&[aud.as_str()]),
            None => validation.validate_aud = false,
        }

        let secret = config.secret.as_bytes();
        Ok(Self {
            keys: Arc::new(TokenKeys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
                validation,
                issuer: config.issuer.clone(),
                audience: config.audience.clone(),
                ttl_seconds: i64::try_from(config.ttl_seconds).unwrap_or(i64::MAX),
            }),
        })
    }

    /// Mints a token for `login`, valid for the configured TTL.
    ///
    /// # Errors
    /// [`SecurityError::InvalidToken`] if encoding fails.
    pub fn issue(&self, login: &str) -> Result<String, SecurityError> {
        let iat = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: login.to_owned(),
            iss: self.keys.issuer.clone(),
            aud: self.keys.audience.clone(),
            iat,
            exp: iat.saturating_add(self.keys.ttl_seconds),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding).context("Encoding token")
    }

    /// # Errors
    /// [`SecurityError::InvalidToken`] for a bad signature, issuer, audience or an expired token.
    #[instrument(level = "debug", skip_all)]
    pub fn verify(&self, token: &str) -> Result<Claims, SecurityError> {
        let data = decode::<Claims>(token, &self.keys.decoding, &self.keys.validation).context("Verifying token")?;
        debug!(sub = %data.claims.sub, "Token verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig { secret: "0123456789abcdef0123".to_owned(), ..JwtConfig::default() }
    }

    #[test]
    fn issued_tokens_verify() {
        let tokens = TokenService::from_config(&config()).unwrap();
        let token = tokens.issue("alice").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, "plm");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let tokens = TokenService::from_config(&config()).unwrap();
        let other = TokenService::from_config(&JwtConfig { secret: "another-secret-of-length".to_owned(), ..config() })
            .unwrap();
        let err = tokens.verify(&other.issue("mallory").unwrap()).unwrap_err();
        assert_eq!(err.kind(), "InvalidToken");
    }

    #[test]
    fn audience_is_enforced() {
        let with_aud = TokenService::from_config(&JwtConfig { audience: Some("plm-api".to_owned()), ..config() }).unwrap();
        let without = TokenService::from_config(&config()).unwrap();
        assert!(with_aud.verify(&with_aud.issue("bob").unwrap()).is_ok());
        assert!(with_aud.verify(&without.issue("bob").unwrap()).is_err());
    }

    #[test]
    fn short_secret_is_a_configuration_error() {
        let err = TokenService::from_config(&JwtConfig { secret: "short".to_owned(), ..config() }).unwrap_err();
        assert_eq!(err.kind(), "InvalidConfiguration");
    }
}
