//! Password hashing and session tokens.

use std::time::Duration;

use applink_types::UserSession;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn hasher() -> Argon2<'static> {
    // Minimum cost under test; verification reads the cost from the hash.
    #[cfg(test)]
    let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None).unwrap_or_default();
    #[cfg(not(test))]
    let params = Params::default();
    Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, params)
}

/// Argon2id PHC string (`$argon2id$v=19$...`) with a random salt.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())?;
    Ok(hasher().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Check `password` against a value produced by [`hash_password`].
/// Malformed hashes never verify.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(encoded) else {
        return false;
    };
    hasher().verify_password(password.as_bytes(), &parsed).is_ok()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user(&self) -> UserSession {
        UserSession {
            id: self.sub.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// HS256 token issuer / verifier.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user: &UserSession) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn user() -> UserSession {
        UserSession {
            id: "u1".into(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
        }
    }

    #[test]
    fn password_hash_verifies_only_the_right_password() {
        let hash = hash_password("analytical").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(verify_password("analytical", &hash));
        assert!(!verify_password("analyticaI", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn malformed_hash_never_verifies() {
        for bad in ["", "plain", "$argon2id$v=19$garbage", "sha256$10000$AAAA$AAAA", "$md5$AAAA$AAAA"] {
            assert!(!verify_password("anything", bad), "{bad}");
        }
    }

    #[test]
    fn token_round_trip() {
        let keys = TokenKeys::new("secret", Duration::from_secs(3600));
        let token = keys.issue(&user()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user(), user());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenKeys::new("one", Duration::from_secs(60)).issue(&user()).unwrap();
        assert!(TokenKeys::new("two", Duration::from_secs(60)).verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new("secret", Duration::from_secs(0));
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "u1".into(),
            email: "a@b.co".into(),
            name: "A".into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }
}
