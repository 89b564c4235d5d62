//! RS256 token issuance and RSA-only verification.
//!
//! The key pair is loaded once at startup and never rotated. Verification
//! decodes the header itself before handing the token to `jsonwebtoken`, so a
//! token announcing any non-RSA algorithm (`HS256`, `none`, ...) is rejected as
//! `UnsupportedAlgorithm` before a key is ever involved.

use super::models::{Identity, User};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub const TOKEN_TTL_HOURS: i64 = 24;

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid key: {0}")]
    Key(String),
    #[error("token signing failed")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub email: String,
    pub role: String,
    pub user_id: String,
}

impl Claims {
    /// Identity carried by the token.
    ///
    /// # Errors
    /// Returns `TokenError::Malformed` if the subject is not a UUID.
    pub fn identity(&self) -> Result<Identity, TokenError> {
        let id = Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)?;
        Ok(Identity {
            id,
            email: self.email.clone(),
            role: self.role.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Read the `alg` of a compact JWS and accept only the RSA family.
fn header_algorithm(token: &str) -> Result<Algorithm, TokenError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().unwrap_or_default();
    let (Some(_), Some(_), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TokenError::Malformed);
    };

    let bytes = Base64UrlUnpadded::decode_vec(header_b64).map_err(|_| TokenError::Malformed)?;
    let header: RawHeader = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    match header.alg.parse::<Algorithm>() {
        Ok(alg) if RSA_ALGORITHMS.contains(&alg) => Ok(alg),
        _ => Err(TokenError::UnsupportedAlgorithm(header.alg)),
    }
}

/// Verify a token against an RSA public key and return its claims.
///
/// Checks run in order: structure, algorithm, signature, expiry (no leeway).
///
/// # Errors
/// Returns the `TokenError` of the first failing check.
pub fn verify_token(token: &str, public_key: &DecodingKey) -> Result<Claims, TokenError> {
    let algorithm = header_algorithm(token)?;

    let mut validation = Validation::new(algorithm);
    validation.leeway = 0;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    jsonwebtoken::decode::<Claims>(token, public_key, &validation)
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidAlgorithm => {
                TokenError::UnsupportedAlgorithm(format!("{algorithm:?}"))
            }
            _ => TokenError::Malformed,
        })
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, TokenError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|_| TokenError::Key("failed to parse RSA public key".to_string()))
}

/// Signs and verifies identity tokens with a fixed RSA key pair.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: Jwk,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("kid", &self.jwk.kid)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build the service from PEM encoded keys (PKCS#8 or PKCS#1).
    ///
    /// A sign/verify probe makes sure both halves belong to the same pair.
    ///
    /// # Errors
    /// Returns `TokenError::Key` if a key cannot be parsed or the keys do not match.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, TokenError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| TokenError::Key(format!("failed to parse RSA private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| TokenError::Key(format!("failed to parse RSA public key: {e}")))?;

        let public_pem = std::str::from_utf8(public_pem)
            .map_err(|_| TokenError::Key("RSA public key is not valid UTF-8".to_string()))?;
        let public_key = parse_public_key(public_pem)?;

        let modulus = public_key.n().to_bytes_be();
        let digest = Sha256::digest(&modulus);
        let kid: String = Base64UrlUnpadded::encode_string(&digest)
            .chars()
            .take(16)
            .collect();

        let service = Self {
            encoding,
            decoding,
            jwk: Jwk {
                kty: "RSA".to_string(),
                alg: "RS256".to_string(),
                key_use: "sig".to_string(),
                kid,
                n: Base64UrlUnpadded::encode_string(&modulus),
                e: Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be()),
            },
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        };

        service.probe()?;

        Ok(service)
    }

    fn probe(&self) -> Result<(), TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::nil().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(1)).timestamp(),
            email: String::new(),
            role: String::new(),
            user_id: Uuid::nil().to_string(),
        };
        let token = self.sign(&claims)?;
        self.verify(&token)
            .map(|_| ())
            .map_err(|_| TokenError::Key("RSA private and public keys do not match".to_string()))
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.jwk.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding).map_err(TokenError::Signing)
    }

    /// Issue a token for the user, valid for 24 hours from now.
    ///
    /// # Errors
    /// Returns `TokenError::Signing` if signing fails.
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    /// Returns `TokenError::Signing` if signing fails.
    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user.id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            email: user.email.clone(),
            role: user.role.name.clone(),
            user_id: user.id.to_string(),
        };
        self.sign(&claims)
    }

    /// Verify a token with this service's public key.
    ///
    /// # Errors
    /// See [`verify_token`].
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        verify_token(token, &self.decoding)
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.jwk.kid
    }

    /// Public key in JWKS form for downstream verifiers.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.jwk.clone()],
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sso::models::Role;
    use anyhow::Result;

    pub(crate) const PRIVATE_KEY_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/rsa_private.pem"
    ));
    pub(crate) const PUBLIC_KEY_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/rsa_public.pem"
    ));
    const OTHER_PRIVATE_KEY_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/other_rsa_private.pem"
    ));
    const OTHER_PUBLIC_KEY_PEM: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/other_rsa_public.pem"
    ));

    pub(crate) fn test_service() -> Result<TokenService> {
        Ok(TokenService::from_pem(
            PRIVATE_KEY_PEM.as_bytes(),
            PUBLIC_KEY_PEM.as_bytes(),
        )?)
    }

    fn user(role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            password_hash: String::new(),
            role: Role {
                id: Uuid::new_v4(),
                name: role.to_string(),
                permissions: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn unsigned_token(header: &str, claims: &Claims) -> Result<String> {
        let header = Base64UrlUnpadded::encode_string(header.as_bytes());
        let payload = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims)?);
        Ok(format!("{header}.{payload}."))
    }

    fn sample_claims() -> Claims {
        let now = Utc::now();
        Claims {
            sub: Uuid::new_v4().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
            email: "a@x.com".to_string(),
            role: "Administrator".to_string(),
            user_id: Uuid::new_v4().to_string(),
        }
    }

    #[test]
    fn issue_and_verify_round_trip() -> Result<()> {
        let service = test_service()?;
        let user = user("Reader");

        let token = service.issue(&user)?;
        let claims = service.verify(&token)?;

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.user_id, user.id.to_string());
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, "Reader");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_HOURS * 3600);
        assert_eq!(claims.identity()?.id, user.id);
        Ok(())
    }

    #[test]
    fn token_header_carries_kid() -> Result<()> {
        let service = test_service()?;
        let token = service.issue(&user("Reader"))?;
        let header = jsonwebtoken::decode_header(&token)?;
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(service.kid()));
        Ok(())
    }

    #[test]
    fn fresh_jti_per_token() -> Result<()> {
        let service = test_service()?;
        let user = user("Reader");
        let first = service.verify(&service.issue(&user)?)?;
        let second = service.verify(&service.issue(&user)?)?;
        assert_ne!(first.jti, second.jti);
        Ok(())
    }

    #[test]
    fn token_valid_until_expiry() -> Result<()> {
        let service = test_service()?;
        let user = user("Editor");

        let token = service.issue_at(&user, Utc::now() - Duration::hours(23))?;
        assert_eq!(service.verify(&token)?.role, "Editor");

        let token = service.issue_at(&user, Utc::now() - Duration::hours(25))?;
        assert!(matches!(service.verify(&token), Err(TokenError::Expired)));
        Ok(())
    }

    #[test]
    fn rejects_hs256_token() -> Result<()> {
        let service = test_service()?;
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &sample_claims(),
            &EncodingKey::from_secret(PUBLIC_KEY_PEM.as_bytes()),
        )?;
        assert!(matches!(
            service.verify(&token),
            Err(TokenError::UnsupportedAlgorithm(alg)) if alg == "HS256"
        ));
        Ok(())
    }

    #[test]
    fn rejects_none_algorithm() -> Result<()> {
        let service = test_service()?;
        for header in [r#"{"alg":"none","typ":"JWT"}"#, r#"{"alg":"None"}"#] {
            let token = unsigned_token(header, &sample_claims())?;
            assert!(
                matches!(
                    service.verify(&token),
                    Err(TokenError::UnsupportedAlgorithm(_))
                ),
                "{header}"
            );
        }
        Ok(())
    }

    #[test]
    fn rejects_token_from_other_key() -> Result<()> {
        let service = test_service()?;
        let other = TokenService::from_pem(
            OTHER_PRIVATE_KEY_PEM.as_bytes(),
            OTHER_PUBLIC_KEY_PEM.as_bytes(),
        )?;
        let token = other.issue(&user("Reader"))?;
        assert!(matches!(
            service.verify(&token),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn tampered_payload_fails_signature() -> Result<()> {
        let service = test_service()?;
        let token = service.issue(&user("Reader"))?;
        let forged = Claims {
            role: "Administrator".to_string(),
            ..service.verify(&token)?
        };
        let forged_payload = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&forged)?);
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_payload;
        assert!(matches!(
            service.verify(&parts.join(".")),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn signature_checked_before_expiry() -> Result<()> {
        let other = TokenService::from_pem(
            OTHER_PRIVATE_KEY_PEM.as_bytes(),
            OTHER_PUBLIC_KEY_PEM.as_bytes(),
        )?;
        let token = other.issue_at(&user("Reader"), Utc::now() - Duration::hours(48))?;
        let service = test_service()?;
        assert!(matches!(
            service.verify(&token),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() -> Result<()> {
        let service = test_service()?;
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig", "e30.e30.sig"] {
            assert!(
                matches!(service.verify(token), Err(TokenError::Malformed)),
                "{token}"
            );
        }
        Ok(())
    }

    #[test]
    fn verify_token_with_explicit_public_key() -> Result<()> {
        let service = test_service()?;
        let token = service.issue(&user("Reader"))?;
        let key = DecodingKey::from_rsa_pem(PUBLIC_KEY_PEM.as_bytes())?;
        assert_eq!(verify_token(&token, &key)?.role, "Reader");

        let other_key = DecodingKey::from_rsa_pem(OTHER_PUBLIC_KEY_PEM.as_bytes())?;
        assert!(matches!(
            verify_token(&token, &other_key),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn mismatched_key_pair_is_rejected() {
        let result = TokenService::from_pem(
            PRIVATE_KEY_PEM.as_bytes(),
            OTHER_PUBLIC_KEY_PEM.as_bytes(),
        );
        assert!(matches!(result, Err(TokenError::Key(_))));
    }

    #[test]
    fn garbage_key_is_rejected() {
        let result = TokenService::from_pem(b"not a key", PUBLIC_KEY_PEM.as_bytes());
        assert!(matches!(result, Err(TokenError::Key(_))));
    }

    #[test]
    fn jwks_exposes_public_key() -> Result<()> {
        let service = test_service()?;
        let jwks = service.jwks();
        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, service.kid());
        assert_eq!(jwk.e, "AQAB");

        let value = serde_json::to_value(&jwks)?;
        assert_eq!(value["keys"][0]["use"], "sig");

        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;
        let token = service.issue(&user("Reader"))?;
        assert_eq!(verify_token(&token, &key)?.email, "a@x.com");
        Ok(())
    }
}
