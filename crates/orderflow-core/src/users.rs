//! User service: registration, login and bearer tokens
//!
//! Passwords hash with bcrypt; tokens are HS256 JWTs carrying
//! `{sub: userId, exp}` with a 60 minute default expiry. Every service
//! validates the same token.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::envelope::{EventKind, PartitionKey, Topics};
use crate::bus::payloads::UserRegisteredPayload;
use crate::cache::{Cache, CacheKeys};
use crate::config::AuthConfig;
use crate::models::{LoginRequest, RegisterRequest, Token, User, UserResponse};
use crate::outbox::{OutboxEvent, OutboxRepository};
use crate::repository::Database;
use crate::{Error, Result};

const USER_CACHE_TTL: u64 = 300;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid,
    pub exp: i64,
}

pub struct AuthService {
    db: Database,
    cache: Cache,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: Database, cache: Cache, config: AuthConfig) -> Self {
        Self { db, cache, config }
    }

    /// Register a new user and emit `user.registered`
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse> {
        use validator::Validate;
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&request.email)
            .fetch_optional(self.db.pool())
            .await?;

        if existing.is_some() {
            return Err(Error::validation("Email already registered"));
        }

        let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
            .map_err(|e| Error::Other(format!("Failed to hash password: {}", e)))?;

        let mut tx = self.db.pool().begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, name)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&password_hash)
        .bind(&request.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            // A racing registration can beat the pre-check to the unique index
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::validation("Email already registered")
            }
            _ => Error::Database(e),
        })?;

        let event = OutboxEvent::new(
            "user",
            &user.id.to_string(),
            EventKind::UserRegistered.as_str(),
            serde_json::to_value(UserRegisteredPayload {
                user_id: user.id,
                email: user.email.clone(),
                name: user.name.clone(),
            })?,
            Topics::USERS,
            &PartitionKey::user(user.id),
        );
        OutboxRepository::insert(&mut tx, &event).await?;

        tx.commit().await?;

        tracing::info!("User registered: {}", user.email);
        Ok(UserResponse::from(user))
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, request: LoginRequest) -> Result<Token> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(&request.email)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| Error::unauthorized("Invalid credentials"))?;

        let valid = bcrypt::verify(&request.password, &user.password_hash)
            .map_err(|e| Error::Other(format!("Failed to verify password: {}", e)))?;

        if !valid {
            return Err(Error::unauthorized("Invalid credentials"));
        }

        let access_token = self.create_access_token(user.id)?;

        Ok(Token {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.config.jwt_expiration_minutes * 60,
        })
    }

    /// Look up the current user
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserResponse> {
        let cache_key = CacheKeys::user(user_id);
        if let Some(cached) = self.cache.get_json::<UserResponse>(&cache_key).await? {
            return Ok(cached);
        }

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| Error::unauthorized("User not found"))?;

        let response = UserResponse::from(user);
        self.cache.set_json(&cache_key, &response, USER_CACHE_TTL).await?;
        Ok(response)
    }

    /// Sign a token for a user
    pub fn create_access_token(&self, user_id: Uuid) -> Result<String> {
        let expiry = Utc::now() + Duration::minutes(self.config.jwt_expiration_minutes);
        let claims = JwtClaims {
            sub: user_id,
            exp: expiry.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Other(format!("Failed to sign token: {}", e)))
    }

    /// Validate a bearer token and return the subject
    pub fn decode_token(&self, token: &str) -> Result<Uuid> {
        decode_token(token, &self.config.jwt_secret)
    }
}

/// Validate a bearer token against a shared secret
pub fn decode_token(token: &str, secret: &str) -> Result<Uuid> {
    let data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| Error::unauthorized("Could not validate credentials"))?;

    Ok(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_algorithm: "HS256".to_string(),
            jwt_expiration_minutes: 60,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let config = auth_config();
        let user_id = Uuid::new_v4();

        let expiry = Utc::now() + Duration::minutes(config.jwt_expiration_minutes);
        let claims = JwtClaims {
            sub: user_id,
            exp: expiry.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert_eq!(decode_token(&token, &config.jwt_secret).unwrap(), user_id);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = auth_config();
        let claims = JwtClaims {
            sub: Uuid::new_v4(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(decode_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = auth_config();
        let claims = JwtClaims {
            sub: Uuid::new_v4(),
            exp: (Utc::now() - Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(decode_token(&token, &config.jwt_secret).is_err());
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = bcrypt::hash("test_password_123", 4).unwrap();
        assert!(bcrypt::verify("test_password_123", &hash).unwrap());
        assert!(!bcrypt::verify("wrong_password", &hash).unwrap());
    }
}
