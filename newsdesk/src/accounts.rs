use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Public view of an account (the password hash never leaves this module)
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// JWT claims we encode (subject = user id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

/// Issues and verifies HS256 session tokens
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_hours: u64,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl_hours: u64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl_hours,
        }
    }

    /// Create a signed JWT for a user, expiring after the configured TTL.
    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = Utc::now().timestamp() as usize + (self.ttl_hours as usize * 3600);
        self.sign(&Claims {
            sub: user.id,
            username: user.username.clone(),
            exp,
        })
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

/// Hash a password with Argon2 and a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("accounts: invalid password hash in db: {}", e);
            false
        }
    }
}

/// Create an account. Returns `None` when the username or email is already taken.
pub async fn register_user(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password: &str,
) -> Result<Option<User>> {
    let username = username.trim();
    let email = email.trim().to_lowercase();

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ? OR username = ?")
        .bind(&email)
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("failed to check existing user")?;

    if existing.is_some() {
        return Ok(None);
    }

    let password_hash = hash_password(password)?;

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(username)
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(pool)
    .await
    .context("failed to insert user")?;

    info!("accounts: registered user {} ({})", username, id);
    Ok(Some(User {
        id,
        username: username.to_string(),
        email,
    }))
}

/// Check credentials. Returns `None` for an unknown email or a wrong password.
pub async fn authenticate(pool: &SqlitePool, email: &str, password: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password_hash FROM users WHERE email = ?",
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(pool)
    .await
    .context("failed to fetch user")?;

    let Some(row) = row else {
        return Ok(None);
    };

    if !verify_password(password, &row.password_hash) {
        return Ok(None);
    }

    Ok(Some(User {
        id: row.id,
        username: row.username,
        email: row.email,
    }))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
}
