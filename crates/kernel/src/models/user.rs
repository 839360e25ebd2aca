//! User accounts and API token auth.
//!
//! Tokens are random 32-byte values handed to the caller once; only the
//! SHA-256 hex digest is stored.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// A user account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub mail: String,
    /// 1 = active, 0 = blocked.
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            "SELECT id, name, mail, status, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user")?;

        Ok(row)
    }

    /// Resolve a raw bearer token to its user, if any.
    pub async fn find_by_api_token(pool: &PgPool, token: &str) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r"
            SELECT id, name, mail, status, created_at
            FROM users
            WHERE api_token = $1
            ",
        )
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await
        .context("failed to look up api token")?;

        Ok(row)
    }

    /// Generate and store a fresh API token, returning the raw value.
    /// Any previous token is replaced.
    pub async fn issue_api_token(pool: &PgPool, user_id: Uuid) -> Result<String> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        sqlx::query("UPDATE users SET api_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(hash_token(&token))
            .execute(pool)
            .await
            .context("failed to store api token")?;

        Ok(token)
    }

    /// IDs of active users holding a role.
    pub async fn ids_with_role(pool: &PgPool, role: &str) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r"
            SELECT u.id
            FROM users u
            JOIN user_roles ur ON ur.user_id = u.id
            WHERE ur.role = $1 AND u.status = 1
            ORDER BY u.id
            ",
        )
        .bind(role)
        .fetch_all(pool)
        .await
        .context("failed to list users with role")?;

        Ok(ids)
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_hex() {
        let a = hash_token("abc");
        let b = hash_token("abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_token("abd"));
    }

    #[test]
    fn blocked_user_is_not_active() {
        let user = User {
            id: Uuid::now_v7(),
            name: "sam".into(),
            mail: "sam@example.com".into(),
            status: 0,
            created_at: Utc::now(),
        };
        assert!(!user.is_active());
    }
}
