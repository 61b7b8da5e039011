//! Account rows and CSRF token lookup
use crate::memory_db::schema::User;
use rusqlite::params;
use tracing::info;
use uuid::Uuid;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub struct UserStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl UserStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    fn hash_password(password: &str) -> String {
        blake3::hash(password.as_bytes()).to_hex().to_string()
    }

    pub fn create_user(&self, username: &str, password: &str) -> anyhow::Result<User> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params![username, Self::hash_password(password)],
        )?;
        let id = conn.last_insert_rowid();
        info!("Created user {} ({})", username, id);
        Ok(User { id, username: username.to_string() })
    }

    /// Check credentials; `None` means unknown user or wrong password.
    pub fn verify_login(&self, username: &str, password: &str) -> anyhow::Result<Option<i64>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT id FROM users WHERE username = ?1 AND password_hash = ?2",
            params![username, Self::hash_password(password)],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rotate and return the user's CSRF token. Invalidates any prior token.
    pub fn issue_csrf(&self, user_id: i64) -> anyhow::Result<String> {
        let token = Uuid::new_v4().to_string();
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE users SET csrf = ?1 WHERE id = ?2",
            params![token, user_id],
        )?;
        if updated == 0 {
            return Err(anyhow::anyhow!("User {} not found", user_id));
        }
        Ok(token)
    }

    /// Resolve a CSRF token back to a user id; `None` means unauthenticated.
    pub fn user_id_for_csrf(&self, token: &str) -> anyhow::Result<Option<i64>> {
        if token.is_empty() {
            return Ok(None);
        }
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT id FROM users WHERE csrf = ?1",
            [token],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn username_for_id(&self, user_id: i64) -> anyhow::Result<Option<String>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT username FROM users WHERE id = ?1",
            [user_id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(name) => Ok(Some(name)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
