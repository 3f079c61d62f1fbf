//! SQLite-backed implementations of the local collaborator traits.
//!
//! One connection per process; all vault mutations serialize through it,
//! so no coordination beyond SQLite's own transaction guarantees is
//! needed.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use vaultx_common::{Error, Result, Username};

use crate::records::{RecordStore, StoredRecord, TITLE_PLACEHOLDER};
use crate::users::{UserProfile, UserStore};

/// Key of the user index entry in the params table.
const USERS_KEY: &str = "users";

/// Local store over a single SQLite database.
///
/// Holds both the encrypted record table and the params table carrying
/// the user index and per-user `salt_<username>` / `verifier_<username>`
/// entries. Those key names are an external interface; they are only
/// ever touched through the owner-scoped trait methods.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open the vault database at the given path.
    ///
    /// # Errors
    /// - Database creation or schema migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(storage_err)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS secrets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                title TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER DEFAULT (unixepoch())
            );

            CREATE TABLE IF NOT EXISTS params (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_secrets_username ON secrets(username);
            "#,
        )
        .map_err(storage_err)?;

        info!("Vault database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("Database connection poisoned".to_string()))
    }

    fn get_param(conn: &Connection, key: &str) -> Result<Option<String>> {
        conn.query_row(
            "SELECT value FROM params WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)
    }

    fn set_param(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO params (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn read_user_index(conn: &Connection) -> Result<Vec<Username>> {
        let Some(raw) = Self::get_param(conn, USERS_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        title: row.get(2)?,
        data: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, username: &Username, data: &str) -> Result<StoredRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO secrets (username, title, data) VALUES (?1, ?2, ?3)",
            params![username.as_str(), TITLE_PLACEHOLDER, data],
        )
        .map_err(storage_err)?;

        let id = conn.last_insert_rowid();
        debug!(user = %username, id, "Inserted encrypted record");

        conn.query_row(
            "SELECT id, username, title, data, created_at FROM secrets WHERE id = ?1",
            [id],
            row_to_record,
        )
        .map_err(storage_err)
    }

    async fn get(&self, username: &Username, id: i64) -> Result<Option<StoredRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, title, data, created_at FROM secrets \
             WHERE id = ?1 AND username = ?2",
            params![id, username.as_str()],
            row_to_record,
        )
        .optional()
        .map_err(storage_err)
    }

    async fn list(&self, username: &Username) -> Result<Vec<StoredRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, username, title, data, created_at FROM secrets WHERE username = ?1",
            )
            .map_err(storage_err)?;

        let rows = stmt
            .query_map([username.as_str()], row_to_record)
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    async fn update(&self, username: &Username, id: i64, data: &str) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "UPDATE secrets SET data = ?1 WHERE id = ?2 AND username = ?3",
                params![data, id, username.as_str()],
            )
            .map_err(storage_err)?;
        Ok(affected > 0)
    }

    async fn delete(&self, username: &Username, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "DELETE FROM secrets WHERE id = ?1 AND username = ?2",
                params![id, username.as_str()],
            )
            .map_err(storage_err)?;
        Ok(affected > 0)
    }

    async fn replace_all(&self, username: &Username, rows: &[String]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_err)?;

        tx.execute(
            "DELETE FROM secrets WHERE username = ?1",
            [username.as_str()],
        )
        .map_err(storage_err)?;

        for data in rows {
            tx.execute(
                "INSERT INTO secrets (username, title, data) VALUES (?1, ?2, ?3)",
                params![username.as_str(), TITLE_PLACEHOLDER, data],
            )
            .map_err(storage_err)?;
        }

        tx.commit().map_err(storage_err)?;
        info!(user = %username, count = rows.len(), "Replaced record set");
        Ok(rows.len())
    }

    async fn purge_all(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM secrets", [])
            .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn list_users(&self) -> Result<Vec<Username>> {
        let conn = self.conn()?;
        Self::read_user_index(&conn)
    }

    async fn load_profile(&self, username: &Username) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;

        let salt = Self::get_param(&conn, &format!("salt_{}", username))?;
        let verifier = Self::get_param(&conn, &format!("verifier_{}", username))?;

        match (salt, verifier) {
            (Some(salt), Some(verifier)) => {
                let salt = vaultx_crypto::Salt::decode(&salt)?;
                Ok(Some(UserProfile { salt, verifier }))
            }
            _ => Ok(None),
        }
    }

    async fn save_profile(&self, username: &Username, profile: &UserProfile) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_err)?;

        let mut index = Self::read_user_index(&tx)?;
        if !index.contains(username) {
            index.push(username.clone());
        }
        let index_json =
            serde_json::to_string(&index).map_err(|e| Error::Serialization(e.to_string()))?;

        Self::set_param(&tx, &format!("salt_{}", username), &profile.salt.encode())?;
        Self::set_param(&tx, &format!("verifier_{}", username), &profile.verifier)?;
        Self::set_param(&tx, USERS_KEY, &index_json)?;

        tx.commit().map_err(storage_err)?;
        info!(user = %username, "Saved user profile");
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM params", [])
            .map_err(storage_err)?;
        Ok(())
    }
}
