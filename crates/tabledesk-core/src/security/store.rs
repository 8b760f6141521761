//! Grant storage.
//!
//! Persists access grants in the reserved grant table of the connected
//! database.

use rusqlite::{params, Connection};
use tracing::info;

use super::{AccessGrant, GrantSet, Role};
use crate::error::{Error, Result};
use crate::GRANTS_TABLE;

/// Grant store over a borrowed connection.
pub struct GrantStore<'a> {
    conn: &'a Connection,
}

impl<'a> GrantStore<'a> {
    /// Open the grant store, creating the grant table if needed.
    pub fn open(conn: &'a Connection) -> Result<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{GRANTS_TABLE}\" (
                 subject    TEXT NOT NULL,
                 table_name TEXT NOT NULL,
                 role       TEXT NOT NULL,
                 granted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                 PRIMARY KEY (subject, table_name)
             )"
        ))?;
        Ok(Self { conn })
    }

    /// Save a grant, replacing any grant for the same subject and table.
    pub fn put(&self, grant: &AccessGrant) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO \"{GRANTS_TABLE}\" (subject, table_name, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT (subject, table_name)
                 DO UPDATE SET role = excluded.role, granted_at = CURRENT_TIMESTAMP"
            ),
            params![grant.subject.as_str(), grant.table.as_str(), grant.role.as_str()],
        )?;
        info!(grant = %grant, "Grant stored");
        Ok(())
    }

    /// Remove the grant for a subject and table. Returns whether one existed.
    pub fn remove(&self, subject: &str, table: &str) -> Result<bool> {
        let removed = self.conn.execute(
            &format!("DELETE FROM \"{GRANTS_TABLE}\" WHERE subject = ?1 AND table_name = ?2"),
            params![subject, table],
        )?;
        if removed > 0 {
            info!(subject = %subject, table = %table, "Grant removed");
        }
        Ok(removed > 0)
    }

    /// Load every stored grant, oldest first.
    pub fn list(&self) -> Result<GrantSet> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT subject, table_name, role FROM \"{GRANTS_TABLE}\" ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let grants = rows
            .into_iter()
            .map(|(subject, table, role)| {
                let role: Role = role.parse().map_err(|e| Error::Introspection {
                    table: GRANTS_TABLE.to_string(),
                    reason: format!("grant {}:{}: {}", subject, table, e),
                })?;
                Ok(AccessGrant::new(&subject, &table, role))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GrantSet::from_grants(grants))
    }
}
