//! One-time import of credentials from the legacy database.
//!
//! Older releases kept authentications in a plain `SQLite` table. They are read
//! once, mapped to [`Credential`]s and merged into the registry; a flag in the
//! main database records that the import happened.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use uuid::Uuid;

use super::SessionRegistry;
use crate::db::Database;
use crate::error::Result;
use crate::models::Credential;

/// Raw row of the legacy `mastodon_authentications` table.
///
/// Every column is optional so that damaged rows can be read and skipped
/// individually.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct LegacyAuthentication {
    pub identifier: Option<String>,
    pub domain: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub app_access_token: Option<String>,
    pub user_access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// RFC 3339
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub activated_at: Option<String>,
}

impl LegacyAuthentication {
    /// Map to a credential, or `None` if a required field is missing or
    /// malformed.
    pub fn into_credential(self) -> Option<Credential> {
        let created_at = parse_time(self.created_at.as_deref())?;
        let mut credential = Credential::new(
            self.domain.as_deref().filter(|d| !d.is_empty())?,
            self.user_id.as_deref().filter(|u| !u.is_empty())?,
            &self.username.unwrap_or_default(),
            self.user_access_token.as_deref().filter(|t| !t.is_empty())?,
        );

        credential.identifier = Uuid::parse_str(self.identifier.as_deref()?).ok()?;
        credential.app_access_token = self.app_access_token.unwrap_or_default();
        credential.client_id = self.client_id.unwrap_or_default();
        credential.client_secret = self.client_secret.unwrap_or_default();
        credential.created_at = created_at;
        credential.updated_at = parse_time(self.updated_at.as_deref()).unwrap_or(created_at);
        credential.activated_at = parse_time(self.activated_at.as_deref()).unwrap_or(created_at);
        credential.account_created_at = Some(created_at);
        credential.instance = None;
        credential.imported = true;

        Some(credential)
    }
}

/// What a migration run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The flag says migration already happened
    NotRequired,
    /// There is no legacy database to read
    NoLegacyData,
    /// Legacy rows were read and merged
    Migrated {
        /// Rows found in the legacy table
        found: usize,
        /// Rows that mapped to a credential
        mapped: usize,
        /// Mapped credentials not already in the registry
        added: usize,
    },
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Read every row of the legacy authentication table
pub fn read_legacy(path: &Path) -> Result<Vec<LegacyAuthentication>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT identifier, domain, user_id, username, app_access_token, user_access_token,
                client_id, client_secret, created_at, updated_at, activated_at
         FROM mastodon_authentications
         ORDER BY activated_at DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(LegacyAuthentication {
            identifier: row.get(0)?,
            domain: row.get(1)?,
            user_id: row.get(2)?,
            username: row.get(3)?,
            app_access_token: row.get(4)?,
            user_access_token: row.get(5)?,
            client_id: row.get(6)?,
            client_secret: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            activated_at: row.get(10)?,
        })
    })?;

    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Import legacy credentials into `registry` if the flag in `db` asks for it.
///
/// Accounts already in the registry are kept as they are. On a read failure
/// the flag is left unset so the next start tries again.
pub fn migrate_if_required(
    registry: &mut SessionRegistry,
    db: &Database,
    legacy_path: &Path,
) -> Result<MigrationOutcome> {
    if !db.migration_required()? {
        return Ok(MigrationOutcome::NotRequired);
    }

    if !legacy_path.exists() {
        tracing::debug!("No legacy database at {}", legacy_path.display());
        db.set_migrated(true)?;
        return Ok(MigrationOutcome::NoLegacyData);
    }

    let rows = match read_legacy(legacy_path) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Could not migrate legacy authentications: {e}");
            db.set_migrated(false)?;
            return Err(e);
        }
    };

    let found = rows.len();
    let migrated: Vec<Credential> = rows
        .into_iter()
        .filter_map(LegacyAuthentication::into_credential)
        .collect();
    let mapped = migrated.len();

    if mapped == found {
        tracing::info!("Migrated all {found} legacy authentication(s)");
    } else {
        tracing::warn!("Only {mapped} of {found} legacy authentications could be migrated");
    }

    let mut credentials = registry.credentials().to_vec();
    let before = credentials.len();
    for credential in migrated {
        if !credentials.iter().any(|c| c.same_identity(&credential)) {
            credentials.push(credential);
        }
    }
    let added = credentials.len() - before;

    if added > 0 {
        registry.replace_all(credentials);
    }
    db.set_migrated(true)?;

    Ok(MigrationOutcome::Migrated {
        found,
        mapped,
        added,
    })
}
