use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::RomsiftError;
use crate::models::Profile;

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");

/// Writable store holding profiles and their per-profile game
/// selections.
pub struct ProfileStore {
    conn: Connection,
}

impl ProfileStore {
    /// Open (or create) the profile database and run migrations.
    pub fn open(path: &Path) -> Result<Self, RomsiftError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory profile database (for tests).
    pub fn open_memory() -> Result<Self, RomsiftError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Profiles ────────────────────────────────────────────────

    /// All profiles, ordered by name.
    pub fn list_profiles(&self) -> Result<Vec<Profile>, RomsiftError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, online, romSource, chdSource, romTarget, chdTarget
             FROM profiles ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| Ok(row_to_profile(row)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Look up one profile by name.
    pub fn get_profile(&self, name: &str) -> Result<Option<Profile>, RomsiftError> {
        self.conn
            .query_row(
                "SELECT name, online, romSource, chdSource, romTarget, chdTarget
                 FROM profiles WHERE name = ?1",
                params![name],
                |row| Ok(row_to_profile(row)),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Create a new profile. Validates before touching the store; the
    /// name must be unique (primary key).
    pub fn insert_profile(&self, profile: &Profile) -> Result<(), RomsiftError> {
        validate_profile(profile)?;
        self.conn.execute(
            "INSERT INTO profiles (name, online, romSource, chdSource, romTarget, chdTarget)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                profile.name.trim(),
                profile.online as i32,
                profile.rom_source,
                profile.chd_source,
                profile.rom_target,
                profile.chd_target,
            ],
        )?;
        info!(name = %profile.name, "profile created");
        Ok(())
    }

    /// Update the profile previously named `prev_name`.
    ///
    /// A rename cascades into the selection rows in the same
    /// transaction, so selections follow the profile.
    pub fn update_profile(&self, prev_name: &str, profile: &Profile) -> Result<(), RomsiftError> {
        validate_profile(profile)?;
        let new_name = profile.name.trim();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE profiles SET name=?1, online=?2, romSource=?3, chdSource=?4,
                                 romTarget=?5, chdTarget=?6
             WHERE name=?7",
            params![
                new_name,
                profile.online as i32,
                profile.rom_source,
                profile.chd_source,
                profile.rom_target,
                profile.chd_target,
                prev_name,
            ],
        )?;
        if new_name != prev_name {
            tx.execute(
                "UPDATE games SET profile=?1 WHERE profile=?2",
                params![new_name, prev_name],
            )?;
        }
        tx.commit()?;
        info!(prev = %prev_name, name = %new_name, "profile updated");
        Ok(())
    }

    /// Delete a profile together with all of its selection rows.
    pub fn delete_profile(&self, name: &str) -> Result<(), RomsiftError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM profiles WHERE name=?1", params![name])?;
        tx.execute("DELETE FROM games WHERE profile=?1", params![name])?;
        tx.commit()?;
        info!(%name, "profile deleted");
        Ok(())
    }

    // ── Selections ──────────────────────────────────────────────

    /// Is the game selected for this profile?
    pub fn is_selected(&self, profile: &str, game: &str) -> Result<bool, RomsiftError> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM games WHERE profile=?1 AND game=?2",
            params![profile, game],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Select a game (idempotent upsert).
    pub fn add(&self, profile: &str, game: &str) -> Result<(), RomsiftError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO games (profile, game) VALUES (?1, ?2)",
            params![profile, game],
        )?;
        debug!(%profile, %game, "selection added");
        Ok(())
    }

    /// Deselect a game. Removing a non-member is a no-op.
    pub fn remove(&self, profile: &str, game: &str) -> Result<(), RomsiftError> {
        self.conn.execute(
            "DELETE FROM games WHERE profile=?1 AND game=?2",
            params![profile, game],
        )?;
        debug!(%profile, %game, "selection removed");
        Ok(())
    }

    /// Select every listed game, atomically.
    pub fn bulk_add(&self, profile: &str, games: &[String]) -> Result<(), RomsiftError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO games (profile, game) VALUES (?1, ?2)")?;
            for game in games {
                stmt.execute(params![profile, game])?;
            }
        }
        tx.commit()?;
        debug!(%profile, count = games.len(), "bulk selection added");
        Ok(())
    }

    /// Deselect every listed game, atomically.
    pub fn bulk_remove(&self, profile: &str, games: &[String]) -> Result<(), RomsiftError> {
        if games.is_empty() {
            return Ok(());
        }
        let qmarks = vec!["?"; games.len()].join(",");
        let sql = format!("DELETE FROM games WHERE profile=? AND game IN ({qmarks})");
        let mut values: Vec<&str> = vec![profile];
        values.extend(games.iter().map(|g| g.as_str()));
        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        debug!(%profile, count = games.len(), "bulk selection removed");
        Ok(())
    }

    /// The full selection set for a profile, as a lookup set for O(1)
    /// membership tests while rendering rows.
    pub fn list_selected(&self, profile: &str) -> Result<HashSet<String>, RomsiftError> {
        let mut stmt = self.conn.prepare("SELECT game FROM games WHERE profile=?1")?;
        let rows = stmt
            .query_map(params![profile], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Remove all selection rows for a profile.
    pub fn clear_profile(&self, profile: &str) -> Result<(), RomsiftError> {
        self.conn
            .execute("DELETE FROM games WHERE profile=?1", params![profile])?;
        Ok(())
    }
}

/// Reject a profile before any store mutation. Name and target folders
/// are always required; source folders only for local-copy profiles.
pub fn validate_profile(profile: &Profile) -> Result<(), RomsiftError> {
    if profile.name.trim().is_empty() {
        return Err(RomsiftError::Validation(
            "Profile name is required.".to_string(),
        ));
    }
    if profile.rom_target.is_empty() || profile.chd_target.is_empty() {
        return Err(RomsiftError::Validation(
            "ROM and CHD target folders are required.".to_string(),
        ));
    }
    if !profile.online && (profile.rom_source.is_empty() || profile.chd_source.is_empty()) {
        return Err(RomsiftError::Validation(
            "Local profiles need ROM and CHD source folders, or switch the profile to download mode."
                .to_string(),
        ));
    }
    Ok(())
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), RomsiftError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    Ok(())
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> Profile {
    Profile {
        name: row.get(0).unwrap_or_default(),
        online: row.get::<_, i32>(1).unwrap_or(0) != 0,
        rom_source: row.get(2).unwrap_or_default(),
        chd_source: row.get(3).unwrap_or_default(),
        rom_target: row.get(4).unwrap_or_default(),
        chd_target: row.get(5).unwrap_or_default(),
    }
}
