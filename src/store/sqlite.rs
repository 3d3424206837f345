//! SQLite-backed `ProjectStore`.
//!
//! The schema mirrors the casting database tables the applier reconciles
//! against. Conflict rows enforce the canonical endpoint ordering with a
//! CHECK constraint, and the per-project uniqueness of normalized role
//! names and conflict pairs lives in the schema rather than in application
//! code — the applier's dedup passes keep it from ever tripping.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::RolecallError;
use crate::store::{
    CastingId, CastingRow, ConflictId, ConflictRow, ConflictSide, ProjectId, ProjectStore, RoleId,
    RoleRow, RoleSource, ScriptRow,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS project_roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    role_name TEXT NOT NULL,
    role_name_normalized TEXT NOT NULL,
    replicas_needed INTEGER NOT NULL DEFAULT 0,
    parent_role_id INTEGER REFERENCES project_roles(id),
    source TEXT NOT NULL DEFAULT 'manual',
    UNIQUE (project_id, role_name_normalized)
);
CREATE TABLE IF NOT EXISTS role_conflicts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    role_id_a INTEGER NOT NULL REFERENCES project_roles(id),
    role_id_b INTEGER NOT NULL REFERENCES project_roles(id),
    warning_type TEXT NOT NULL,
    scene_reference TEXT,
    CHECK (role_id_a < role_id_b),
    UNIQUE (project_id, role_id_a, role_id_b)
);
CREATE TABLE IF NOT EXISTS role_castings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    role_id INTEGER NOT NULL UNIQUE REFERENCES project_roles(id),
    actor_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
);
CREATE TABLE IF NOT EXISTS project_scripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    content_digest TEXT NOT NULL,
    total_replicas INTEGER NOT NULL DEFAULT 0,
    uploaded_at TEXT NOT NULL,
    UNIQUE (project_id, content_digest)
);
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<SqliteStore, RolecallError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<SqliteStore, RolecallError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }
}

fn role_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoleRow> {
    Ok(RoleRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        role_name: row.get(2)?,
        role_name_normalized: row.get(3)?,
        replicas_needed: row.get(4)?,
        parent_role_id: row.get(5)?,
        source: RoleSource::parse(&row.get::<_, String>(6)?),
    })
}

impl ProjectStore for SqliteStore {
    fn begin(&mut self) -> Result<(), RolecallError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RolecallError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), RolecallError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn get_project_roles(&mut self, project_id: ProjectId) -> Result<Vec<RoleRow>, RolecallError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, role_name, role_name_normalized, replicas_needed,
                    parent_role_id, source
             FROM project_roles WHERE project_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![project_id], role_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn upsert_role(
        &mut self,
        project_id: ProjectId,
        role_name: &str,
        normalized: &str,
        replicas: u32,
        source: RoleSource,
    ) -> Result<RoleId, RolecallError> {
        let id = self.conn.query_row(
            "INSERT INTO project_roles
                 (project_id, role_name, role_name_normalized, replicas_needed, source)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (project_id, role_name_normalized)
             DO UPDATE SET replicas_needed = excluded.replicas_needed,
                           source = excluded.source
             RETURNING id",
            params![project_id, role_name, normalized, replicas, source.as_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn set_role_parent(
        &mut self,
        role_id: RoleId,
        parent_id: Option<RoleId>,
    ) -> Result<(), RolecallError> {
        self.conn.execute(
            "UPDATE project_roles SET parent_role_id = ?2 WHERE id = ?1",
            params![role_id, parent_id],
        )?;
        Ok(())
    }

    fn get_role_conflicts(
        &mut self,
        project_id: ProjectId,
    ) -> Result<Vec<ConflictRow>, RolecallError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, role_id_a, role_id_b, warning_type, scene_reference
             FROM role_conflicts WHERE project_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(ConflictRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    role_id_a: row.get(2)?,
                    role_id_b: row.get(3)?,
                    warning_type: row.get(4)?,
                    scene_reference: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn insert_role_conflict(
        &mut self,
        project_id: ProjectId,
        role_id_a: RoleId,
        role_id_b: RoleId,
        warning_type: &str,
        scene_reference: Option<&str>,
    ) -> Result<ConflictId, RolecallError> {
        let id = self.conn.query_row(
            "INSERT INTO role_conflicts
                 (project_id, role_id_a, role_id_b, warning_type, scene_reference)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
            params![project_id, role_id_a, role_id_b, warning_type, scene_reference],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn update_conflict_endpoint(
        &mut self,
        conflict_id: ConflictId,
        side: ConflictSide,
        new_role_id: RoleId,
    ) -> Result<(), RolecallError> {
        let sql = match side {
            ConflictSide::A => "UPDATE role_conflicts SET role_id_a = ?2 WHERE id = ?1",
            ConflictSide::B => "UPDATE role_conflicts SET role_id_b = ?2 WHERE id = ?1",
        };
        self.conn.execute(sql, params![conflict_id, new_role_id])?;
        Ok(())
    }

    fn delete_conflict(&mut self, conflict_id: ConflictId) -> Result<(), RolecallError> {
        self.conn.execute(
            "DELETE FROM role_conflicts WHERE id = ?1",
            params![conflict_id],
        )?;
        Ok(())
    }

    fn get_role_castings(&mut self, role_id: RoleId) -> Result<Vec<CastingRow>, RolecallError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, role_id, actor_id, status
             FROM role_castings WHERE role_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![role_id], |row| {
                Ok(CastingRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    role_id: row.get(2)?,
                    actor_id: row.get(3)?,
                    status: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn move_casting(
        &mut self,
        casting_id: CastingId,
        new_role_id: RoleId,
    ) -> Result<(), RolecallError> {
        self.conn.execute(
            "UPDATE role_castings SET role_id = ?2 WHERE id = ?1",
            params![casting_id, new_role_id],
        )?;
        Ok(())
    }

    fn delete_casting(&mut self, casting_id: CastingId) -> Result<(), RolecallError> {
        self.conn.execute(
            "DELETE FROM role_castings WHERE id = ?1",
            params![casting_id],
        )?;
        Ok(())
    }

    fn delete_roles(&mut self, role_ids: &[RoleId]) -> Result<(), RolecallError> {
        let mut stmt = self
            .conn
            .prepare("DELETE FROM project_roles WHERE id = ?1")?;
        for id in role_ids {
            stmt.execute(params![id])?;
        }
        Ok(())
    }

    fn find_script_by_digest(
        &mut self,
        project_id: ProjectId,
        digest: &str,
    ) -> Result<Option<ScriptRow>, RolecallError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, project_id, file_name, content_digest, total_replicas, uploaded_at
                 FROM project_scripts WHERE project_id = ?1 AND content_digest = ?2",
                params![project_id, digest],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(id, project_id, file_name, content_digest, total_replicas, uploaded_at)| {
            ScriptRow {
                id,
                project_id,
                file_name,
                content_digest,
                total_replicas,
                uploaded_at: uploaded_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            }
        }))
    }

    fn record_script(
        &mut self,
        project_id: ProjectId,
        file_name: &str,
        digest: &str,
        total_replicas: u32,
    ) -> Result<(), RolecallError> {
        self.conn.execute(
            "INSERT INTO project_scripts
                 (project_id, file_name, content_digest, total_replicas, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (project_id, content_digest) DO NOTHING",
            params![
                project_id,
                file_name,
                digest,
                total_replicas,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let mut s = store();
        let id1 = s.upsert_role(1, "John", "JOHN", 3, RoleSource::Script).unwrap();
        let id2 = s.upsert_role(1, "John", "JOHN", 5, RoleSource::Script).unwrap();
        assert_eq!(id1, id2);
        let roles = s.get_project_roles(1).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].replicas_needed, 5);
        assert_eq!(roles[0].source, RoleSource::Script);
    }

    #[test]
    fn test_upsert_scoped_per_project() {
        let mut s = store();
        let a = s.upsert_role(1, "John", "JOHN", 1, RoleSource::Script).unwrap();
        let b = s.upsert_role(2, "John", "JOHN", 1, RoleSource::Script).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_conflict_check_constraint() {
        let mut s = store();
        let a = s.upsert_role(1, "A", "A", 1, RoleSource::Script).unwrap();
        let b = s.upsert_role(1, "B", "B", 1, RoleSource::Script).unwrap();
        assert!(s.insert_role_conflict(1, a, b, "shared_scene", None).is_ok());
        // Reversed endpoints violate the CHECK
        assert!(s.insert_role_conflict(1, b, a, "shared_scene", None).is_err());
    }

    #[test]
    fn test_conflict_unique_per_pair() {
        let mut s = store();
        let a = s.upsert_role(1, "A", "A", 1, RoleSource::Script).unwrap();
        let b = s.upsert_role(1, "B", "B", 1, RoleSource::Script).unwrap();
        s.insert_role_conflict(1, a, b, "shared_scene", None).unwrap();
        assert!(s.insert_role_conflict(1, a, b, "shared_scene", None).is_err());
    }

    #[test]
    fn test_parent_link() {
        let mut s = store();
        let parent = s.upsert_role(1, "Sarah", "SARAH", 5, RoleSource::Script).unwrap();
        let child = s
            .upsert_role(1, "Sarah Older", "SARAH OLDER", 3, RoleSource::Script)
            .unwrap();
        s.set_role_parent(child, Some(parent)).unwrap();
        let roles = s.get_project_roles(1).unwrap();
        let child_row = roles.iter().find(|r| r.id == child).unwrap();
        assert_eq!(child_row.parent_role_id, Some(parent));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut s = store();
        s.begin().unwrap();
        s.upsert_role(1, "John", "JOHN", 1, RoleSource::Script).unwrap();
        s.rollback().unwrap();
        assert!(s.get_project_roles(1).unwrap().is_empty());
    }

    #[test]
    fn test_script_registry_digest_lookup() {
        let mut s = store();
        s.record_script(1, "ep1.txt", "abc123", 42).unwrap();
        let found = s.find_script_by_digest(1, "abc123").unwrap().unwrap();
        assert_eq!(found.file_name, "ep1.txt");
        assert_eq!(found.total_replicas, 42);
        assert!(s.find_script_by_digest(1, "zzz").unwrap().is_none());
        assert!(s.find_script_by_digest(2, "abc123").unwrap().is_none());
    }

    #[test]
    fn test_castings_roundtrip() {
        let mut s = store();
        let a = s.upsert_role(1, "A", "A", 1, RoleSource::Script).unwrap();
        let b = s.upsert_role(1, "B", "B", 1, RoleSource::Script).unwrap();
        s.conn
            .execute(
                "INSERT INTO role_castings (project_id, role_id, actor_id, status)
                 VALUES (1, ?1, 7, 'confirmed')",
                params![a],
            )
            .unwrap();
        let castings = s.get_role_castings(a).unwrap();
        assert_eq!(castings.len(), 1);
        s.move_casting(castings[0].id, b).unwrap();
        assert!(s.get_role_castings(a).unwrap().is_empty());
        assert_eq!(s.get_role_castings(b).unwrap().len(), 1);
    }
}
