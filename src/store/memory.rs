//! In-memory `ProjectStore` used by applier tests.
//!
//! Rows live in plain `Vec`s with monotonically assigned ids, and `begin`
//! snapshots the whole state so `rollback` is a restore. The behavior
//! mirrors the SQLite store closely enough for the applier's semantics —
//! including the unique-pair rejection on conflict insert — without a
//! database in the loop.

use chrono::Utc;

use crate::error::RolecallError;
use crate::store::{
    CastingId, CastingRow, ConflictId, ConflictRow, ConflictSide, ProjectId, ProjectStore, RoleId,
    RoleRow, RoleSource, ScriptRow,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    roles: Vec<RoleRow>,
    conflicts: Vec<ConflictRow>,
    castings: Vec<CastingRow>,
    scripts: Vec<ScriptRow>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
    snapshot: Option<Tables>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn next_id(&mut self) -> i64 {
        self.tables.next_id += 1;
        self.tables.next_id
    }

    /// Test hook: place a casting directly.
    pub fn add_casting(&mut self, project_id: ProjectId, role_id: RoleId, actor_id: i64) -> CastingId {
        let id = self.next_id();
        self.tables.castings.push(CastingRow {
            id,
            project_id,
            role_id,
            actor_id,
            status: "confirmed".to_string(),
        });
        id
    }

    pub fn conflicts(&self) -> &[ConflictRow] {
        &self.tables.conflicts
    }

    pub fn castings(&self) -> &[CastingRow] {
        &self.tables.castings
    }
}

impl ProjectStore for MemoryStore {
    fn begin(&mut self) -> Result<(), RolecallError> {
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RolecallError> {
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), RolecallError> {
        if let Some(snapshot) = self.snapshot.take() {
            self.tables = snapshot;
        }
        Ok(())
    }

    fn get_project_roles(&mut self, project_id: ProjectId) -> Result<Vec<RoleRow>, RolecallError> {
        Ok(self
            .tables
            .roles
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }

    fn upsert_role(
        &mut self,
        project_id: ProjectId,
        role_name: &str,
        normalized: &str,
        replicas: u32,
        source: RoleSource,
    ) -> Result<RoleId, RolecallError> {
        if let Some(row) = self
            .tables
            .roles
            .iter_mut()
            .find(|r| r.project_id == project_id && r.role_name_normalized == normalized)
        {
            row.replicas_needed = replicas;
            row.source = source;
            return Ok(row.id);
        }
        let id = self.next_id();
        self.tables.roles.push(RoleRow {
            id,
            project_id,
            role_name: role_name.to_string(),
            role_name_normalized: normalized.to_string(),
            replicas_needed: replicas,
            parent_role_id: None,
            source,
        });
        Ok(id)
    }

    fn set_role_parent(
        &mut self,
        role_id: RoleId,
        parent_id: Option<RoleId>,
    ) -> Result<(), RolecallError> {
        if let Some(row) = self.tables.roles.iter_mut().find(|r| r.id == role_id) {
            row.parent_role_id = parent_id;
        }
        Ok(())
    }

    fn get_role_conflicts(
        &mut self,
        project_id: ProjectId,
    ) -> Result<Vec<ConflictRow>, RolecallError> {
        Ok(self
            .tables
            .conflicts
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    fn insert_role_conflict(
        &mut self,
        project_id: ProjectId,
        role_id_a: RoleId,
        role_id_b: RoleId,
        warning_type: &str,
        scene_reference: Option<&str>,
    ) -> Result<ConflictId, RolecallError> {
        if role_id_a >= role_id_b {
            return Err(RolecallError::Other(format!(
                "conflict endpoints out of order: {role_id_a} >= {role_id_b}"
            )));
        }
        if self.tables.conflicts.iter().any(|c| {
            c.project_id == project_id && c.role_id_a == role_id_a && c.role_id_b == role_id_b
        }) {
            return Err(RolecallError::Other(format!(
                "duplicate conflict ({role_id_a}, {role_id_b})"
            )));
        }
        let id = self.next_id();
        self.tables.conflicts.push(ConflictRow {
            id,
            project_id,
            role_id_a,
            role_id_b,
            warning_type: warning_type.to_string(),
            scene_reference: scene_reference.map(|s| s.to_string()),
        });
        Ok(id)
    }

    fn update_conflict_endpoint(
        &mut self,
        conflict_id: ConflictId,
        side: ConflictSide,
        new_role_id: RoleId,
    ) -> Result<(), RolecallError> {
        if let Some(row) = self
            .tables
            .conflicts
            .iter_mut()
            .find(|c| c.id == conflict_id)
        {
            match side {
                ConflictSide::A => row.role_id_a = new_role_id,
                ConflictSide::B => row.role_id_b = new_role_id,
            }
        }
        Ok(())
    }

    fn delete_conflict(&mut self, conflict_id: ConflictId) -> Result<(), RolecallError> {
        self.tables.conflicts.retain(|c| c.id != conflict_id);
        Ok(())
    }

    fn get_role_castings(&mut self, role_id: RoleId) -> Result<Vec<CastingRow>, RolecallError> {
        Ok(self
            .tables
            .castings
            .iter()
            .filter(|c| c.role_id == role_id)
            .cloned()
            .collect())
    }

    fn move_casting(
        &mut self,
        casting_id: CastingId,
        new_role_id: RoleId,
    ) -> Result<(), RolecallError> {
        if let Some(row) = self
            .tables
            .castings
            .iter_mut()
            .find(|c| c.id == casting_id)
        {
            row.role_id = new_role_id;
        }
        Ok(())
    }

    fn delete_casting(&mut self, casting_id: CastingId) -> Result<(), RolecallError> {
        self.tables.castings.retain(|c| c.id != casting_id);
        Ok(())
    }

    fn delete_roles(&mut self, role_ids: &[RoleId]) -> Result<(), RolecallError> {
        self.tables.roles.retain(|r| !role_ids.contains(&r.id));
        Ok(())
    }

    fn find_script_by_digest(
        &mut self,
        project_id: ProjectId,
        digest: &str,
    ) -> Result<Option<ScriptRow>, RolecallError> {
        Ok(self
            .tables
            .scripts
            .iter()
            .find(|s| s.project_id == project_id && s.content_digest == digest)
            .cloned())
    }

    fn record_script(
        &mut self,
        project_id: ProjectId,
        file_name: &str,
        digest: &str,
        total_replicas: u32,
    ) -> Result<(), RolecallError> {
        if self
            .tables
            .scripts
            .iter()
            .any(|s| s.project_id == project_id && s.content_digest == digest)
        {
            return Ok(());
        }
        let id = self.next_id();
        self.tables.scripts.push(ScriptRow {
            id,
            project_id,
            file_name: file_name.to_string(),
            content_digest: digest.to_string(),
            total_replicas,
            uploaded_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_rollback() {
        let mut s = MemoryStore::new();
        s.upsert_role(1, "A", "A", 1, RoleSource::Manual).unwrap();
        s.begin().unwrap();
        s.upsert_role(1, "B", "B", 1, RoleSource::Manual).unwrap();
        s.rollback().unwrap();
        assert_eq!(s.get_project_roles(1).unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_out_of_order_conflict() {
        let mut s = MemoryStore::new();
        let a = s.upsert_role(1, "A", "A", 1, RoleSource::Manual).unwrap();
        let b = s.upsert_role(1, "B", "B", 1, RoleSource::Manual).unwrap();
        assert!(s.insert_role_conflict(1, b, a, "shared_scene", None).is_err());
        assert!(s.insert_role_conflict(1, a, b, "shared_scene", None).is_ok());
    }
}
