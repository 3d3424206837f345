//! Persistence interface consumed by the applier.
//!
//! # Architecture overview
//!
//! The applier never talks to a database directly — it drives this trait,
//! which exposes exactly the operations the reconciliation algorithms need.
//! Two implementations ship: `sqlite::SqliteStore` for the real store and
//! `memory::MemoryStore` for applier tests. An explicit store handle passed
//! into every apply call replaces any notion of a module-level database
//! client.
//!
//! Transaction control is part of the trait: the applier brackets each
//! apply in `begin`/`commit` and rolls back on the first error, so a failed
//! apply leaves no residue.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::RolecallError;

pub type ProjectId = i64;
pub type RoleId = i64;
pub type ConflictId = i64;
pub type CastingId = i64;

/// Where a role row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSource {
    Manual,
    Script,
}

impl RoleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleSource::Manual => "manual",
            RoleSource::Script => "script",
        }
    }

    pub fn parse(s: &str) -> RoleSource {
        match s {
            "script" => RoleSource::Script,
            _ => RoleSource::Manual,
        }
    }
}

/// A `project_roles` row. `role_name_normalized` is unique per project and
/// is the join key between bundle characters and stored roles.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleRow {
    pub id: RoleId,
    pub project_id: ProjectId,
    pub role_name: String,
    pub role_name_normalized: String,
    pub replicas_needed: u32,
    pub parent_role_id: Option<RoleId>,
    pub source: RoleSource,
}

/// A `role_conflicts` row. Stored canonically with `role_id_a < role_id_b`
/// and unique per `(project_id, role_id_a, role_id_b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRow {
    pub id: ConflictId,
    pub project_id: ProjectId,
    pub role_id_a: RoleId,
    pub role_id_b: RoleId,
    pub warning_type: String,
    pub scene_reference: Option<String>,
}

/// A `role_castings` row; at most one casting per role.
#[derive(Debug, Clone, PartialEq)]
pub struct CastingRow {
    pub id: CastingId,
    pub project_id: ProjectId,
    pub role_id: RoleId,
    pub actor_id: i64,
    pub status: String,
}

/// A `project_scripts` row: one ingested document, keyed by content digest
/// so re-imports of identical files are detectable.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRow {
    pub id: i64,
    pub project_id: ProjectId,
    pub file_name: String,
    pub content_digest: String,
    pub total_replicas: u32,
    pub uploaded_at: DateTime<Utc>,
}

/// Which endpoint of a conflict row to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSide {
    A,
    B,
}

/// The operations the applier runs against project state.
///
/// Methods take `&mut self` so implementations can hold a plain connection
/// without interior mutability. Every call inside one `begin`/`commit`
/// bracket executes in the same transaction.
pub trait ProjectStore {
    fn begin(&mut self) -> Result<(), RolecallError>;
    fn commit(&mut self) -> Result<(), RolecallError>;
    fn rollback(&mut self) -> Result<(), RolecallError>;

    fn get_project_roles(&mut self, project_id: ProjectId) -> Result<Vec<RoleRow>, RolecallError>;

    /// Insert a role or, when `(project_id, normalized)` already exists,
    /// update its `replicas_needed` and `source`. Returns the row id either
    /// way.
    fn upsert_role(
        &mut self,
        project_id: ProjectId,
        role_name: &str,
        normalized: &str,
        replicas: u32,
        source: RoleSource,
    ) -> Result<RoleId, RolecallError>;

    fn set_role_parent(
        &mut self,
        role_id: RoleId,
        parent_id: Option<RoleId>,
    ) -> Result<(), RolecallError>;

    fn get_role_conflicts(
        &mut self,
        project_id: ProjectId,
    ) -> Result<Vec<ConflictRow>, RolecallError>;

    fn insert_role_conflict(
        &mut self,
        project_id: ProjectId,
        role_id_a: RoleId,
        role_id_b: RoleId,
        warning_type: &str,
        scene_reference: Option<&str>,
    ) -> Result<ConflictId, RolecallError>;

    fn update_conflict_endpoint(
        &mut self,
        conflict_id: ConflictId,
        side: ConflictSide,
        new_role_id: RoleId,
    ) -> Result<(), RolecallError>;

    fn delete_conflict(&mut self, conflict_id: ConflictId) -> Result<(), RolecallError>;

    fn get_role_castings(&mut self, role_id: RoleId) -> Result<Vec<CastingRow>, RolecallError>;

    fn move_casting(
        &mut self,
        casting_id: CastingId,
        new_role_id: RoleId,
    ) -> Result<(), RolecallError>;

    fn delete_casting(&mut self, casting_id: CastingId) -> Result<(), RolecallError>;

    fn delete_roles(&mut self, role_ids: &[RoleId]) -> Result<(), RolecallError>;

    fn find_script_by_digest(
        &mut self,
        project_id: ProjectId,
        digest: &str,
    ) -> Result<Option<ScriptRow>, RolecallError>;

    fn record_script(
        &mut self,
        project_id: ProjectId,
        file_name: &str,
        digest: &str,
        total_replicas: u32,
    ) -> Result<(), RolecallError>;
}
