//! Applier: reconcile a validated bundle with stored project state.
//!
//! # Architecture overview
//!
//! Everything before this module is pure; this is where the pipeline
//! touches the database, always through a `ProjectStore` handle and always
//! inside one transaction per call:
//!
//! 1. **Role upsert** — matched roles (by normalized name) get their
//!    replica counts refreshed, missing roles are inserted, and a second
//!    pass wires variant parents once every id is known.
//! 2. **Conflict reconciliation** — bundle pairs map to role-id pairs,
//!    canonicalize to `(min, max)`, dedupe within the batch, and only the
//!    difference against stored conflicts is inserted. Re-applying the same
//!    bundle therefore inserts nothing.
//! 3. **Role merge** (user action) — folds roles into a primary with
//!    casting guards, then re-points every conflict endpoint, deleting
//!    self-pairs and duplicates created by the rewrite.
//!
//! # Failure semantics
//!
//! Any store error rolls the transaction back and surfaces as the single
//! original error; a failed apply leaves no residue. Illegal merges are
//! rejected before any write happens.

use std::collections::{BTreeSet, HashMap};

use sha2::{Digest, Sha256};

use crate::error::RolecallError;
use crate::model::{CharacterKind, Diagnostic, ParseBundle, codes};
use crate::store::{ConflictSide, ProjectId, ProjectStore, RoleId, RoleSource};

/// Warning type recorded on conflicts produced by script ingestion.
const WARNING_SHARED_SCENE: &str = "shared_scene";

/// Identity of the ingested document, recorded in `project_scripts`.
#[derive(Debug, Clone)]
pub struct ScriptMeta {
    pub file_name: String,
    pub digest: String,
}

impl ScriptMeta {
    /// Digest the raw document content so re-imports are detectable.
    pub fn for_content(file_name: impl Into<String>, content: &str) -> ScriptMeta {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        ScriptMeta {
            file_name: file_name.into(),
            digest: format!("{:x}", hasher.finalize()),
        }
    }
}

/// What an apply changed, plus diagnostics gathered along the way.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub roles_created: usize,
    pub roles_updated: usize,
    pub conflicts_inserted: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Apply a bundle to a project inside a single transaction.
pub fn apply_bundle(
    store: &mut dyn ProjectStore,
    project_id: ProjectId,
    bundle: &ParseBundle,
    script: Option<&ScriptMeta>,
) -> Result<ApplyOutcome, RolecallError> {
    store.begin()?;
    match apply_inner(store, project_id, bundle, script) {
        Ok(outcome) => {
            store.commit()?;
            Ok(outcome)
        }
        Err(e) => {
            store.rollback().ok();
            Err(e)
        }
    }
}

fn apply_inner(
    store: &mut dyn ProjectStore,
    project_id: ProjectId,
    bundle: &ParseBundle,
    script: Option<&ScriptMeta>,
) -> Result<ApplyOutcome, RolecallError> {
    let mut outcome = ApplyOutcome::default();

    if let Some(meta) = script {
        if let Some(existing) = store.find_script_by_digest(project_id, &meta.digest)? {
            outcome.diagnostics.push(Diagnostic::info(
                codes::SCRIPT_ALREADY_INGESTED,
                format!(
                    "content of {:?} already ingested as {:?}",
                    meta.file_name, existing.file_name
                ),
            ));
        } else {
            store.record_script(
                project_id,
                &meta.file_name,
                &meta.digest,
                bundle.metadata.total_replicas,
            )?;
        }
    }

    // Pass one: upsert every character, remembering ids by normalized name
    let existing: BTreeSet<String> = store
        .get_project_roles(project_id)?
        .into_iter()
        .map(|r| r.role_name_normalized)
        .collect();

    let mut ids: HashMap<String, RoleId> = HashMap::new();
    for c in &bundle.characters {
        let id = store.upsert_role(
            project_id,
            &c.display_name,
            &c.normalized_name,
            c.replica_count,
            RoleSource::Script,
        )?;
        if existing.contains(&c.normalized_name) {
            outcome.roles_updated += 1;
        } else {
            outcome.roles_created += 1;
        }
        ids.insert(c.normalized_name.clone(), id);
    }

    // Pass two: wire variant parents now that every id exists
    for c in &bundle.characters {
        if c.kind != CharacterKind::Variant {
            continue;
        }
        if let Some(parent_key) = &c.parent_normalized_name
            && let (Some(&child_id), Some(&parent_id)) =
                (ids.get(&c.normalized_name), ids.get(parent_key))
        {
            store.set_role_parent(child_id, Some(parent_id))?;
        }
    }

    outcome.conflicts_inserted = reconcile_conflicts(store, project_id, bundle, &ids)?;
    Ok(outcome)
}

/// Insert the bundle's conflict pairs that are not already stored.
fn reconcile_conflicts(
    store: &mut dyn ProjectStore,
    project_id: ProjectId,
    bundle: &ParseBundle,
    ids: &HashMap<String, RoleId>,
) -> Result<usize, RolecallError> {
    let stored: BTreeSet<(RoleId, RoleId)> = store
        .get_role_conflicts(project_id)?
        .into_iter()
        .map(|c| (c.role_id_a, c.role_id_b))
        .collect();

    // Canonicalize and dedupe within the batch before diffing
    let mut batch: BTreeSet<(RoleId, RoleId)> = BTreeSet::new();
    let mut scene_refs: HashMap<(RoleId, RoleId), String> = HashMap::new();
    for pair in &bundle.conflicts {
        // Pairs whose endpoints did not both make it into the project are
        // dropped rather than half-written
        let (Some(&a), Some(&b)) = (ids.get(&pair.a), ids.get(&pair.b)) else {
            continue;
        };
        if a == b {
            continue;
        }
        let key = (a.min(b), a.max(b));
        batch.insert(key);
        let scenes: Vec<String> = pair.scenes.iter().map(|s| s.to_string()).collect();
        scene_refs.entry(key).or_insert_with(|| scenes.join(","));
    }

    let mut inserted = 0;
    for (a, b) in batch.difference(&stored) {
        store.insert_role_conflict(
            project_id,
            *a,
            *b,
            WARNING_SHARED_SCENE,
            scene_refs.get(&(*a, *b)).map(String::as_str),
        )?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Fold roles into `primary` inside a single transaction: castings guarded
/// and consolidated, replica counts summed, conflicts re-pointed, merged
/// rows deleted.
pub fn merge_roles(
    store: &mut dyn ProjectStore,
    project_id: ProjectId,
    primary_id: RoleId,
    other_ids: &[RoleId],
) -> Result<(), RolecallError> {
    store.begin()?;
    match merge_inner(store, project_id, primary_id, other_ids) {
        Ok(()) => {
            store.commit()?;
            Ok(())
        }
        Err(e) => {
            store.rollback().ok();
            Err(e)
        }
    }
}

fn merge_inner(
    store: &mut dyn ProjectStore,
    project_id: ProjectId,
    primary_id: RoleId,
    other_ids: &[RoleId],
) -> Result<(), RolecallError> {
    let roles = store.get_project_roles(project_id)?;
    let Some(primary) = roles.iter().find(|r| r.id == primary_id) else {
        return Err(RolecallError::MergeRejected(format!(
            "role {primary_id} not in project {project_id}"
        )));
    };
    let others: Vec<_> = other_ids
        .iter()
        .filter(|id| **id != primary_id)
        .map(|id| {
            roles
                .iter()
                .find(|r| r.id == *id)
                .ok_or_else(|| {
                    RolecallError::MergeRejected(format!(
                        "role {id} not in project {project_id}"
                    ))
                })
        })
        .collect::<Result<_, _>>()?;
    if others.is_empty() {
        return Ok(());
    }

    consolidate_castings(store, primary_id, &others)?;

    // Sum replicas into the primary through the upsert path
    let merged_replicas: u32 = primary.replicas_needed
        + others.iter().map(|r| r.replicas_needed).sum::<u32>();
    store.upsert_role(
        project_id,
        &primary.role_name,
        &primary.role_name_normalized,
        merged_replicas,
        primary.source,
    )?;

    repoint_conflicts(store, project_id, primary_id, other_ids)?;

    // Variant children of merged roles follow the primary
    for role in &roles {
        if role
            .parent_role_id
            .is_some_and(|p| other_ids.contains(&p))
        {
            let new_parent = if role.id == primary_id { None } else { Some(primary_id) };
            store.set_role_parent(role.id, new_parent)?;
        }
    }

    let delete: Vec<RoleId> = others.iter().map(|r| r.id).collect();
    store.delete_roles(&delete)?;
    Ok(())
}

/// Casting guards for a role merge.
///
/// Refused outright when the primary is cast while any merged role is too,
/// or when the merged roles are cast to different actors. Otherwise at most
/// one casting moves to the primary and the rest are deleted.
fn consolidate_castings(
    store: &mut dyn ProjectStore,
    primary_id: RoleId,
    others: &[&crate::store::RoleRow],
) -> Result<(), RolecallError> {
    let primary_castings = store.get_role_castings(primary_id)?;

    let mut other_castings = Vec::new();
    for role in others {
        other_castings.extend(store.get_role_castings(role.id)?);
    }

    if !primary_castings.is_empty() && !other_castings.is_empty() {
        return Err(RolecallError::MergeRejected(
            "primary role is already cast; merged roles also carry castings".to_string(),
        ));
    }
    let actors: BTreeSet<i64> = other_castings.iter().map(|c| c.actor_id).collect();
    if actors.len() > 1 {
        return Err(RolecallError::MergeRejected(
            "merged roles are cast to different actors".to_string(),
        ));
    }

    let mut iter = other_castings.into_iter();
    if primary_castings.is_empty()
        && let Some(first) = iter.next()
    {
        store.move_casting(first.id, primary_id)?;
    }
    for leftover in iter {
        store.delete_casting(leftover.id)?;
    }
    Ok(())
}

/// Rewrite conflict endpoints from merged roles to the primary, then
/// restore the canonical form: ordered endpoints, no self-pairs, no
/// duplicate pairs.
fn repoint_conflicts(
    store: &mut dyn ProjectStore,
    project_id: ProjectId,
    primary_id: RoleId,
    other_ids: &[RoleId],
) -> Result<(), RolecallError> {
    let conflicts = store.get_role_conflicts(project_id)?;
    let mut seen: BTreeSet<(RoleId, RoleId)> = BTreeSet::new();

    for row in conflicts {
        let mapped_a = if other_ids.contains(&row.role_id_a) { primary_id } else { row.role_id_a };
        let mapped_b = if other_ids.contains(&row.role_id_b) { primary_id } else { row.role_id_b };

        if mapped_a == mapped_b {
            store.delete_conflict(row.id)?;
            continue;
        }
        let (new_a, new_b) = (mapped_a.min(mapped_b), mapped_a.max(mapped_b));
        if !seen.insert((new_a, new_b)) {
            store.delete_conflict(row.id)?;
            continue;
        }
        if new_a != row.role_id_a {
            store.update_conflict_endpoint(row.id, ConflictSide::A, new_a)?;
        }
        if new_b != row.role_id_b {
            store.update_conflict_endpoint(row.id, ConflictSide::B, new_b)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DecodedInput;
    use crate::parser::{ParseOptions, parse_script};
    use crate::store::memory::MemoryStore;

    fn bundle_from(text: &str) -> ParseBundle {
        parse_script(
            &DecodedInput::Text {
                text: text.to_string(),
            },
            &ParseOptions::default(),
        )
    }

    #[test]
    fn test_apply_creates_roles_and_conflicts() {
        let mut store = MemoryStore::new();
        let bundle = bundle_from("INT. ROOM - DAY\nJOHN\nHello.\nMARY\nHi.");
        let outcome = apply_bundle(&mut store, 1, &bundle, None).unwrap();

        assert_eq!(outcome.roles_created, 2);
        assert_eq!(outcome.roles_updated, 0);
        assert_eq!(outcome.conflicts_inserted, 1);

        let roles = store.get_project_roles(1).unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.iter().all(|r| r.source == RoleSource::Script));
        let conflicts = store.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].role_id_a < conflicts[0].role_id_b);
        assert_eq!(conflicts[0].scene_reference.as_deref(), Some("0"));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut store = MemoryStore::new();
        let bundle = bundle_from("INT. ROOM - DAY\nJOHN\nHello.\nMARY\nHi.");
        apply_bundle(&mut store, 1, &bundle, None).unwrap();
        let second = apply_bundle(&mut store, 1, &bundle, None).unwrap();

        assert_eq!(second.roles_created, 0);
        assert_eq!(second.roles_updated, 2);
        assert_eq!(second.conflicts_inserted, 0);
        assert_eq!(store.get_project_roles(1).unwrap().len(), 2);
        assert_eq!(store.conflicts().len(), 1);
    }

    #[test]
    fn test_apply_wires_variant_parent() {
        let mut store = MemoryStore::new();
        let bundle = bundle_from("INT. A\nSARAH\nOne.\n\nINT. B\nSARAH OLDER\nTwo.");
        apply_bundle(&mut store, 1, &bundle, None).unwrap();

        let roles = store.get_project_roles(1).unwrap();
        let parent = roles.iter().find(|r| r.role_name_normalized == "SARAH").unwrap();
        let child = roles
            .iter()
            .find(|r| r.role_name_normalized == "SARAH OLDER")
            .unwrap();
        assert_eq!(child.parent_role_id, Some(parent.id));
        assert_eq!(parent.parent_role_id, None);
    }

    #[test]
    fn test_apply_updates_replicas_on_rematch() {
        let mut store = MemoryStore::new();
        apply_bundle(&mut store, 1, &bundle_from("JOHN\nOne."), None).unwrap();
        apply_bundle(&mut store, 1, &bundle_from("JOHN\nOne.\nTwo.\nThree."), None).unwrap();
        let roles = store.get_project_roles(1).unwrap();
        assert_eq!(roles[0].replicas_needed, 3);
    }

    #[test]
    fn test_apply_records_script_once() {
        let mut store = MemoryStore::new();
        let bundle = bundle_from("JOHN\nHi.");
        let meta = ScriptMeta::for_content("ep1.txt", "JOHN\nHi.");

        let first = apply_bundle(&mut store, 1, &bundle, Some(&meta)).unwrap();
        assert!(first.diagnostics.is_empty());

        let second = apply_bundle(&mut store, 1, &bundle, Some(&meta)).unwrap();
        assert!(second
            .diagnostics
            .iter()
            .any(|d| d.code == codes::SCRIPT_ALREADY_INGESTED));
    }

    #[test]
    fn test_merge_repoints_conflicts() {
        // Roles {A,B,C}, conflicts {(A,B),(A,C)}; merging B into A leaves
        // {A,C} with the single conflict (A,C)
        let mut store = MemoryStore::new();
        let a = store.upsert_role(1, "A", "A", 1, RoleSource::Script).unwrap();
        let b = store.upsert_role(1, "B", "B", 2, RoleSource::Script).unwrap();
        let c = store.upsert_role(1, "C", "C", 3, RoleSource::Script).unwrap();
        store.insert_role_conflict(1, a, b, WARNING_SHARED_SCENE, None).unwrap();
        store.insert_role_conflict(1, a, c, WARNING_SHARED_SCENE, None).unwrap();

        merge_roles(&mut store, 1, a, &[b]).unwrap();

        let roles = store.get_project_roles(1).unwrap();
        let names: Vec<&str> = roles.iter().map(|r| r.role_name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(roles[0].replicas_needed, 3);

        let conflicts = store.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!((conflicts[0].role_id_a, conflicts[0].role_id_b), (a, c));
    }

    #[test]
    fn test_merge_dedupes_rewritten_pairs() {
        let mut store = MemoryStore::new();
        let a = store.upsert_role(1, "A", "A", 0, RoleSource::Script).unwrap();
        let b = store.upsert_role(1, "B", "B", 0, RoleSource::Script).unwrap();
        let c = store.upsert_role(1, "C", "C", 0, RoleSource::Script).unwrap();
        store.insert_role_conflict(1, a, c, WARNING_SHARED_SCENE, None).unwrap();
        store.insert_role_conflict(1, b, c, WARNING_SHARED_SCENE, None).unwrap();

        merge_roles(&mut store, 1, a, &[b]).unwrap();

        let conflicts = store.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!((conflicts[0].role_id_a, conflicts[0].role_id_b), (a, c));
    }

    #[test]
    fn test_merge_moves_single_casting() {
        let mut store = MemoryStore::new();
        let a = store.upsert_role(1, "A", "A", 0, RoleSource::Script).unwrap();
        let b = store.upsert_role(1, "B", "B", 0, RoleSource::Script).unwrap();
        store.add_casting(1, b, 7);

        merge_roles(&mut store, 1, a, &[b]).unwrap();

        let castings = store.castings();
        assert_eq!(castings.len(), 1);
        assert_eq!(castings[0].role_id, a);
        assert_eq!(castings[0].actor_id, 7);
    }

    #[test]
    fn test_merge_rejects_both_sides_cast() {
        let mut store = MemoryStore::new();
        let a = store.upsert_role(1, "A", "A", 0, RoleSource::Script).unwrap();
        let b = store.upsert_role(1, "B", "B", 0, RoleSource::Script).unwrap();
        store.add_casting(1, a, 7);
        store.add_casting(1, b, 8);

        let err = merge_roles(&mut store, 1, a, &[b]).unwrap_err();
        assert!(matches!(err, RolecallError::MergeRejected(_)));
        // No partial writes
        assert_eq!(store.get_project_roles(1).unwrap().len(), 2);
        assert_eq!(store.castings().len(), 2);
    }

    #[test]
    fn test_merge_rejects_distinct_actors() {
        let mut store = MemoryStore::new();
        let a = store.upsert_role(1, "A", "A", 0, RoleSource::Script).unwrap();
        let b = store.upsert_role(1, "B", "B", 0, RoleSource::Script).unwrap();
        let c = store.upsert_role(1, "C", "C", 0, RoleSource::Script).unwrap();
        store.add_casting(1, b, 7);
        store.add_casting(1, c, 8);

        let err = merge_roles(&mut store, 1, a, &[b, c]).unwrap_err();
        assert!(matches!(err, RolecallError::MergeRejected(_)));
        assert_eq!(store.get_project_roles(1).unwrap().len(), 3);
    }

    #[test]
    fn test_merge_repoints_variant_children() {
        let mut store = MemoryStore::new();
        let a = store.upsert_role(1, "A", "A", 0, RoleSource::Script).unwrap();
        let b = store.upsert_role(1, "B", "B", 0, RoleSource::Script).unwrap();
        let child = store.upsert_role(1, "B Older", "B OLDER", 0, RoleSource::Script).unwrap();
        store.set_role_parent(child, Some(b)).unwrap();

        merge_roles(&mut store, 1, a, &[b]).unwrap();

        let roles = store.get_project_roles(1).unwrap();
        let child_row = roles.iter().find(|r| r.id == child).unwrap();
        assert_eq!(child_row.parent_role_id, Some(a));
    }

    #[test]
    fn test_merge_unknown_role_rejected() {
        let mut store = MemoryStore::new();
        let a = store.upsert_role(1, "A", "A", 0, RoleSource::Script).unwrap();
        let err = merge_roles(&mut store, 1, a, &[999]).unwrap_err();
        assert!(matches!(err, RolecallError::MergeRejected(_)));
    }

    #[test]
    fn test_script_meta_digest_stable() {
        let a = ScriptMeta::for_content("x", "JOHN\nHi.");
        let b = ScriptMeta::for_content("y", "JOHN\nHi.");
        assert_eq!(a.digest, b.digest);
        let c = ScriptMeta::for_content("x", "MARY\nHi.");
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_conflict_pairs_with_missing_roles_dropped() {
        let mut store = MemoryStore::new();
        let mut bundle = bundle_from("INT. ROOM\nJOHN\nHello.\nMARY\nHi.");
        // Simulate a user deleting MARY from the cast but a stale pair
        // surviving in the conflict list
        bundle.characters.retain(|c| c.normalized_name != "MARY");
        let outcome = apply_bundle(&mut store, 1, &bundle, None).unwrap();
        assert_eq!(outcome.conflicts_inserted, 0);
        assert!(store.conflicts().is_empty());
    }
}
