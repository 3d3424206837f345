//! User edits on a parsed bundle: merge, delete, rename.
//!
//! Edits run before anything is committed, so they only touch the in-memory
//! bundle — the preview the user corrects in the review grid. Every edit
//! keeps the bundle invariants intact: conflict endpoints stay ordered and
//! unique, variant parents stay resolvable, and totals stay in sync with
//! the cast.
//!
//! Unknown targets are recorded as warnings and skipped; an edit list is
//! user input, not trusted data.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{CharacterKind, ConflictPair, Diagnostic, ParseBundle, UserEdit, codes};
use crate::normalize::normalize_name;

/// Apply edits in order and return the updated bundle.
pub fn apply_user_edits(mut bundle: ParseBundle, edits: &[UserEdit]) -> ParseBundle {
    for edit in edits {
        match edit {
            UserEdit::Merge { sources, primary } => merge(&mut bundle, sources, primary),
            UserEdit::Delete { target } => delete(&mut bundle, target),
            UserEdit::Rename {
                target,
                new_display,
            } => rename(&mut bundle, target, new_display),
        }
    }
    bundle.refresh_totals();
    bundle
}

fn unknown_target(bundle: &mut ParseBundle, name: &str) {
    bundle.diagnostics.push(Diagnostic::warning(
        codes::UNKNOWN_EDIT_TARGET,
        format!("edit target {name:?} not in bundle"),
    ));
}

fn merge(bundle: &mut ParseBundle, sources: &[String], primary: &str) {
    let Some(mut primary_idx) = bundle
        .characters
        .iter()
        .position(|c| c.normalized_name == primary)
    else {
        unknown_target(bundle, primary);
        return;
    };

    for source in sources {
        if source == primary {
            continue;
        }
        let Some(pos) = bundle
            .characters
            .iter()
            .position(|c| c.normalized_name == *source)
        else {
            unknown_target(bundle, source);
            continue;
        };
        let removed = bundle.characters.remove(pos);
        if pos < primary_idx {
            primary_idx -= 1;
        }

        let target = &mut bundle.characters[primary_idx];
        target.replica_count += removed.replica_count;
        target.scenes_present.extend(removed.scenes_present.iter());
        for v in removed.variants {
            if !target.variants.contains(&v) {
                target.variants.push(v);
            }
        }

        repoint(bundle, source, primary);
    }
    bundle.conflicts = renormalize_conflicts(std::mem::take(&mut bundle.conflicts));
}

fn delete(bundle: &mut ParseBundle, target: &str) {
    let Some(pos) = bundle
        .characters
        .iter()
        .position(|c| c.normalized_name == target)
    else {
        unknown_target(bundle, target);
        return;
    };
    bundle.characters.remove(pos);

    bundle
        .conflicts
        .retain(|p| p.a != target && p.b != target);

    // Orphaned variants stand on their own rather than disappearing
    for c in &mut bundle.characters {
        if c.parent_normalized_name.as_deref() == Some(target) {
            c.parent_normalized_name = None;
            c.kind = CharacterKind::Regular;
        }
    }
}

fn rename(bundle: &mut ParseBundle, target: &str, new_display: &str) {
    let new_key = normalize_name(new_display);
    if new_key.is_empty() {
        bundle.diagnostics.push(Diagnostic::warning(
            codes::UNKNOWN_EDIT_TARGET,
            format!("rename of {target:?} to unusable name {new_display:?}"),
        ));
        return;
    }
    if bundle.character(target).is_none() {
        unknown_target(bundle, target);
        return;
    }

    if new_key != target && bundle.character(&new_key).is_some() {
        // Renaming onto an existing character folds the two together
        merge(bundle, &[target.to_string()], &new_key);
        if let Some(survivor) = bundle.character_mut(&new_key) {
            survivor.display_name = new_display.to_string();
            if !survivor.variants.contains(&new_display.to_string()) {
                survivor.variants.push(new_display.to_string());
            }
        }
        return;
    }

    let Some(c) = bundle.character_mut(target) else {
        return;
    };
    c.display_name = new_display.to_string();
    c.normalized_name = new_key.clone();
    if !c.variants.contains(&new_display.to_string()) {
        c.variants.push(new_display.to_string());
    }

    if new_key != target {
        repoint(bundle, target, &new_key);
        bundle.conflicts = renormalize_conflicts(std::mem::take(&mut bundle.conflicts));
    }
}

/// Re-point conflict endpoints and variant parent links from `old` to `new`.
fn repoint(bundle: &mut ParseBundle, old: &str, new: &str) {
    for pair in &mut bundle.conflicts {
        if pair.a == old {
            pair.a = new.to_string();
        }
        if pair.b == old {
            pair.b = new.to_string();
        }
    }
    for c in &mut bundle.characters {
        if c.parent_normalized_name.as_deref() == Some(old) {
            if c.normalized_name == new {
                // A character cannot parent itself
                c.parent_normalized_name = None;
                if c.kind == CharacterKind::Variant {
                    c.kind = CharacterKind::Regular;
                }
            } else {
                c.parent_normalized_name = Some(new.to_string());
            }
        }
    }
}

/// Restore canonical conflict form after endpoint rewrites: ordered
/// endpoints, no self-pairs, no duplicates, scene sets unioned.
fn renormalize_conflicts(pairs: Vec<ConflictPair>) -> Vec<ConflictPair> {
    let mut map: BTreeMap<(String, String), BTreeSet<usize>> = BTreeMap::new();
    for pair in pairs {
        if pair.a == pair.b {
            continue;
        }
        let key = if pair.a <= pair.b {
            (pair.a, pair.b)
        } else {
            (pair.b, pair.a)
        };
        map.entry(key).or_default().extend(pair.scenes);
    }
    map.into_iter()
        .map(|((a, b), scenes)| ConflictPair { a, b, scenes })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DecodedInput;
    use crate::parser::{ParseOptions, parse_script};

    fn bundle_from(text: &str) -> ParseBundle {
        parse_script(
            &DecodedInput::Text {
                text: text.to_string(),
            },
            &ParseOptions::default(),
        )
    }

    #[test]
    fn test_merge_combines_counts_and_repoints_conflicts() {
        // A conflicts with B and with C
        let bundle = bundle_from("ANNA\nHi.\nBETH\nHey.\nCARA\nYo.");
        let edits = vec![UserEdit::Merge {
            sources: vec!["BETH".to_string()],
            primary: "ANNA".to_string(),
        }];
        let out = apply_user_edits(bundle, &edits);

        assert_eq!(out.characters.len(), 2);
        let anna = out.character("ANNA").unwrap();
        assert_eq!(anna.replica_count, 2);
        // (ANNA,BETH) became a self-pair and vanished; (BETH,CARA) re-pointed
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.conflicts[0].a, "ANNA");
        assert_eq!(out.conflicts[0].b, "CARA");
        assert_eq!(out.metadata.total_replicas, 3);
    }

    #[test]
    fn test_merge_unknown_source_warns_and_continues() {
        let bundle = bundle_from("ANNA\nHi.");
        let edits = vec![UserEdit::Merge {
            sources: vec!["NOBODY".to_string()],
            primary: "ANNA".to_string(),
        }];
        let out = apply_user_edits(bundle, &edits);
        assert_eq!(out.characters.len(), 1);
        assert!(out.diagnostics.iter().any(|d| d.code == codes::UNKNOWN_EDIT_TARGET));
    }

    #[test]
    fn test_merge_variant_parent_repointed() {
        let bundle = bundle_from(
            "INT. A\nSARAH\nOne.\n\nINT. B\nSARAH OLDER\nTwo.\n\nINT. C\nSALLY\nThree.",
        );
        // Fold SARAH into SALLY; SARAH OLDER's parent follows
        let edits = vec![UserEdit::Merge {
            sources: vec!["SARAH".to_string()],
            primary: "SALLY".to_string(),
        }];
        let out = apply_user_edits(bundle, &edits);
        let older = out.character("SARAH OLDER").unwrap();
        assert_eq!(older.parent_normalized_name.as_deref(), Some("SALLY"));
    }

    #[test]
    fn test_merge_parent_into_variant_clears_self_parent() {
        let bundle = bundle_from("INT. A\nSARAH\nOne.\n\nINT. B\nSARAH OLDER\nTwo.");
        let edits = vec![UserEdit::Merge {
            sources: vec!["SARAH".to_string()],
            primary: "SARAH OLDER".to_string(),
        }];
        let out = apply_user_edits(bundle, &edits);
        let survivor = out.character("SARAH OLDER").unwrap();
        assert_eq!(survivor.parent_normalized_name, None);
        assert_eq!(survivor.kind, CharacterKind::Regular);
        assert_eq!(survivor.replica_count, 2);
    }

    #[test]
    fn test_delete_removes_conflicts_and_orphans_variants() {
        let bundle = bundle_from("INT. A\nSARAH\nOne.\nJOHN\nHi.\n\nINT. B\nSARAH OLDER\nTwo.");
        let out = apply_user_edits(
            bundle,
            &[UserEdit::Delete {
                target: "SARAH".to_string(),
            }],
        );
        assert!(out.character("SARAH").is_none());
        assert!(out.conflicts.is_empty());
        let older = out.character("SARAH OLDER").unwrap();
        assert_eq!(older.kind, CharacterKind::Regular);
        assert_eq!(older.parent_normalized_name, None);
        assert_eq!(out.metadata.total_replicas, 2);
    }

    #[test]
    fn test_rename_display_only() {
        let bundle = bundle_from("JOHN\nHi.");
        let out = apply_user_edits(
            bundle,
            &[UserEdit::Rename {
                target: "JOHN".to_string(),
                new_display: "John Smith".to_string(),
            }],
        );
        let c = out.character("JOHN SMITH").unwrap();
        assert_eq!(c.display_name, "John Smith");
        assert!(c.variants.contains(&"John Smith".to_string()));
    }

    #[test]
    fn test_rename_repoints_conflicts() {
        let bundle = bundle_from("ZED\nHi.\nANNA\nHey.");
        let out = apply_user_edits(
            bundle,
            &[UserEdit::Rename {
                target: "ZED".to_string(),
                new_display: "Aaron".to_string(),
            }],
        );
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.conflicts[0].a, "AARON");
        assert_eq!(out.conflicts[0].b, "ANNA");
    }

    #[test]
    fn test_rename_onto_existing_merges() {
        let bundle = bundle_from("JON\nHi.\nJOHN\nHey.");
        let out = apply_user_edits(
            bundle,
            &[UserEdit::Rename {
                target: "JON".to_string(),
                new_display: "John".to_string(),
            }],
        );
        assert_eq!(out.characters.len(), 1);
        let c = out.character("JOHN").unwrap();
        assert_eq!(c.replica_count, 2);
        assert_eq!(c.display_name, "John");
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn test_edits_apply_in_order() {
        let bundle = bundle_from("ANNA\nHi.\nBETH\nHey.");
        let out = apply_user_edits(
            bundle,
            &[
                UserEdit::Rename {
                    target: "ANNA".to_string(),
                    new_display: "Anna Banana".to_string(),
                },
                UserEdit::Merge {
                    sources: vec!["BETH".to_string()],
                    primary: "ANNA BANANA".to_string(),
                },
            ],
        );
        assert_eq!(out.characters.len(), 1);
        assert_eq!(out.character("ANNA BANANA").unwrap().replica_count, 2);
    }
}
