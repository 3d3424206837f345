//! Co-appearance extraction: every unordered pair of characters sharing a scene.
//!
//! Pairs are keyed by their canonicalized `(min, max)` form and accumulate
//! the set of shared scenes. A `BTreeMap` keeps the output ordering
//! deterministic without a separate sort. Scenes with an implausibly large
//! cast are capped at the first 200 distinct names — the pair count is
//! quadratic in cast size — with a warning recording what was dropped.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ConflictPair, Diagnostic, RawDialogue, codes};

/// Largest per-scene cast enumerated before capping.
const MAX_SCENE_CAST: usize = 200;

/// Build conflict pairs from the dialogue stream.
///
/// Only dialogues with a scene index participate; tabular rows carry no
/// scene structure and never conflict.
pub fn extract_conflicts(
    dialogues: &[RawDialogue],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ConflictPair> {
    // Scene -> distinct speakers in first-appearance order
    let mut scene_cast: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for d in dialogues {
        let Some(scene) = d.scene_index else {
            continue;
        };
        let cast = scene_cast.entry(scene).or_default();
        if !cast.contains(&d.speaker_normalized) {
            cast.push(d.speaker_normalized.clone());
        }
    }

    let mut pairs: BTreeMap<(String, String), BTreeSet<usize>> = BTreeMap::new();
    for (&scene, cast) in &scene_cast {
        let cast = if cast.len() > MAX_SCENE_CAST {
            diagnostics.push(Diagnostic::warning(
                codes::SCENE_CAST_CAPPED,
                format!(
                    "scene {} has {} characters; conflicts computed for the first {}",
                    scene,
                    cast.len(),
                    MAX_SCENE_CAST
                ),
            ));
            &cast[..MAX_SCENE_CAST]
        } else {
            &cast[..]
        };

        for (i, a) in cast.iter().enumerate() {
            for b in &cast[i + 1..] {
                let key = if a <= b {
                    (a.clone(), b.clone())
                } else {
                    (b.clone(), a.clone())
                };
                pairs.entry(key).or_default().insert(scene);
            }
        }
    }

    pairs
        .into_iter()
        .map(|((a, b), scenes)| ConflictPair { a, b, scenes })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogue(speaker: &str, scene: Option<usize>) -> RawDialogue {
        RawDialogue {
            scene_index: scene,
            speaker_raw: speaker.to_string(),
            speaker_normalized: speaker.to_string(),
            dialogue_lines: vec!["x".to_string()],
            cue_line: 1,
            group: false,
        }
    }

    #[test]
    fn test_pair_per_shared_scene() {
        let ds = vec![dialogue("JOHN", Some(0)), dialogue("MARY", Some(0))];
        let mut diags = Vec::new();
        let pairs = extract_conflicts(&ds, &mut diags);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].a, "JOHN");
        assert_eq!(pairs[0].b, "MARY");
        assert_eq!(pairs[0].scenes, BTreeSet::from([0]));
    }

    #[test]
    fn test_endpoints_ordered_and_unique() {
        let ds = vec![
            dialogue("MARY", Some(0)),
            dialogue("JOHN", Some(0)),
            dialogue("MARY", Some(1)),
            dialogue("JOHN", Some(1)),
        ];
        let mut diags = Vec::new();
        let pairs = extract_conflicts(&ds, &mut diags);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].a < pairs[0].b);
        assert_eq!(pairs[0].scenes, BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_no_pair_across_scenes() {
        let ds = vec![dialogue("SARAH", Some(0)), dialogue("SARAH OLDER", Some(1))];
        let mut diags = Vec::new();
        let pairs = extract_conflicts(&ds, &mut diags);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_sceneless_dialogues_ignored() {
        let ds = vec![dialogue("JOHN", None), dialogue("MARY", None)];
        let mut diags = Vec::new();
        assert!(extract_conflicts(&ds, &mut diags).is_empty());
    }

    #[test]
    fn test_same_speaker_never_self_pairs() {
        let ds = vec![dialogue("JOHN", Some(0)), dialogue("JOHN", Some(0))];
        let mut diags = Vec::new();
        assert!(extract_conflicts(&ds, &mut diags).is_empty());
    }

    #[test]
    fn test_three_way_scene() {
        let ds = vec![
            dialogue("A", Some(0)),
            dialogue("B", Some(0)),
            dialogue("C", Some(0)),
        ];
        let mut diags = Vec::new();
        let pairs = extract_conflicts(&ds, &mut diags);
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn test_scene_cast_cap() {
        let ds: Vec<RawDialogue> = (0..201)
            .map(|i| dialogue(&format!("C{i:03}"), Some(0)))
            .collect();
        let mut diags = Vec::new();
        let pairs = extract_conflicts(&ds, &mut diags);
        assert_eq!(pairs.len(), 200 * 199 / 2);
        assert!(diags.iter().any(|d| d.code == codes::SCENE_CAST_CAPPED));
    }
}
