//! Character aggregation: raw dialogue events into a deduplicated cast.
//!
//! Grouping is by the normalized identity key from `normalize::normalize_name`.
//! Characters keep first-insertion order — the aggregation map is a `Vec`
//! plus an index, never a hash map iterated directly — so two runs over
//! identical input produce byte-identical bundles.
//!
//! After grouping, two classification passes run in a fixed order: group
//! promotion from cue markers first, then variant detection by suffix.
//! A group is never re-tagged as a variant, and a variant's parent is
//! resolved through any intermediate variant so the parent link always
//! lands on a regular or group character.

use std::collections::HashMap;

use crate::model::{Character, CharacterKind, RawDialogue};

/// Suffixes (on normalized keys) that mark a derivative of a base character.
const VARIANT_SUFFIXES: [&str; 7] = [" OLDER", " YOUNGER", " CHILD", " VO", " OS", " 2", " II"];

/// Fold a stream of raw dialogues into aggregated characters.
pub fn aggregate(dialogues: &[RawDialogue]) -> Vec<Character> {
    let mut characters: Vec<Character> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    // Per character: surface form -> (occurrences, first-seen order)
    let mut surface_counts: Vec<HashMap<String, (u32, usize)>> = Vec::new();

    for (seen, d) in dialogues.iter().enumerate() {
        let idx = match index.get(&d.speaker_normalized) {
            Some(&i) => i,
            None => {
                let i = characters.len();
                index.insert(d.speaker_normalized.clone(), i);
                characters.push(Character {
                    display_name: d.speaker_raw.clone(),
                    normalized_name: d.speaker_normalized.clone(),
                    replica_count: 0,
                    variants: Vec::new(),
                    kind: CharacterKind::Regular,
                    parent_normalized_name: None,
                    scenes_present: Default::default(),
                });
                surface_counts.push(HashMap::new());
                i
            }
        };

        let c = &mut characters[idx];
        c.replica_count += d.dialogue_lines.len() as u32;
        if let Some(scene) = d.scene_index {
            c.scenes_present.insert(scene);
        }
        if d.group {
            c.kind = CharacterKind::Group;
        }

        let counts = &mut surface_counts[idx];
        let entry = counts.entry(d.speaker_raw.clone()).or_insert((0, seen));
        entry.0 += 1;
        if !c.variants.contains(&d.speaker_raw) {
            c.variants.push(d.speaker_raw.clone());
        }
    }

    for (c, counts) in characters.iter_mut().zip(&surface_counts) {
        c.display_name = pick_display_name(counts);
    }

    detect_variants(&mut characters, &index);
    characters
}

/// Most frequent surface form; the earliest-seen form breaks ties.
fn pick_display_name(counts: &HashMap<String, (u32, usize)>) -> String {
    counts
        .iter()
        .min_by_key(|&(_, &(count, first_seen))| (std::cmp::Reverse(count), first_seen))
        .map(|(name, _)| name.clone())
        .unwrap_or_default()
}

fn detect_variants(characters: &mut [Character], index: &HashMap<String, usize>) {
    // Two passes: pick parents first against the pre-tagging kinds, then
    // chase parent links so no variant ends up parenting another
    let mut parents: Vec<Option<String>> = vec![None; characters.len()];

    for (i, c) in characters.iter().enumerate() {
        if c.kind == CharacterKind::Group {
            continue;
        }
        for suffix in VARIANT_SUFFIXES {
            if let Some(base) = c.normalized_name.strip_suffix(suffix)
                && !base.is_empty()
                && index.contains_key(base)
            {
                parents[i] = Some(base.to_string());
                break;
            }
        }
    }

    for i in 0..characters.len() {
        let Some(mut parent) = parents[i].clone() else {
            continue;
        };
        // Resolve through intermediate variants (e.g. SARAH OLDER 2)
        while let Some(&p) = index.get(&parent) {
            match &parents[p] {
                Some(next) => parent = next.clone(),
                None => break,
            }
        }
        characters[i].kind = CharacterKind::Variant;
        characters[i].parent_normalized_name = Some(parent);
    }
}
