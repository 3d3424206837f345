//! Screenplay state machine: tokens in, attributed dialogue out.
//!
//! # Architecture overview
//!
//! The machine walks the token stream once, carrying one of four states:
//!
//! ```text
//! Outside ──SCENE──▶ InScene ──CUE──▶ Speaking ──PAREN──▶ Paren
//!    ▲                  ▲                │  ▲                │
//!    └──TRANSITION──────┴──BLANK/ACTION──┘  └────DIALOGUE────┘
//! ```
//!
//! Every dialogue line is attributed to the speaker of the open block; a
//! blank line, an action line, a scene heading, a transition, or a new cue
//! closes the block and emits one `RawDialogue` per speaker. End of input
//! behaves like a final blank line.
//!
//! Edge policies:
//! - a cue immediately followed by a blank or another cue still emits a
//!   `RawDialogue` with no lines (scene presence without replicas)
//! - dual cues (`JOHN / MARY`, `JOHN & MARY`, `JOHN AND MARY`) emit one
//!   `RawDialogue` per name, each carrying the full dialogue block
//! - dialogue arriving with no open block is attributed to a synthetic
//!   unknown speaker: recorded as a diagnostic, excluded from the cast

use crate::model::{Diagnostic, RawDialogue, Scene, Token, TokenKind, codes};
use crate::normalize::normalize_name;
use crate::tokenizer::{strip_cue_extensions, strip_group_marker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Outside,
    InScene,
    Speaking,
    Paren,
}

/// One speaker block under construction.
struct OpenBlock {
    /// `(raw, normalized)` per speaker; more than one for dual cues.
    speakers: Vec<(String, String)>,
    group: bool,
    lines: Vec<String>,
    cue_line: usize,
}

/// Everything the state machine produces for one document.
#[derive(Debug, Default)]
pub struct ScreenplayParse {
    pub dialogues: Vec<RawDialogue>,
    pub scenes: Vec<Scene>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the state machine over a classified token stream.
pub fn parse_screenplay(tokens: &[Token]) -> ScreenplayParse {
    Machine::default().run(tokens)
}

#[derive(Default)]
struct Machine {
    state: State,
    out: ScreenplayParse,
    block: Option<OpenBlock>,
    current_scene: Option<usize>,
}

impl Machine {
    fn run(mut self, tokens: &[Token]) -> ScreenplayParse {
        for token in tokens {
            match token.kind {
                TokenKind::Blank => {
                    if matches!(self.state(), State::Speaking | State::Paren) {
                        self.close_block();
                        self.set_state(State::InScene);
                    }
                }
                TokenKind::SceneHeading => {
                    self.close_block();
                    self.open_scene(Some(token.trimmed.clone()), token.line_number);
                    self.set_state(State::InScene);
                }
                TokenKind::Transition => {
                    self.close_block();
                    self.set_state(State::Outside);
                }
                TokenKind::Action => {
                    self.close_block();
                    if matches!(self.state(), State::Speaking | State::Paren) {
                        self.set_state(State::InScene);
                    }
                }
                TokenKind::CharacterCue => {
                    self.close_block();
                    self.start_block(token);
                }
                TokenKind::Parenthetical => {
                    if self.state() == State::Speaking {
                        self.set_state(State::Paren);
                    }
                    // Outside a speaking block a parenthetical is stage
                    // direction; nothing to attribute
                }
                TokenKind::Dialogue => match self.state() {
                    State::Speaking => self.append_line(&token.trimmed),
                    State::Paren => {
                        self.append_line(&token.trimmed);
                        self.set_state(State::Speaking);
                    }
                    State::Outside | State::InScene => {
                        self.out.diagnostics.push(
                            Diagnostic::warning(
                                codes::ORPHAN_DIALOGUE,
                                format!("dialogue with no speaker: {:?}", token.trimmed),
                            )
                            .at_line(token.line_number),
                        );
                    }
                },
            }
        }

        // End of input acts as a final blank line
        if self.state() == State::Paren {
            self.out.diagnostics.push(Diagnostic::warning(
                codes::UNTERMINATED_BLOCK,
                "parenthetical block open at end of input",
            ));
        }
        self.close_block();
        self.out
    }

    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, s: State) {
        self.state = s;
    }

    fn open_scene(&mut self, heading: Option<String>, start_line: usize) {
        let index = self.out.scenes.len();
        self.out.scenes.push(Scene {
            index,
            heading,
            start_line,
        });
        self.current_scene = Some(index);
    }

    /// Scene for the next emitted block, creating the synthetic opening
    /// scene when content appears before any heading.
    fn scene_for_content(&mut self, line: usize) -> usize {
        match self.current_scene {
            Some(idx) => idx,
            None => {
                self.open_scene(None, line);
                0
            }
        }
    }

    fn start_block(&mut self, token: &Token) {
        let without_ext = strip_cue_extensions(&token.trimmed);
        let (base, group) = strip_group_marker(&without_ext);

        let speakers: Vec<(String, String)> = split_dual_cue(&base)
            .into_iter()
            .filter_map(|raw| {
                let normalized = normalize_name(&raw);
                if normalized.is_empty() {
                    None
                } else {
                    Some((raw, normalized))
                }
            })
            .collect();

        if speakers.is_empty() {
            // Nothing nameable on the cue line; treat like action
            if matches!(self.state(), State::Speaking | State::Paren) {
                self.set_state(State::InScene);
            }
            return;
        }

        self.block = Some(OpenBlock {
            speakers,
            group,
            lines: Vec::new(),
            cue_line: token.line_number,
        });
        self.set_state(State::Speaking);
    }

    fn append_line(&mut self, line: &str) {
        if let Some(block) = self.block.as_mut() {
            block.lines.push(line.to_string());
        }
    }

    fn close_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        let scene = self.scene_for_content(block.cue_line);
        for (raw, normalized) in block.speakers {
            self.out.dialogues.push(RawDialogue {
                scene_index: Some(scene),
                speaker_raw: raw,
                speaker_normalized: normalized,
                dialogue_lines: block.lines.clone(),
                cue_line: block.cue_line,
                group: block.group,
            });
        }
    }
}

/// Split a cue naming several speakers into its parts.
fn split_dual_cue(base: &str) -> Vec<String> {
    let unified = base.replace(" AND ", "/").replace('&', "/");
    unified
        .split('/')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{DEFAULT_SCENE_PREFIXES, tokenize};

    fn parse(text: &str) -> ScreenplayParse {
        let prefixes: Vec<String> =
            DEFAULT_SCENE_PREFIXES.iter().map(|s| s.to_string()).collect();
        parse_screenplay(&tokenize(text, &prefixes))
    }

    #[test]
    fn test_minimal_screenplay() {
        let out = parse("INT. ROOM - DAY\nJOHN\nHello.\nMARY\nHi.");
        assert_eq!(out.scenes.len(), 1);
        assert_eq!(out.scenes[0].index, 0);
        assert_eq!(out.dialogues.len(), 2);
        assert_eq!(out.dialogues[0].speaker_normalized, "JOHN");
        assert_eq!(out.dialogues[0].dialogue_lines, vec!["Hello."]);
        assert_eq!(out.dialogues[0].scene_index, Some(0));
        assert_eq!(out.dialogues[1].speaker_normalized, "MARY");
        assert_eq!(out.dialogues[1].dialogue_lines, vec!["Hi."]);
    }

    #[test]
    fn test_synthetic_scene_zero() {
        let out = parse("JOHN\nHello.");
        assert_eq!(out.scenes.len(), 1);
        assert_eq!(out.scenes[0].heading, None);
        assert_eq!(out.dialogues[0].scene_index, Some(0));
    }

    #[test]
    fn test_heading_after_content_opens_scene_one() {
        let out = parse("JOHN\nHello.\n\nINT. HALL - NIGHT\nMARY\nHi.");
        assert_eq!(out.scenes.len(), 2);
        assert_eq!(out.scenes[0].heading, None);
        assert_eq!(out.scenes[1].heading.as_deref(), Some("INT. HALL - NIGHT"));
        assert_eq!(out.dialogues[1].scene_index, Some(1));
    }

    #[test]
    fn test_dual_speaker_cue() {
        let out = parse("JANE / KATE\nWe agree.");
        assert_eq!(out.dialogues.len(), 2);
        assert_eq!(out.dialogues[0].speaker_normalized, "JANE");
        assert_eq!(out.dialogues[1].speaker_normalized, "KATE");
        assert_eq!(out.dialogues[0].dialogue_lines, vec!["We agree."]);
        assert_eq!(out.dialogues[1].dialogue_lines, vec!["We agree."]);
    }

    #[test]
    fn test_dual_speaker_and_separator() {
        let out = parse("JOHN AND MARY\nTogether!");
        let names: Vec<&str> = out
            .dialogues
            .iter()
            .map(|d| d.speaker_normalized.as_str())
            .collect();
        assert_eq!(names, vec!["JOHN", "MARY"]);
    }

    #[test]
    fn test_cue_only_appearance() {
        let out = parse("JOHN\n\nMARY\nHi.");
        assert_eq!(out.dialogues.len(), 2);
        assert_eq!(out.dialogues[0].speaker_normalized, "JOHN");
        assert!(out.dialogues[0].dialogue_lines.is_empty());
    }

    #[test]
    fn test_contd_folds_into_base_key() {
        let out = parse("JOHN\nHello.\n\nJOHN (CONT'D)\nStill me.");
        assert_eq!(out.dialogues.len(), 2);
        assert_eq!(out.dialogues[0].speaker_normalized, "JOHN");
        assert_eq!(out.dialogues[1].speaker_normalized, "JOHN");
    }

    #[test]
    fn test_group_marker() {
        let out = parse("SOLDIERS (ALL)\nYes sir!");
        assert_eq!(out.dialogues.len(), 1);
        assert_eq!(out.dialogues[0].speaker_normalized, "SOLDIERS");
        assert!(out.dialogues[0].group);
    }

    #[test]
    fn test_parenthetical_not_counted_as_line() {
        let out = parse("JOHN\n(whispering)\nCome here.");
        assert_eq!(out.dialogues.len(), 1);
        assert_eq!(out.dialogues[0].dialogue_lines, vec!["Come here."]);
    }

    #[test]
    fn test_multi_line_dialogue_runs_to_blank() {
        let out = parse("JOHN\nHello.\nIt has been a while.\n\nthe door slams");
        assert_eq!(out.dialogues.len(), 1);
        assert_eq!(
            out.dialogues[0].dialogue_lines,
            vec!["Hello.", "It has been a while."]
        );
    }

    #[test]
    fn test_orphan_dialogue_recorded_not_attributed() {
        let out = parse("INT. ROOM - DAY\n(beat)\nwho said this?");
        assert!(out.dialogues.is_empty());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].code, codes::ORPHAN_DIALOGUE);
    }

    #[test]
    fn test_eof_closes_open_block() {
        let out = parse("JOHN\nHello there");
        assert_eq!(out.dialogues.len(), 1);
        assert_eq!(out.dialogues[0].dialogue_lines, vec!["Hello there"]);
    }

    #[test]
    fn test_transition_closes_all() {
        let out = parse("JOHN\nHello.\nCUT TO:\nMARY\nHi.");
        assert_eq!(out.dialogues.len(), 2);
        assert_eq!(out.dialogues[0].dialogue_lines, vec!["Hello."]);
        assert_eq!(out.dialogues[1].speaker_normalized, "MARY");
    }

    #[test]
    fn test_scene_span_multiple_speakers() {
        let out = parse(
            "INT. A - DAY\nJOHN\nHi.\n\nMARY\nHey.\n\nINT. B - DAY\nJOHN\nBack again.",
        );
        assert_eq!(out.scenes.len(), 2);
        assert_eq!(out.dialogues[0].scene_index, Some(0));
        assert_eq!(out.dialogues[1].scene_index, Some(0));
        assert_eq!(out.dialogues[2].scene_index, Some(1));
    }
}
