//! A minimal PGN record.
//!
//! The arbiter only needs to accumulate tag pairs and commented moves and
//! render them; full PGN parsing stays with the opening-suite collaborator.

use std::fmt::Write as _;

use crate::types::{GameResult, Side};

/// Rendering mode for [`PgnGame::render`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PgnMode {
    /// All tags and move comments.
    Verbose,
    /// Seven-tag roster, no comments.
    Minimal,
}

#[derive(Clone, Debug)]
pub struct PgnMove {
    pub san: String,
    pub comment: String,
}

/// One game's worth of PGN data.
#[derive(Clone, Debug, Default)]
pub struct PgnGame {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    pub variant: String,
    pub starting_fen: Option<String>,
    pub starting_side: Option<Side>,
    result: String,
    tags: Vec<(String, String)>,
    moves: Vec<PgnMove>,
}

impl PgnGame {
    pub fn new() -> PgnGame {
        PgnGame {
            result: "*".to_string(),
            ..PgnGame::default()
        }
    }

    pub fn set_result(&mut self, result: &GameResult) {
        self.result = result.score_string().to_string();
    }

    pub fn result_string(&self) -> &str {
        &self.result
    }

    /// Sets or replaces an auxiliary tag (outside the seven-tag roster).
    pub fn set_tag(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(tag) = self.tags.iter_mut().find(|(n, _)| n == name) {
            tag.1 = value;
        } else {
            self.tags.push((name.to_string(), value));
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn add_move(&mut self, san: impl Into<String>, comment: impl Into<String>) {
        self.moves.push(PgnMove {
            san: san.into(),
            comment: comment.into(),
        });
    }

    pub fn moves(&self) -> &[PgnMove] {
        &self.moves
    }

    pub fn render(&self, mode: PgnMode) -> String {
        let mut out = String::new();
        let tag = |out: &mut String, name: &str, value: &str| {
            let _ = writeln!(out, "[{} \"{}\"]", name, value.replace('"', "\\\""));
        };

        tag(&mut out, "Event", if self.event.is_empty() { "?" } else { &self.event });
        tag(&mut out, "Site", if self.site.is_empty() { "?" } else { &self.site });
        tag(&mut out, "Date", if self.date.is_empty() { "????.??.??" } else { &self.date });
        tag(&mut out, "Round", if self.round.is_empty() { "?" } else { &self.round });
        tag(&mut out, "White", if self.white.is_empty() { "?" } else { &self.white });
        tag(&mut out, "Black", if self.black.is_empty() { "?" } else { &self.black });
        tag(&mut out, "Result", &self.result);

        if mode == PgnMode::Verbose {
            if !self.variant.is_empty() && self.variant != "standard" {
                tag(&mut out, "Variant", &self.variant);
            }
            if let Some(fen) = &self.starting_fen {
                tag(&mut out, "SetUp", "1");
                tag(&mut out, "FEN", fen);
            }
            for (name, value) in &self.tags {
                tag(&mut out, name, value);
            }
        }
        out.push('\n');

        let mut line_len = 0usize;
        let mut push_token = |out: &mut String, token: &str| {
            if line_len + token.len() + 1 > 80 && line_len > 0 {
                out.push('\n');
                line_len = 0;
            } else if line_len > 0 {
                out.push(' ');
                line_len += 1;
            }
            out.push_str(token);
            line_len += token.len();
        };

        let mut number = 1u32;
        let mut white_to_move = !matches!(self.starting_side, Some(Side::Black));
        for (i, mv) in self.moves.iter().enumerate() {
            if white_to_move {
                push_token(&mut out, &format!("{}.", number));
            } else if i == 0 {
                push_token(&mut out, &format!("{}...", number));
            }
            push_token(&mut out, &mv.san);
            if mode == PgnMode::Verbose && !mv.comment.is_empty() {
                push_token(&mut out, &format!("{{{}}}", mv.comment));
            }
            if !white_to_move {
                number += 1;
            }
            white_to_move = !white_to_move;
        }
        push_token(&mut out, &self.result);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultKind;

    #[test]
    fn renders_the_seven_tag_roster() {
        let mut pgn = PgnGame::new();
        pgn.white = "alpha".to_string();
        pgn.black = "beta".to_string();
        pgn.add_move("e4", "d=12, wv=0.25");
        pgn.add_move("e5", "");
        pgn.set_result(&GameResult::win(Side::White, ResultKind::Normal, ""));

        let out = pgn.render(PgnMode::Verbose);
        assert!(out.contains("[Event \"?\"]"));
        assert!(out.contains("[White \"alpha\"]"));
        assert!(out.contains("[Result \"1-0\"]"));
        assert!(out.contains("1. e4 {d=12, wv=0.25} e5"));
        assert!(out.trim_end().ends_with("1-0"));
    }

    #[test]
    fn minimal_mode_drops_comments_and_extra_tags() {
        let mut pgn = PgnGame::new();
        pgn.set_tag("PlyCount", "2");
        pgn.add_move("e4", "book");
        pgn.add_move("e5", "book");

        let out = pgn.render(PgnMode::Minimal);
        assert!(!out.contains("book"));
        assert!(!out.contains("PlyCount"));
        assert!(out.contains("1. e4 e5 *"));
    }

    #[test]
    fn black_to_move_start_gets_continuation_number() {
        let mut pgn = PgnGame::new();
        pgn.starting_side = Some(Side::Black);
        pgn.add_move("e5", "");
        pgn.add_move("Nf3", "");

        let out = pgn.render(PgnMode::Minimal);
        assert!(out.contains("1... e5 2. Nf3"));
    }

    #[test]
    fn set_tag_replaces_existing_values() {
        let mut pgn = PgnGame::new();
        pgn.set_tag("PlyCount", "10");
        pgn.set_tag("PlyCount", "12");
        assert_eq!(pgn.tag("PlyCount"), Some("12"));
    }
}
