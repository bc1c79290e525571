//! Opening classification (ECO codes).
//!
//! The catalog is a process-wide read-only table installed once during
//! startup; classification is a longest-prefix match over the game's SAN
//! move sequence.

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq)]
pub struct EcoEntry {
    pub code: String,
    pub opening: String,
    pub variation: String,
}

/// Prefix tree over SAN move sequences.
#[derive(Default)]
pub struct EcoCatalog {
    root: EcoNode,
}

#[derive(Default)]
struct EcoNode {
    entry: Option<EcoEntry>,
    children: HashMap<String, EcoNode>,
}

impl EcoCatalog {
    /// Parses a catalog from tab-separated lines:
    /// `code<TAB>opening<TAB>variation<TAB>move move move...`.
    /// Malformed lines are skipped.
    pub fn from_tsv(data: &str) -> EcoCatalog {
        let mut catalog = EcoCatalog::default();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (code, opening, variation, moves) = match (
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
            ) {
                (Some(c), Some(o), Some(v), Some(m)) => (c, o, v, m),
                _ => continue,
            };
            catalog.insert(
                moves.split_whitespace(),
                EcoEntry {
                    code: code.to_string(),
                    opening: opening.to_string(),
                    variation: variation.to_string(),
                },
            );
        }
        catalog
    }

    fn insert<'a>(&mut self, moves: impl Iterator<Item = &'a str>, entry: EcoEntry) {
        let mut node = &mut self.root;
        for mv in moves {
            node = node.children.entry(mv.to_string()).or_default();
        }
        node.entry = Some(entry);
    }

    /// The deepest catalog entry whose move sequence prefixes `moves`.
    pub fn classify(&self, moves: &[String]) -> Option<&EcoEntry> {
        let mut node = &self.root;
        let mut best = node.entry.as_ref();
        for mv in moves {
            match node.children.get(mv.as_str()) {
                Some(child) => {
                    node = child;
                    if node.entry.is_some() {
                        best = node.entry.as_ref();
                    }
                }
                None => break,
            }
        }
        best
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }
}

static CATALOG: OnceLock<EcoCatalog> = OnceLock::new();

/// Installs the process-wide catalog. Later calls are ignored.
pub fn install(catalog: EcoCatalog) {
    let _ = CATALOG.set(catalog);
}

/// The installed catalog, or an empty one.
pub fn catalog() -> &'static EcoCatalog {
    CATALOG.get_or_init(EcoCatalog::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EcoCatalog {
        EcoCatalog::from_tsv(
            "B00\tKing's Pawn\t\te4\n\
             C20\tKing's Pawn Game\t\te4 e5\n\
             C60\tRuy Lopez\t\te4 e5 Nf3 Nc6 Bb5\n\
             C65\tRuy Lopez\tBerlin Defence\te4 e5 Nf3 Nc6 Bb5 Nf6\n",
        )
    }

    fn moves(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn longest_prefix_wins() {
        let catalog = sample();
        let entry = catalog
            .classify(&moves("e4 e5 Nf3 Nc6 Bb5 Nf6 O-O"))
            .unwrap();
        assert_eq!(entry.code, "C65");
        assert_eq!(entry.variation, "Berlin Defence");

        let entry = catalog.classify(&moves("e4 e5 Nf3 Nc6 Bb5 a6")).unwrap();
        assert_eq!(entry.code, "C60");
    }

    #[test]
    fn unknown_line_falls_back_to_shorter_prefix() {
        let catalog = sample();
        let entry = catalog.classify(&moves("e4 c5")).unwrap();
        assert_eq!(entry.code, "B00");
        assert!(catalog.classify(&moves("d4 d5")).is_none());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let catalog = EcoCatalog::from_tsv("oops\n\nA00\tIrregular\t\ta3\n");
        assert!(!catalog.is_empty());
        assert_eq!(catalog.classify(&moves("a3")).unwrap().code, "A00");
    }
}
