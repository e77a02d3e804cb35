//! Keyword/regex classifier: maps content to a [`SectorClassification`]
//! without needing an embedding. `semantic` is the default when nothing
//! else matches.

use regex::Regex;
use std::sync::OnceLock;

use super::SectorClassification;
use crate::config::Sector;

struct SectorPattern {
    sector: &'static str,
    regex: Regex,
}

/// Declared sector order, used to break ties: earlier wins.
const SECTOR_ORDER: &[&str] = &["semantic", "emotional", "procedural", "episodic", "reflective"];

static PATTERNS: OnceLock<Vec<SectorPattern>> = OnceLock::new();

fn patterns() -> &'static [SectorPattern] {
    PATTERNS
        .get_or_init(|| {
            let raw: &[(&str, &str)] = &[
                (
                    "emotional",
                    r"(?i)\b(feel|felt|feeling|love|hate|afraid|scared|happy|sad|angry|anxious|grateful|proud|excited|worried)\b",
                ),
                (
                    "procedural",
                    r"(?i)\b(how to|step \d|first,|then,|install|configure|run the|execute|procedure|instructions?)\b",
                ),
                (
                    "episodic",
                    r"(?i)\b(yesterday|today|last (week|month|year)|on \w+day|at \d{1,2}(:\d{2})?\s?(am|pm)?|happened|went to|visited)\b",
                ),
                (
                    "reflective",
                    r"(?i)\b(i (think|believe|realize[d]?|wonder)|in retrospect|looking back|i learned|insight)\b",
                ),
            ];
            raw.iter()
                .filter_map(|(sector, pattern)| match Regex::new(pattern) {
                    Ok(regex) => Some(SectorPattern { sector, regex }),
                    Err(e) => {
                        tracing::warn!(sector, pattern, error = %e, "failed to compile sector pattern");
                        None
                    }
                })
                .collect()
        })
        .as_slice()
}

/// Classify content against the compiled sector pattern tables. Score per
/// sector is the longest keyword match length found; ties break on
/// declared sector order. `additional` holds sectors scoring at least 40%
/// of the primary's score.
pub fn classify(content: &str) -> SectorClassification {
    let mut scores: Vec<(&str, usize)> = Vec::new();

    for pat in patterns() {
        let mut best_len = 0usize;
        for m in pat.regex.find_iter(content) {
            best_len = best_len.max(m.as_str().len());
        }
        if best_len > 0 {
            scores.push((pat.sector, best_len));
        }
    }

    if scores.is_empty() {
        return SectorClassification::default_semantic();
    }

    scores.sort_by(|a, b| {
        b.1.cmp(&a.1).then_with(|| {
            let ia = SECTOR_ORDER.iter().position(|s| *s == a.0).unwrap_or(usize::MAX);
            let ib = SECTOR_ORDER.iter().position(|s| *s == b.0).unwrap_or(usize::MAX);
            ia.cmp(&ib)
        })
    });

    let (primary_name, primary_score) = scores[0];
    let additional: Vec<Sector> = scores[1..]
        .iter()
        .filter(|(_, score)| (*score as f64) >= 0.4 * primary_score as f64)
        .map(|(name, _)| Sector::new(*name))
        .collect();

    SectorClassification {
        primary: Sector::new(primary_name),
        additional,
        confidence: 1.0,
    }
}
