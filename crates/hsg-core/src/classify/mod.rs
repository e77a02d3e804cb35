//! Content classification: a fast rule-based pass, refined for ambiguous
//! content by a per-tenant learned classifier.

pub mod learned;
pub mod rule_based;

use crate::config::Sector;

/// The result of classifying a piece of content.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorClassification {
    pub primary: Sector,
    pub additional: Vec<Sector>,
    pub confidence: f64,
}

impl SectorClassification {
    pub fn default_semantic() -> Self {
        Self {
            primary: Sector::semantic(),
            additional: Vec::new(),
            confidence: 1.0,
        }
    }

    pub fn is_default_semantic(&self) -> bool {
        self.primary == Sector::semantic() && self.additional.is_empty()
    }
}

/// Consults a per-tenant learned classifier only when the rule-based pass
/// fell through to its default (`semantic`, no additional sectors) —
/// content the keyword patterns had no opinion on. Overrides only when
/// the model's top prediction clears `override_threshold`; otherwise the
/// rule-based result stands.
pub fn refine_with_learned(
    rule_based: SectorClassification,
    learned: Option<SectorClassification>,
    override_threshold: f64,
) -> SectorClassification {
    if !rule_based.is_default_semantic() {
        return rule_based;
    }
    match learned {
        Some(prediction) if prediction.confidence > override_threshold => prediction,
        _ => rule_based,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_rule_based_when_not_default_semantic() {
        let rule = SectorClassification {
            primary: Sector::new("emotional"),
            additional: vec![],
            confidence: 1.0,
        };
        let learned = SectorClassification {
            primary: Sector::new("procedural"),
            additional: vec![],
            confidence: 0.99,
        };
        let result = refine_with_learned(rule.clone(), Some(learned), 0.5);
        assert_eq!(result, rule);
    }

    #[test]
    fn overrides_default_semantic_above_threshold() {
        let rule = SectorClassification::default_semantic();
        let learned = SectorClassification {
            primary: Sector::new("reflective"),
            additional: vec![],
            confidence: 0.8,
        };
        let result = refine_with_learned(rule, Some(learned.clone()), 0.6);
        assert_eq!(result, learned);
    }

    #[test]
    fn keeps_default_semantic_below_threshold() {
        let rule = SectorClassification::default_semantic();
        let learned = SectorClassification {
            primary: Sector::new("reflective"),
            additional: vec![],
            confidence: 0.3,
        };
        let result = refine_with_learned(rule.clone(), Some(learned), 0.6);
        assert_eq!(result, rule);
    }

    #[test]
    fn keeps_default_semantic_with_no_model() {
        let rule = SectorClassification::default_semantic();
        let result = refine_with_learned(rule.clone(), None, 0.6);
        assert_eq!(result, rule);
    }
}
