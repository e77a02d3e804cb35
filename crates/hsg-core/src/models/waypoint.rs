use serde::{Deserialize, Serialize};

/// A directed, weighted edge between two memories, or between a memory and
/// a virtual sector-tag node (see [`virtual_node`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub src_id: String,
    pub dst_id: String,
    pub tenant: Option<String>,
    pub weight: f64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Waypoint {
    pub fn new(src_id: String, dst_id: String, tenant: Option<String>, weight: f64, now_ms: i64) -> Self {
        Self {
            src_id,
            dst_id,
            tenant,
            weight: weight.clamp(0.0, 1.0),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Multiplicative Hebbian-style reinforcement, bounded above by 1.0.
    pub fn reinforce(&mut self, boost: f64, now_ms: i64) {
        self.weight = (self.weight * (1.0 + boost)).min(1.0);
        self.updated_at_ms = now_ms;
    }

    pub fn is_self_loop(&self) -> bool {
        self.src_id == self.dst_id
    }
}

/// The virtual node id for a memory's link to one of its additional
/// sectors, e.g. `"<id>:emotional"`.
pub fn virtual_node(id: &str, sector: &str) -> String {
    format!("{id}:{sector}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinforce_never_exceeds_one() {
        let mut w = Waypoint::new("a".into(), "b".into(), None, 0.9, 0);
        w.reinforce(0.5, 100);
        assert!(w.weight <= 1.0);
    }

    #[test]
    fn virtual_node_format() {
        assert_eq!(virtual_node("abc", "emotional"), "abc:emotional");
    }
}
