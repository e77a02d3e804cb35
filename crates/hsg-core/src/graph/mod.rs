//! Waypoint maintenance: multiplicative reinforcement along a path,
//! spreading activation from a candidate set, and threshold pruning.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::Result;
use crate::persistence::PersistenceStore;

/// Spreading-activation decay factor applied at each hop.
const HOP_DECAY: f64 = 0.8;
/// Activation weight floor: traversal stops enqueueing below this.
const MIN_WEIGHT: f64 = 0.1;
/// Maximum BFS depth from any seed.
const MAX_LEVEL: u32 = 3;
/// Hard iteration cap, independent of level/weight, so a dense graph
/// can't spin the traversal forever.
const MAX_ITERATIONS: u32 = 100;

/// A reached node's best (max-weight) activation path from the seed set.
#[derive(Debug, Clone)]
pub struct Activation {
    pub weight: f64,
    pub path: Vec<String>,
}

/// BFS-like spreading activation seeded from `seeds` simultaneously. Each
/// reached node keeps only its max-weight path; paths never repeat a
/// node (cycle-free).
pub async fn spreading_activation(
    store: &dyn PersistenceStore,
    seeds: &[String],
    tenant: Option<&str>,
) -> Result<HashMap<String, Activation>> {
    let mut best: HashMap<String, Activation> = HashMap::new();
    let mut queue: VecDeque<(String, u32, f64, Vec<String>)> = VecDeque::new();

    for seed in seeds {
        queue.push_back((seed.clone(), 0, 1.0, vec![seed.clone()]));
    }

    let mut iterations = 0u32;
    while let Some((node, level, weight, path)) = queue.pop_front() {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            break;
        }

        let improves = best
            .get(&node)
            .map(|existing| weight > existing.weight)
            .unwrap_or(true);
        if improves {
            best.insert(
                node.clone(),
                Activation {
                    weight,
                    path: path.clone(),
                },
            );
        }

        if level >= MAX_LEVEL {
            continue;
        }

        let edges = store.get_waypoints_by_src(&node, tenant).await?;
        for edge in edges {
            let new_weight = weight * edge.weight * HOP_DECAY;
            if new_weight < MIN_WEIGHT {
                continue;
            }
            if path.contains(&edge.dst_id) {
                continue;
            }
            let mut new_path = path.clone();
            new_path.push(edge.dst_id.clone());
            queue.push_back((edge.dst_id, level + 1, new_weight, new_path));
        }
    }

    Ok(best)
}

/// Multiplicatively reinforce every existing edge along consecutive pairs
/// of `path`. Edges that don't exist are left uncreated.
pub async fn reinforce_waypoints(
    store: &dyn PersistenceStore,
    path: &[String],
    boost: f64,
    tenant: Option<&str>,
    now_ms: i64,
) -> Result<()> {
    for pair in path.windows(2) {
        let (src, dst) = (&pair[0], &pair[1]);
        if let Some(mut edge) = store.get_waypoint(src, dst, tenant).await? {
            edge.reinforce(boost, now_ms);
            store.ins_waypoint(&edge).await?;
        }
    }
    Ok(())
}

/// Delete waypoints at or below `threshold`, scoped to an optional
/// tenant. Returns the number removed.
pub async fn prune(store: &dyn PersistenceStore, threshold: f64, tenant: Option<&str>) -> Result<u64> {
    store.prune_waypoints(threshold, tenant).await
}

/// Distinct unordered pairs among `ids`, up to `limit` per seed — used by
/// the query path to seed the co-activation buffer from a top-k result
/// set.
pub fn unordered_pairs(ids: &[String], limit_per_seed: usize) -> Vec<(String, String)> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();
    for (i, a) in ids.iter().enumerate() {
        let mut taken = 0usize;
        for b in ids.iter().skip(i + 1) {
            if taken >= limit_per_seed {
                break;
            }
            let key = if a < b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            if seen.insert(key.clone()) {
                out.push(key);
                taken += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Waypoint;
    use crate::persistence::sqlite::SqliteStore;

    #[tokio::test]
    async fn activation_terminates_and_has_no_cycles() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ins_waypoint(&Waypoint::new("a".into(), "b".into(), None, 0.9, 0)).await.unwrap();
        store.ins_waypoint(&Waypoint::new("b".into(), "a".into(), None, 0.9, 0)).await.unwrap();
        store.ins_waypoint(&Waypoint::new("b".into(), "c".into(), None, 0.9, 0)).await.unwrap();

        let result = spreading_activation(&store, &["a".to_string()], None).await.unwrap();
        assert!(result.contains_key("b"));
        assert!(result.contains_key("c"));
        for activation in result.values() {
            let unique: HashSet<_> = activation.path.iter().collect();
            assert_eq!(unique.len(), activation.path.len());
        }
    }

    #[tokio::test]
    async fn activation_respects_weight_floor() {
        let store = SqliteStore::open_in_memory().unwrap();
        // weight 0.1 * 0.8 = 0.08 < MIN_WEIGHT, so "b" should not be reached.
        store.ins_waypoint(&Waypoint::new("a".into(), "b".into(), None, 0.1, 0)).await.unwrap();

        let result = spreading_activation(&store, &["a".to_string()], None).await.unwrap();
        assert!(!result.contains_key("b"));
    }

    #[tokio::test]
    async fn reinforce_only_touches_existing_edges() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ins_waypoint(&Waypoint::new("a".into(), "b".into(), None, 0.5, 0)).await.unwrap();

        reinforce_waypoints(&store, &["a".to_string(), "b".to_string(), "c".to_string()], 0.2, None, 100)
            .await
            .unwrap();

        let edge = store.get_waypoint("a", "b", None).await.unwrap().unwrap();
        assert!(edge.weight > 0.5);
        assert!(store.get_waypoint("b", "c", None).await.unwrap().is_none());
    }

    #[test]
    fn unordered_pairs_deduplicates() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let pairs = unordered_pairs(&ids, 5);
        assert_eq!(pairs.len(), 3);
    }
}
