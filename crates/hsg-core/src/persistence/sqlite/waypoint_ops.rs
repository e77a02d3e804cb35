use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{HsgError, Result};
use crate::models::Waypoint;

fn row_to_waypoint(row: &rusqlite::Row) -> rusqlite::Result<Waypoint> {
    Ok(Waypoint {
        src_id: row.get("src_id")?,
        dst_id: row.get("dst_id")?,
        tenant: row.get("tenant")?,
        weight: row.get("weight")?,
        created_at_ms: row.get("created_at_ms")?,
        updated_at_ms: row.get("updated_at_ms")?,
    })
}

pub fn get_waypoint(conn: &Connection, src: &str, dst: &str, tenant: Option<&str>) -> Result<Option<Waypoint>> {
    conn.query_row(
        "SELECT * FROM waypoints WHERE src_id = ?1 AND dst_id = ?2 AND tenant IS ?3",
        params![src, dst, tenant],
        row_to_waypoint,
    )
    .optional()
    .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn get_waypoints_by_src(conn: &Connection, src: &str, tenant: Option<&str>) -> Result<Vec<Waypoint>> {
    let mut stmt = conn
        .prepare("SELECT * FROM waypoints WHERE src_id = ?1 AND tenant IS ?2")
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    let rows = stmt
        .query_map(params![src, tenant], row_to_waypoint)
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn get_waypoints_for_pairs(
    conn: &Connection,
    pairs: &[(String, String)],
    tenant: Option<&str>,
) -> Result<HashMap<(String, String), Waypoint>> {
    let mut out = HashMap::with_capacity(pairs.len());
    for (src, dst) in pairs {
        if let Some(w) = get_waypoint(conn, src, dst, tenant)? {
            out.insert((src.clone(), dst.clone()), w);
        }
    }
    Ok(out)
}

pub fn ins_waypoint(conn: &Connection, w: &Waypoint) -> Result<()> {
    conn.execute(
        "INSERT INTO waypoints (src_id, dst_id, tenant, weight, created_at_ms, updated_at_ms)
         VALUES (?1,?2,?3,?4,?5,?6)
         ON CONFLICT(src_id, dst_id, COALESCE(tenant, '')) DO UPDATE SET
            weight = excluded.weight, updated_at_ms = excluded.updated_at_ms",
        params![w.src_id, w.dst_id, w.tenant, w.weight, w.created_at_ms, w.updated_at_ms],
    )
    .map(|_| ())
    .map_err(|e| HsgError::Persistence(format!("upsert waypoint failed: {e}")))
}

pub fn ins_waypoints(conn: &Connection, waypoints: &[Waypoint]) -> Result<()> {
    for w in waypoints {
        ins_waypoint(conn, w)?;
    }
    Ok(())
}

/// Delete waypoints below `threshold`. `tenant = None` prunes across every
/// tenant; `Some(t)` scopes the delete to `t` only.
pub fn prune_waypoints(conn: &Connection, threshold: f64, tenant: Option<&str>) -> Result<u64> {
    let n = match tenant {
        Some(t) => conn
            .execute(
                "DELETE FROM waypoints WHERE weight < ?1 AND tenant = ?2",
                params![threshold, t],
            )
            .map_err(|e| HsgError::Persistence(e.to_string()))?,
        None => conn
            .execute("DELETE FROM waypoints WHERE weight < ?1", params![threshold])
            .map_err(|e| HsgError::Persistence(e.to_string()))?,
    };
    Ok(n as u64)
}
