use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::config::Sector;
use crate::errors::{HsgError, Result};
use crate::models::Memory;

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let id: String = row.get("id")?;
    let tags_json: String = row.get("tags")?;
    let metadata_json: String = row.get("metadata")?;
    Ok(Memory {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        tenant: row.get("tenant")?,
        content: row.get("content")?,
        primary_sector: Sector::new(row.get::<_, String>("primary_sector")?),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
        segment: row.get("segment")?,
        simhash: row.get::<_, i64>("simhash")? as u64,
        created_at_ms: row.get("created_at_ms")?,
        updated_at_ms: row.get("updated_at_ms")?,
        last_seen_at_ms: row.get("last_seen_at_ms")?,
        salience: row.get("salience")?,
        decay_lambda: row.get("decay_lambda")?,
        version: row.get("version")?,
        dim: row.get::<_, i64>("dim")? as usize,
        mean_vector: row.get("mean_vector")?,
        compressed_vector: row.get("compressed_vector")?,
        feedback_score: row.get("feedback_score")?,
        generated_summary: row.get("generated_summary")?,
    })
}

pub fn get_mem(conn: &Connection, id: Uuid, tenant: Option<&str>) -> Result<Option<Memory>> {
    let sql = "SELECT * FROM memories WHERE id = ?1 AND tenant IS ?2";
    conn.query_row(sql, params![id.to_string(), tenant], row_to_memory)
        .optional()
        .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn get_mem_by_simhash(conn: &Connection, simhash: u64, tenant: Option<&str>) -> Result<Option<Memory>> {
    let sql = "SELECT * FROM memories WHERE simhash = ?1 AND tenant IS ?2";
    conn.query_row(sql, params![simhash as i64, tenant], row_to_memory)
        .optional()
        .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn get_mems(conn: &Connection, ids: &[Uuid]) -> Result<Vec<Memory>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT * FROM memories WHERE id IN ({placeholders})");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    let id_strings: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    let params = rusqlite::params_from_iter(id_strings.iter());
    let rows = stmt
        .query_map(params, row_to_memory)
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn list_mems_for_tenant(conn: &Connection, tenant: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
    let mut stmt = conn
        .prepare("SELECT * FROM memories WHERE tenant IS ?1 LIMIT ?2")
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    let rows = stmt
        .query_map(params![tenant, limit as i64], row_to_memory)
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn ins_mem(conn: &Connection, row: &Memory) -> Result<()> {
    let tags_json = serde_json::to_string(&row.tags).unwrap_or_else(|_| "[]".to_string());
    let metadata_json = serde_json::to_string(&row.metadata).unwrap_or_else(|_| "null".to_string());
    conn.execute(
        "INSERT INTO memories (
            id, tenant, content, primary_sector, tags, metadata, segment, simhash,
            created_at_ms, updated_at_ms, last_seen_at_ms, salience, decay_lambda,
            version, dim, mean_vector, compressed_vector, feedback_score, generated_summary
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
        params![
            row.id.to_string(),
            row.tenant,
            row.content,
            row.primary_sector.as_str(),
            tags_json,
            metadata_json,
            row.segment,
            row.simhash as i64,
            row.created_at_ms,
            row.updated_at_ms,
            row.last_seen_at_ms,
            row.salience,
            row.decay_lambda,
            row.version,
            row.dim as i64,
            row.mean_vector,
            row.compressed_vector,
            row.feedback_score,
            row.generated_summary,
        ],
    )
    .map(|_| ())
    .map_err(|e| HsgError::Persistence(format!("insert memory failed: {e}")))
}

pub fn ins_mems(conn: &Connection, rows: &[Memory]) -> Result<()> {
    for row in rows {
        ins_mem(conn, row)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn upd_mem(
    conn: &Connection,
    id: Uuid,
    tenant: Option<&str>,
    content: &[u8],
    sector: &Sector,
    tags: &[String],
    metadata: &serde_json::Value,
    updated_at_ms: i64,
) -> Result<()> {
    let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string());
    let metadata_json = serde_json::to_string(metadata).unwrap_or_else(|_| "null".to_string());
    let n = conn
        .execute(
            "UPDATE memories SET content=?1, primary_sector=?2, tags=?3, metadata=?4, updated_at_ms=?5
             WHERE id=?6 AND tenant IS ?7",
            params![content, sector.as_str(), tags_json, metadata_json, updated_at_ms, id.to_string(), tenant],
        )
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    if n == 0 {
        return Err(HsgError::NotFound(format!("memory {id}")));
    }
    Ok(())
}

pub fn upd_seen(
    conn: &Connection,
    id: Uuid,
    tenant: Option<&str>,
    last_seen_at_ms: i64,
    salience: f64,
    updated_at_ms: i64,
) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE memories SET last_seen_at_ms=?1, salience=?2, updated_at_ms=?3
             WHERE id=?4 AND tenant IS ?5",
            params![last_seen_at_ms, salience.clamp(0.0, 1.0), updated_at_ms, id.to_string(), tenant],
        )
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    if n == 0 {
        return Err(HsgError::NotFound(format!("memory {id}")));
    }
    Ok(())
}

pub fn upd_mean_vec(
    conn: &Connection,
    id: Uuid,
    tenant: Option<&str>,
    dim: usize,
    mean_vector: &[u8],
) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE memories SET dim=?1, mean_vector=?2, compressed_vector=?2 WHERE id=?3 AND tenant IS ?4",
            params![dim as i64, mean_vector, id.to_string(), tenant],
        )
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    if n == 0 {
        return Err(HsgError::NotFound(format!("memory {id}")));
    }
    Ok(())
}

/// Cascade-delete: the row (vectors cascade via foreign key), plus any
/// waypoint with `src_id` or `dst_id` equal to this memory's id or one of
/// its virtual sector nodes (`"<id>:<sector>"`).
pub fn del_mem(conn: &Connection, id: Uuid, tenant: Option<&str>) -> Result<()> {
    let id_str = id.to_string();
    conn.execute(
        "DELETE FROM waypoints WHERE (src_id = ?1 OR dst_id = ?1 OR src_id LIKE ?2 OR dst_id LIKE ?2) AND tenant IS ?3",
        params![id_str, format!("{id_str}:%"), tenant],
    )
    .map_err(|e| HsgError::Persistence(e.to_string()))?;
    let n = conn
        .execute(
            "DELETE FROM memories WHERE id = ?1 AND tenant IS ?2",
            params![id_str, tenant],
        )
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    if n == 0 {
        return Err(HsgError::NotFound(format!("memory {id}")));
    }
    Ok(())
}
