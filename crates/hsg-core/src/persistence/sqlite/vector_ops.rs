use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::config::Sector;
use crate::errors::{HsgError, Result};
use crate::models::VectorRecord;
use crate::vecmath;

fn row_to_vector(row: &rusqlite::Row) -> rusqlite::Result<VectorRecord> {
    let memory_id: String = row.get("memory_id")?;
    let metadata_json: Option<String> = row.get("metadata")?;
    Ok(VectorRecord {
        memory_id: Uuid::parse_str(&memory_id).unwrap_or_default(),
        sector: Sector::new(row.get::<_, String>("sector")?),
        vector_bytes: row.get("vector")?,
        dim: row.get::<_, i64>("dim")? as usize,
        tenant: row.get("tenant")?,
        metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

pub fn store_vector(conn: &Connection, record: &VectorRecord) -> Result<()> {
    let metadata_json = record
        .metadata
        .as_ref()
        .map(|m| serde_json::to_string(m).unwrap_or_else(|_| "null".to_string()));
    conn.execute(
        "INSERT INTO vectors (memory_id, sector, vector, dim, tenant, metadata)
         VALUES (?1,?2,?3,?4,?5,?6)
         ON CONFLICT(memory_id, sector) DO UPDATE SET
            vector = excluded.vector, dim = excluded.dim, metadata = excluded.metadata",
        params![
            record.memory_id.to_string(),
            record.sector.as_str(),
            record.vector_bytes,
            record.dim as i64,
            record.tenant,
            metadata_json,
        ],
    )
    .map(|_| ())
    .map_err(|e| HsgError::Persistence(format!("store vector failed: {e}")))
}

pub fn store_vectors(conn: &Connection, records: &[VectorRecord]) -> Result<()> {
    for r in records {
        store_vector(conn, r)?;
    }
    Ok(())
}

pub fn get_vectors_by_id(conn: &Connection, memory_id: Uuid, tenant: Option<&str>) -> Result<Vec<VectorRecord>> {
    let mut stmt = conn
        .prepare("SELECT * FROM vectors WHERE memory_id = ?1 AND tenant IS ?2")
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    let rows = stmt
        .query_map(params![memory_id.to_string(), tenant], row_to_vector)
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn get_vectors_by_ids(conn: &Connection, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<Vec<VectorRecord>> {
    if memory_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = memory_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT * FROM vectors WHERE memory_id IN ({placeholders}) AND tenant IS ?");
    let mut stmt = conn.prepare(&sql).map_err(|e| HsgError::Persistence(e.to_string()))?;

    let id_strings: Vec<String> = memory_ids.iter().map(Uuid::to_string).collect();
    let mut bound: Vec<&dyn rusqlite::ToSql> = id_strings.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    bound.push(&tenant);

    let rows = stmt
        .query_map(bound.as_slice(), row_to_vector)
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| HsgError::Persistence(e.to_string()))
}

pub fn delete_vectors(conn: &Connection, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<()> {
    for id in memory_ids {
        conn.execute(
            "DELETE FROM vectors WHERE memory_id = ?1 AND tenant IS ?2",
            params![id.to_string(), tenant],
        )
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    }
    Ok(())
}

/// Exact brute-force cosine search over the sector's vectors for this
/// tenant. Chosen over an approximate index for determinism — ranking
/// quality beyond the documented contracts isn't guaranteed, but
/// reproducibility for a fixed embedder is.
pub fn search_similar(
    conn: &Connection,
    sector: &Sector,
    vector: &[f32],
    top_k: usize,
    tenant: Option<&str>,
) -> Result<Vec<(Uuid, f32)>> {
    let mut stmt = conn
        .prepare("SELECT memory_id, vector FROM vectors WHERE sector = ?1 AND tenant IS ?2")
        .map_err(|e| HsgError::Persistence(e.to_string()))?;
    let rows = stmt
        .query_map(params![sector.as_str(), tenant], |row| {
            let memory_id: String = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((memory_id, bytes))
        })
        .map_err(|e| HsgError::Persistence(e.to_string()))?;

    let mut scored: Vec<(Uuid, f32)> = Vec::new();
    for row in rows {
        let (memory_id, bytes) = row.map_err(|e| HsgError::Persistence(e.to_string()))?;
        let Some(stored) = vecmath::from_bytes(&bytes) else {
            continue;
        };
        let Ok(id) = Uuid::parse_str(&memory_id) else {
            continue;
        };
        let score = vecmath::cosine_similarity(vector, &stored);
        scored.push((id, score));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}
