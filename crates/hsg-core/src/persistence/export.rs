//! NDJSON export: one JSON object per line, row fields as stored. Pure
//! serialization helper — no file I/O or admin policy lives here.

use std::fmt::Write as _;

use crate::errors::{HsgError, Result};
use crate::models::Memory;

/// Serialize `memories` as NDJSON (one `Memory` per line).
pub fn export_ndjson(memories: &[Memory]) -> Result<String> {
    let mut out = String::new();
    for memory in memories {
        let line = serde_json::to_string(memory)
            .map_err(|e| HsgError::Internal(format!("ndjson encode failed: {e}")))?;
        writeln!(out, "{line}").map_err(|e| HsgError::Internal(e.to_string()))?;
    }
    Ok(out)
}

/// Parse an NDJSON document back into `Memory` rows, skipping blank lines.
pub fn import_ndjson(document: &str) -> Result<Vec<Memory>> {
    document
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| HsgError::InvalidArgument(format!("bad ndjson line: {e}")))
        })
        .collect()
}
