//! JSON documents are used as datasets verbatim.

use serde_json::Value;

use crate::error::LoadResult;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parse one JSON document. A UTF-8 BOM is tolerated.
pub fn load_json(bytes: &[u8]) -> LoadResult<Value> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    Ok(serde_json::from_slice(bytes)?)
}
