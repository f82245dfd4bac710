//! Workbook ingestion: one dataset per sheet.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::api::logs::log_info_indent;
use crate::error::LoadResult;
use crate::models::normalize_name;
use crate::xlsx::{column_letters, CellValue, Workbook};

/// Load every sheet as `{sheet}_{stem}` → array of string records.
///
/// The first populated row is the header. Later rows with at least one
/// non-empty cell become records. Header cells that are empty are keyed by
/// their column letter.
pub fn load_workbook(bytes: &[u8], stem: &str) -> LoadResult<Vec<(String, Value)>> {
    let workbook = Workbook::from_bytes(bytes)?;
    let mut datasets = Vec::new();

    for sheet in workbook.sheets() {
        let rows: Vec<_> = sheet
            .rows()
            .into_iter()
            .filter(|(_, cells)| cells.iter().any(|(_, v)| !is_blank(v)))
            .collect();

        let records = match rows.split_first() {
            None => Vec::new(),
            Some(((_, header_cells), data)) => {
                let columns: BTreeSet<u32> = rows
                    .iter()
                    .flat_map(|(_, cells)| cells.iter().map(|(col, _)| *col))
                    .collect();
                let keys: Vec<(u32, String)> = columns
                    .into_iter()
                    .map(|col| {
                        let key = header_cells
                            .iter()
                            .find(|(c, _)| *c == col)
                            .map(|(_, v)| v.to_display_string())
                            .filter(|k| !k.trim().is_empty())
                            .unwrap_or_else(|| column_letters(col));
                        (col, key)
                    })
                    .collect();

                data.iter()
                    .map(|(_, cells)| {
                        let mut obj = Map::new();
                        for (col, key) in &keys {
                            let value = cells
                                .iter()
                                .find(|(c, _)| c == col)
                                .map(|(_, v)| v.to_display_string())
                                .unwrap_or_default();
                            obj.insert(key.clone(), Value::String(value));
                        }
                        Value::Object(obj)
                    })
                    .collect()
            }
        };

        let name = format!("{}_{}", normalize_name(sheet.name()), stem);
        log_info_indent(format!("Sheet '{}' → {} ({} records)", sheet.name(), name, records.len()), 1);
        datasets.push((name, Value::Array(records)));
    }

    Ok(datasets)
}

fn is_blank(value: &CellValue) -> bool {
    match value {
        CellValue::Empty => true,
        CellValue::Text(text) => text.trim().is_empty(),
        _ => false,
    }
}
