//! Spreadsheet mode: expression cells with row fan-out.
//!
//! Every sheet of the template workbook is scanned over a fixed window. A
//! text cell starting with `{` is rendered against the full context and the
//! result is split on `##`:
//!
//! ```text
//! A2: {% for a in articles %}{{ a.SKU }}##{% endfor %}
//!
//!      A                 A
//! 2  {% for ... %}  →  2 SKU-1
//! 3                    3 SKU-2
//! 4                    4 SKU-3
//! ```
//!
//! Values go down the same column; nothing is inserted or shifted, so two
//! fan-outs in one column overwrite each other.

use minijinja::{Environment, Value};

use crate::api::logs::log_error;
use crate::error::RenderResult;
use crate::render::extensions::ROW_SEPARATOR;
use crate::xlsx::{column_letters, CellValue, Workbook};

/// Rows scanned per sheet.
pub const MAX_ROWS: u32 = 50;
/// Columns scanned per row.
pub const MAX_COLS: u32 = 100;

/// Split a rendered cell into the values written down the column.
///
/// A trailing empty segment is the terminator of the last row and is dropped.
pub fn fan_out_values(rendered: &str) -> Vec<CellValue> {
    let mut segments: Vec<&str> = rendered.split(ROW_SEPARATOR).collect();
    if segments.len() > 1 && segments.last() == Some(&"") {
        segments.pop();
    }
    segments.into_iter().map(coerce_segment).collect()
}

/// Numbers become numeric cells, the rest stays text.
pub fn coerce_segment(segment: &str) -> CellValue {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return CellValue::Number(n as f64);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && trimmed.bytes().any(|b| b.is_ascii_digit()) => {
            CellValue::Number(n)
        }
        _ => CellValue::Text(segment.to_string()),
    }
}

/// Render every expression cell of the workbook and serialize it.
pub fn render_workbook(env: &Environment<'static>, bytes: &[u8], ctx: &Value) -> RenderResult<Vec<u8>> {
    let mut workbook = Workbook::from_bytes(bytes)?;

    for sheet in workbook.sheets_mut() {
        for row in 1..=MAX_ROWS {
            for col in 1..=MAX_COLS {
                let Some(text) = sheet.cell_text(row, col) else {
                    continue;
                };
                if !text.starts_with('{') {
                    continue;
                }

                let source = text.replace("}\n", "}");
                let rendered = env.render_str(&source, ctx.clone()).map_err(|e| {
                    log_error(format!(
                        "Cell {}!{}{}: {}",
                        sheet.name(),
                        column_letters(col),
                        row,
                        e
                    ));
                    e
                })?;

                for (offset, value) in fan_out_values(&rendered).into_iter().enumerate() {
                    sheet.set_cell(row + offset as u32, col, value);
                }
            }
        }
    }

    Ok(workbook.to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::environment::{build_environment, EnvironmentConfig};
    use crate::xlsx::fixtures;
    use minijinja::context;

    fn render(grid: Vec<Vec<&str>>, ctx: Value) -> Workbook {
        let env = build_environment(&EnvironmentConfig::default());
        let bytes = fixtures::workbook(&[("Sheet1", grid)]);
        let out = render_workbook(&env, &bytes, &ctx).unwrap();
        Workbook::from_bytes(&out).unwrap()
    }

    #[test]
    fn test_fan_out_values() {
        assert_eq!(
            fan_out_values("a##b##c"),
            vec![
                CellValue::Text("a".into()),
                CellValue::Text("b".into()),
                CellValue::Text("c".into())
            ]
        );
        assert_eq!(fan_out_values("1##2.5##"), vec![CellValue::Number(1.0), CellValue::Number(2.5)]);
        assert_eq!(fan_out_values("x##"), vec![CellValue::Text("x".into())]);
        assert_eq!(fan_out_values("007"), vec![CellValue::Number(7.0)]);
        assert_eq!(fan_out_values(""), vec![CellValue::Empty]);
    }

    #[test]
    fn test_coerce_keeps_non_numbers() {
        assert_eq!(coerce_segment("inf"), CellValue::Text("inf".into()));
        assert_eq!(coerce_segment("NaN"), CellValue::Text("NaN".into()));
        assert_eq!(coerce_segment("12a"), CellValue::Text("12a".into()));
        assert_eq!(coerce_segment("-3"), CellValue::Number(-3.0));
    }

    #[test]
    fn test_fan_out_fills_rows_of_one_column() {
        let book = render(
            vec![vec!["Header", "{{ items|join(split) }}"]],
            context! { items => ["a", "2", "c"] },
        );
        let sheet = &book.sheets()[0];

        assert_eq!(sheet.cell_text(1, 1), Some("Header"));
        assert_eq!(sheet.cell_text(1, 2), Some("a"));
        assert_eq!(sheet.cell(2, 2), Some(&CellValue::Number(2.0)));
        assert_eq!(sheet.cell_text(3, 2), Some("c"));
        assert_eq!(sheet.cell(2, 1), None);
    }

    #[test]
    fn test_single_value_stays_in_place() {
        let book = render(
            vec![vec!["{{ name }}", "{{ count }}"]],
            context! { name => "Widget", count => 12 },
        );
        let sheet = &book.sheets()[0];

        assert_eq!(sheet.cell_text(1, 1), Some("Widget"));
        assert_eq!(sheet.cell(1, 2), Some(&CellValue::Number(12.0)));
        assert_eq!(sheet.cell(2, 1), None);
    }

    #[test]
    fn test_trailing_separator_drops_terminal_row() {
        let book = render(
            vec![vec!["{% for r in rows %}{{ r }}##{% endfor %}"], vec!["keep"], vec!["untouched"]],
            context! { rows => ["x", "y"] },
        );
        let sheet = &book.sheets()[0];

        assert_eq!(sheet.cell_text(1, 1), Some("x"));
        assert_eq!(sheet.cell_text(2, 1), Some("y"));
        assert_eq!(sheet.cell_text(3, 1), Some("untouched"));
    }

    #[test]
    fn test_overwritten_expression_is_not_evaluated() {
        let book = render(
            vec![vec!["{{ 'a##b' }}"], vec!["{{ 'never' }}"]],
            Value::from(()),
        );
        let sheet = &book.sheets()[0];
        assert_eq!(sheet.cell_text(2, 1), Some("b"));
    }

    #[test]
    fn test_newline_after_brace_is_removed() {
        let book = render(vec![vec!["{% if true %}\nyes{% endif %}"]], Value::from(()));
        assert_eq!(book.sheets()[0].cell_text(1, 1), Some("yes"));
    }

    #[test]
    fn test_markup_is_not_escaped_in_cells() {
        let book = render(vec![vec!["{{ v }}"]], context! { v => "<a & b>" });
        assert_eq!(book.sheets()[0].cell_text(1, 1), Some("<a & b>"));
    }

    #[test]
    fn test_template_error_propagates() {
        let env = build_environment(&EnvironmentConfig::default());
        let bytes = fixtures::workbook(&[("Sheet1", vec![vec!["{{ broken"]])]);
        assert!(render_workbook(&env, &bytes, &Value::from(())).is_err());
    }
}
