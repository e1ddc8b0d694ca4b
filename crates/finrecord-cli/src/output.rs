use std::io::Write;
use std::path::Path;

use finrecord_core::{ProgressEvent, ResultCollection, ResultTable};
use owo_colors::OwoColorize;

/// Placeholder for a cell whose record lacks that column.
pub const MISSING_CELL: &str = "NaN";

/// Cells wider than this are cut and suffixed with `...`.
pub const MAX_CELL_WIDTH: usize = 32;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Extracting {
            index,
            total,
            label,
        } => {
            writeln!(w, "[{}/{}] Extracting text: {}", index + 1, total, label)?;
        }
        ProgressEvent::Extracted { chars, .. } => {
            let msg = format!("      {} characters", chars);
            if color.enabled() {
                writeln!(w, "{}", msg.dimmed())?;
            } else {
                writeln!(w, "{}", msg)?;
            }
        }
        ProgressEvent::Truncated {
            original_chars,
            kept_chars,
            ..
        } => {
            let msg = format!(
                "text truncated from {} to {} characters",
                original_chars, kept_chars
            );
            if color.enabled() {
                writeln!(w, "      {} {}", "WARNING:".yellow(), msg)?;
            } else {
                writeln!(w, "      WARNING: {}", msg)?;
            }
        }
        ProgressEvent::Generating { .. } => {
            // Shown by the spinner
        }
        ProgressEvent::Retrying { attempt, error, .. } => {
            let msg = format!("retry {} after error: {}", attempt, error);
            if color.enabled() {
                writeln!(w, "      {}", msg.yellow())?;
            } else {
                writeln!(w, "      {}", msg)?;
            }
        }
        ProgressEvent::Completed {
            index,
            total,
            error,
            ..
        } => {
            let idx = index + 1;
            match error {
                None => {
                    if color.enabled() {
                        writeln!(w, "[{}/{}] -> {}", idx, total, "EXTRACTED".green())?;
                    } else {
                        writeln!(w, "[{}/{}] -> EXTRACTED", idx, total)?;
                    }
                }
                Some(err) => {
                    if color.enabled() {
                        writeln!(w, "[{}/{}] -> {} ({})", idx, total, "FAILED".red(), err)?;
                    } else {
                        writeln!(w, "[{}/{}] -> FAILED ({})", idx, total, err)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Render the result table: one row per document, one column per key.
pub fn print_table(w: &mut dyn Write, table: &ResultTable, color: ColorMode) -> std::io::Result<()> {
    if table.is_empty() {
        writeln!(w, "No results.")?;
        return Ok(());
    }

    let header: Vec<String> = std::iter::once(String::new())
        .chain(table.columns.iter().map(|c| truncate(c, MAX_CELL_WIDTH)))
        .collect();
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            std::iter::once(truncate(&row.label, MAX_CELL_WIDTH))
                .chain(row.cells.iter().map(|cell| match cell {
                    Some(text) => truncate(&single_line(text), MAX_CELL_WIDTH),
                    None => MISSING_CELL.to_string(),
                }))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            rows.iter()
                .map(|r| r[col].chars().count())
                .chain(std::iter::once(header[col].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header_line = join_padded(&header, &widths);
    if color.enabled() {
        writeln!(w, "{}", header_line.bold())?;
    } else {
        writeln!(w, "{}", header_line)?;
    }

    for row in &rows {
        if color.enabled() {
            let mut line = pad(&row[0], widths[0]).bold().to_string();
            for (cell, width) in row.iter().zip(&widths).skip(1) {
                line.push_str("  ");
                if cell == MISSING_CELL {
                    line.push_str(&pad(cell, *width).dimmed().to_string());
                } else {
                    line.push_str(&pad(cell, *width));
                }
            }
            writeln!(w, "{}", line.trim_end())?;
        } else {
            writeln!(w, "{}", join_padded(row, &widths))?;
        }
    }
    Ok(())
}

/// Print the final summary.
pub fn print_summary(
    w: &mut dyn Write,
    results: &ResultCollection,
    output_path: Option<&Path>,
    color: ColorMode,
) -> std::io::Result<()> {
    let failed = results.fallback_count();
    let extracted = results.len() - failed;

    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  Documents processed: {}", results.len())?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Extracted:".green(), extracted)?;
    } else {
        writeln!(w, "  Extracted: {}", extracted)?;
    }
    if failed > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Failed:".red(), failed)?;
        } else {
            writeln!(w, "  Failed: {}", failed)?;
        }
    }
    if let Some(path) = output_path {
        let msg = format!("Results written to {}", path.display());
        if color.enabled() {
            writeln!(w, "  {}", msg.dimmed())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// One line of dry-run output.
pub fn print_dry_run_entry(
    w: &mut dyn Write,
    label: &str,
    path: &Path,
    outcome: Result<(usize, usize), String>,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} ({})", label.bold().yellow(), path.display())?;
    } else {
        writeln!(w, "{} ({})", label, path.display())?;
    }
    match outcome {
        Ok((text_chars, prompt_chars)) => {
            writeln!(w, "  Text:   {} characters", text_chars)?;
            writeln!(w, "  Prompt: {} characters", prompt_chars)?;
        }
        Err(e) => {
            if color.enabled() {
                writeln!(w, "  {}", format!("EXTRACTION FAILED: {}", e).red())?;
            } else {
                writeln!(w, "  EXTRACTION FAILED: {}", e)?;
            }
        }
    }
    writeln!(w)?;
    Ok(())
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
}

fn join_padded(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(c, w)| pad(c, *w))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use finrecord_core::FinancialRecord;
    use serde_json::json;

    fn render_table(results: &ResultCollection) -> String {
        let mut buf = Vec::new();
        let table = ResultTable::from_collection(results);
        print_table(&mut buf, &table, ColorMode(false)).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn table_marks_absent_cells() {
        let mut results = ResultCollection::new();
        results.insert("Eveready", FinancialRecord::Parsed(json!({"Revenue": "330"})));
        results.insert("Amara Raja", FinancialRecord::fallback("Invalid JSON from model", "x"));

        let out = render_table(&results);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Revenue"));
        assert!(lines[0].contains("raw_response"));
        assert!(lines[1].starts_with("Eveready"));
        assert_eq!(lines[1].matches(MISSING_CELL).count(), 2);
        assert!(lines[2].starts_with("Amara Raja"));
        assert!(lines[2].starts_with("Amara Raja  NaN"));
    }

    #[test]
    fn long_cells_truncated() {
        let mut results = ResultCollection::new();
        let long = "₹".repeat(100);
        results.insert("A", FinancialRecord::Parsed(json!({"Revenue": long})));

        let out = render_table(&results);
        let expected = format!("{}...", "₹".repeat(MAX_CELL_WIDTH - 3));
        assert!(out.contains(&expected));
        assert!(!out.contains(&"₹".repeat(MAX_CELL_WIDTH)));
    }

    #[test]
    fn empty_table_prints_placeholder() {
        assert_eq!(render_table(&ResultCollection::new()), "No results.\n");
    }

    #[test]
    fn summary_counts_failures() {
        let mut results = ResultCollection::new();
        results.insert("A", FinancialRecord::Parsed(json!({})));
        results.insert("B", FinancialRecord::fallback("Processing cancelled", ""));

        let mut buf = Vec::new();
        print_summary(&mut buf, &results, Some(Path::new("out.json")), ColorMode(false)).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Documents processed: 2"));
        assert!(out.contains("Extracted: 1"));
        assert!(out.contains("Failed: 1"));
        assert!(out.contains("Results written to out.json"));
    }

    #[test]
    fn completed_event_shows_error() {
        let mut buf = Vec::new();
        let event = ProgressEvent::Completed {
            index: 1,
            total: 2,
            label: "Amara Raja".into(),
            error: Some("Invalid JSON from model".into()),
        };
        print_progress(&mut buf, &event, ColorMode(false)).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "[2/2] -> FAILED (Invalid JSON from model)\n"
        );
    }

    #[test]
    fn truncate_is_char_aware() {
        assert_eq!(truncate("abcdef", 5), "ab...");
        assert_eq!(truncate("abc", 5), "abc");
    }
}
