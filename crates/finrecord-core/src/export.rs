use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::{CoreError, ResultCollection};

/// Serialize the collection as pretty JSON with 4-space indentation.
///
/// Non-ASCII characters are written as-is (UTF-8), not `\u` escaped.
pub fn to_pretty_json(results: &ResultCollection) -> Result<String, CoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    results.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write the collection to `path`.
///
/// The JSON is written to a temporary file next to `path` and renamed into
/// place, so an interrupted run never leaves a truncated output file.
pub fn write_results(path: &Path, results: &ResultCollection) -> Result<(), CoreError> {
    let json = to_pretty_json(results)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)?;

    tracing::info!(path = %path.display(), records = results.len(), "wrote results");
    Ok(())
}

/// Read a previously written result file.
pub fn read_results(path: &Path) -> Result<ResultCollection, CoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
