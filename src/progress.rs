use std::{fs, path::Path};

use serde_json::json;

/// Writes a machine-readable progress snapshot for long-running batch
/// operations. Failures are ignored; progress reporting must never abort
/// the work it reports on.
pub fn write_progress(path: &Path, current: usize, total: usize, phase: &str, detail: &str) {
    let json = json!({
        "current": current,
        "total": total,
        "phase": phase,
        "detail": detail,
    });
    let _ = fs::write(path, json.to_string());
}
