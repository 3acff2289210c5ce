pub mod console;

use crate::engine::SuiteReport;
use crate::errors::Result;
use crate::storage::files::write_json_atomic;
use std::path::Path;

/// Machine-readable run record, written atomically.
pub fn write_json(report: &SuiteReport, path: &Path) -> Result<()> {
    write_json_atomic(path, report)
}
