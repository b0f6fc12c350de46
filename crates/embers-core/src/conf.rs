use std::io::Write;

use tempfile::NamedTempFile;

use crate::error::BuildError;

/// Materializes configuration lines as a temp file the server can read.
/// The returned handle owns the file; it lives as long as the instance
/// that was built from it.
pub(crate) fn materialize(prefix: &str, lines: &[String]) -> Result<NamedTempFile, BuildError> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".conf")
        .tempfile()?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    file.as_file().sync_all()?;
    Ok(file)
}
