//! Slug preview command

use std::io::Write;

use anyhow::Result;
use pagesmith_core::slugify;

/// Print the slug derived from `title`.
///
/// # Errors
///
/// Returns an error if the writer fails.
pub fn execute<W: Write>(title: &str, unique: bool, mut writer: W) -> Result<String> {
    let slug = slugify(title, unique);
    writeln!(writer, "{slug}")?;
    Ok(slug)
}
