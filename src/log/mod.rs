//! CSV sensor log support
//!
//! The producer can append one row per poll to a CSV log instead of (or as
//! well as) publishing shared memory. These pieces turn that log into the same
//! label-to-value contract:
//!
//! - [`LogLocation`] finds the file (fixed path or newest by suffix)
//! - [`LogSchema`] and [`LogSchemaResolver`] map labels to columns from the
//!   header row
//! - [`TailReader`] reads the last lines without scanning the whole file

mod locate;
mod schema;
mod tail;

pub use locate::LogLocation;
pub use schema::{LogSchema, LogSchemaResolver, UnresolvedColumnPolicy};
pub use tail::{TailLines, TailReader};

/// Split one CSV row into unquoted, trimmed fields.
///
/// The producer never embeds commas inside a field, so a plain split is
/// enough.
pub(crate) fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(',').map(|field| {
        let field = field.trim();
        field
            .strip_prefix('"')
            .and_then(|f| f.strip_suffix('"'))
            .unwrap_or(field)
    })
}
