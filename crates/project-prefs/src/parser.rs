//! Flat tag-delimited preference extraction
//!
//! Only the `<name>value</name>` subset is recognized: no nesting,
//! attributes or escaping. The first opening tag wins, and the value is the
//! raw text up to the first matching closing tag after it.

use runtime_core::{PrefError, PreferenceConfig};
use tracing::{debug, instrument, warn};

use crate::entry::{PrefKind, PrefValue, PreferenceEntry};
use crate::numeric::{parse_f64_prefix, parse_i64_prefix, NumericError};

/// Delimiter buffer capacity, terminator included
pub const MAX_TAG_LENGTH: usize = 256;

/// Result of matching one entry against the blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Found,
    Missing,
    Malformed,
}

/// Tag parser with a bounded delimiter size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagParser {
    max_tag_length: usize,
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new(MAX_TAG_LENGTH)
    }
}

impl From<&PreferenceConfig> for TagParser {
    fn from(config: &PreferenceConfig) -> Self {
        Self::new(config.max_tag_length)
    }
}

impl TagParser {
    pub fn new(max_tag_length: usize) -> Self {
        Self { max_tag_length }
    }

    pub fn max_tag_length(&self) -> usize {
        self.max_tag_length
    }

    /// Fill every entry in `entries` from `blob`.
    ///
    /// Fatal errors (a name too long for the delimiter buffer, an
    /// unsupported kind) are detected before any entry is touched. Otherwise
    /// every entry is processed and the names of the missing or malformed
    /// ones are returned together as [`PrefError::Incomplete`].
    #[instrument(skip_all, fields(entries = entries.len(), blob_len = blob.len()))]
    pub fn parse(&self, entries: &mut [PreferenceEntry], blob: &str) -> Result<(), PrefError> {
        for entry in entries.iter() {
            self.validate(entry)?;
        }

        let mut missing = Vec::new();
        let mut malformed = Vec::new();

        for entry in entries.iter_mut() {
            match Self::read_entry(entry, blob) {
                EntryOutcome::Found => {}
                EntryOutcome::Missing => missing.push(entry.name().to_string()),
                EntryOutcome::Malformed => malformed.push(entry.name().to_string()),
            }
        }

        if missing.is_empty() && malformed.is_empty() {
            Ok(())
        } else {
            Err(PrefError::Incomplete { missing, malformed })
        }
    }

    fn validate(&self, entry: &PreferenceEntry) -> Result<(), PrefError> {
        // The closing delimiter is the longer of the two
        let needed = close_tag(entry.name()).len() + 1;
        if needed > self.max_tag_length {
            return Err(PrefError::DelimiterOverflow {
                name: entry.name().to_string(),
                needed,
                limit: self.max_tag_length,
            });
        }
        if entry.kind() == PrefKind::Text {
            return Err(PrefError::UnsupportedKind {
                name: entry.name().to_string(),
                kind: entry.kind().to_string(),
            });
        }
        Ok(())
    }

    fn read_entry(entry: &mut PreferenceEntry, blob: &str) -> EntryOutcome {
        entry.clear_found();
        let Some(item) = match_tag(blob, entry.name()) else {
            return EntryOutcome::Missing;
        };

        match coerce(entry.kind(), item) {
            Ok(value) => {
                debug!(name = entry.name(), ?value, "Read preference");
                entry.store(value);
                EntryOutcome::Found
            }
            Err(e) => {
                warn!(
                    name = entry.name(),
                    kind = %entry.kind(),
                    item,
                    error = %e,
                    "Error parsing preference value"
                );
                EntryOutcome::Malformed
            }
        }
    }
}

/// Fill `entries` from `blob` with the default delimiter limit
pub fn parse_preferences(entries: &mut [PreferenceEntry], blob: &str) -> Result<(), PrefError> {
    TagParser::default().parse(entries, blob)
}

fn open_tag(name: &str) -> String {
    format!("<{}>", name)
}

fn close_tag(name: &str) -> String {
    format!("</{}>", name)
}

/// Raw text between the first `<name>` and the first `</name>` after it
pub fn match_tag<'a>(blob: &'a str, name: &str) -> Option<&'a str> {
    let open = open_tag(name);
    let Some(open_pos) = blob.find(&open) else {
        debug!(name, "Opening tag not found for preference");
        return None;
    };

    let begin = open_pos + open.len();
    let Some(len) = blob[begin..].find(&close_tag(name)) else {
        debug!(name, "Closing tag not found for preference");
        return None;
    };

    Some(&blob[begin..begin + len])
}

fn coerce(kind: PrefKind, item: &str) -> Result<PrefValue, NumericError> {
    match kind {
        PrefKind::Double => parse_f64_prefix(item).map(PrefValue::Double),
        PrefKind::Int => parse_i64_prefix(item).map(PrefValue::Int),
        PrefKind::Bool => parse_i64_prefix(item).map(|v| PrefValue::Bool(v != 0)),
        // Rejected in validate()
        PrefKind::Text => Err(NumericError::NoDigits),
    }
}
