//! Project preferences from flat tag-delimited text
//!
//! The project server hands the client a blob of `<name>value</name>`
//! pairs. [`parse_preferences`] fills a caller-supplied list of typed
//! entries from it and reports which could not be filled, without stopping
//! at the first problem.
//!
//! # Example
//!
//! ```
//! use project_prefs::{parse_preferences, PreferenceEntry};
//!
//! let mut spec = [
//!     PreferenceEntry::double("a", 0.0),
//!     PreferenceEntry::int("b", 0),
//! ];
//! let err = parse_preferences(&mut spec, "<a>3.5</a>").unwrap_err();
//!
//! assert_eq!(spec[0].as_f64(), Some(3.5));
//! assert!(!spec[1].found());
//! assert!(!err.is_fatal());
//! ```

pub mod entry;
pub mod numeric;
pub mod parser;
pub mod project;

pub use entry::{PrefKind, PrefValue, PreferenceEntry};
pub use parser::{match_tag, parse_preferences, EntryOutcome, TagParser, MAX_TAG_LENGTH};
pub use project::ProjectPreferences;
pub use runtime_core::PrefError;
