//! Project preferences read by the client at startup

use runtime_core::PrefError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entry::PreferenceEntry;
use crate::parser::TagParser;

/// Preferences a volunteer can set for the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPreferences {
    /// Target GPU kernel launches per second
    pub gpu_target_frequency: f64,

    /// How the host waits on GPU work
    pub gpu_polling_mode: i64,

    /// Keep the desktop responsive at the cost of throughput
    pub gpu_non_responsive: bool,

    /// Priority of the process driving the GPU
    pub gpu_process_priority: i64,

    /// Skip checkpoints while running on a GPU
    pub no_gpu_checkpoint: bool,
}

impl Default for ProjectPreferences {
    fn default() -> Self {
        Self {
            gpu_target_frequency: 60.0,
            gpu_polling_mode: 1,
            gpu_non_responsive: false,
            gpu_process_priority: 0,
            no_gpu_checkpoint: false,
        }
    }
}

impl ProjectPreferences {
    /// Read preferences from `blob`, keeping defaults for anything missing
    /// or malformed. Only a fatal parse error is returned.
    pub fn from_blob(blob: &str) -> Result<Self, PrefError> {
        let mut prefs = Self::default();
        match prefs.apply(&TagParser::default(), blob) {
            Ok(()) => info!("All project preferences read"),
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "Using defaults for unreadable project preferences");
            }
            Err(e) => return Err(e),
        }
        Ok(prefs)
    }

    /// Overwrite fields with values found in `blob`.
    ///
    /// Fields whose tags are absent or malformed keep their current value;
    /// the returned error names them.
    pub fn apply(&mut self, parser: &TagParser, blob: &str) -> Result<(), PrefError> {
        let mut entries = self.entries();
        let result = parser.parse(&mut entries, blob);
        self.update_from(&entries);
        result
    }

    fn entries(&self) -> [PreferenceEntry; 5] {
        [
            PreferenceEntry::double("gpu_target_frequency", self.gpu_target_frequency),
            PreferenceEntry::int("gpu_polling_mode", self.gpu_polling_mode),
            PreferenceEntry::bool("gpu_non_responsive", self.gpu_non_responsive),
            PreferenceEntry::int("gpu_process_priority", self.gpu_process_priority),
            PreferenceEntry::bool("no_gpu_checkpoint", self.no_gpu_checkpoint),
        ]
    }

    fn update_from(&mut self, entries: &[PreferenceEntry; 5]) {
        let [frequency, polling, non_responsive, priority, no_checkpoint] = entries;
        if let Some(v) = frequency.as_f64() {
            self.gpu_target_frequency = v;
        }
        if let Some(v) = polling.as_i64() {
            self.gpu_polling_mode = v;
        }
        if let Some(v) = non_responsive.as_bool() {
            self.gpu_non_responsive = v;
        }
        if let Some(v) = priority.as_i64() {
            self.gpu_process_priority = v;
        }
        if let Some(v) = no_checkpoint.as_bool() {
            self.no_gpu_checkpoint = v;
        }
    }
}
