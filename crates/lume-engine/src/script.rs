//! Per-track lighting scripts
//!
//! A script is an ordered, non-empty sequence of timestamped frames authored
//! for one specific audio track. Scripts are immutable once loaded for a
//! playback session. Scripts are keyed by a durable, caller-supplied track
//! identity (a persistent library id), never by file name or title hash, so
//! renaming a file cannot orphan its script.

use crate::codec::EffectFrame;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque stable track identity supplied by the host music library.
pub type TrackId = String;

/// One timestamped frame of a lighting script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    /// Offset from track start, milliseconds.
    pub offset_millis: u64,
    /// The opaque frame asserted at that offset.
    pub frame: EffectFrame,
}

/// Error type for script validation
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("lighting script must contain at least one frame")]
    Empty,

    #[error("script offsets must be strictly increasing (entry {index})")]
    NonMonotonic { index: usize },
}

/// Validated, immutable lighting script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightingScript {
    entries: Vec<ScriptEntry>,
}

impl LightingScript {
    /// Validate and wrap a sequence of entries. Offsets must be strictly
    /// increasing and the sequence non-empty.
    pub fn new(entries: Vec<ScriptEntry>) -> Result<Self, ScriptError> {
        if entries.is_empty() {
            return Err(ScriptError::Empty);
        }
        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].offset_millis <= pair[0].offset_millis {
                return Err(ScriptError::NonMonotonic { index: index + 1 });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Greatest index whose offset is `<= position_millis`, or `None` when
    /// the position lies before the first frame.
    pub fn nearest_past(&self, position_millis: u64) -> Option<usize> {
        let upper = self
            .entries
            .partition_point(|e| e.offset_millis <= position_millis);
        upper.checked_sub(1)
    }
}

/// Read access to authored scripts, keyed by track identity.
pub trait ScriptStore: Send + Sync {
    fn has_script_for(&self, track: &TrackId) -> bool;
    fn load_script_for(&self, track: &TrackId) -> Option<LightingScript>;
}

/// Directory of YAML script documents, one file per track identity.
pub struct YamlScriptStore {
    dir: PathBuf,
}

impl YamlScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default script directory: `<config>/lume/scripts`.
    pub fn open_default() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lume")
            .join("scripts");
        Self::new(dir)
    }

    fn path_for(&self, track: &TrackId) -> PathBuf {
        self.dir.join(format!("{}.yaml", sanitize(track)))
    }
}

/// Track ids are opaque strings; squash anything path-hostile before using
/// one as a file name.
fn sanitize(track: &TrackId) -> String {
    track
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ScriptStore for YamlScriptStore {
    fn has_script_for(&self, track: &TrackId) -> bool {
        self.path_for(track).exists()
    }

    fn load_script_for(&self, track: &TrackId) -> Option<LightingScript> {
        let path = self.path_for(track);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(_) => return None,
        };
        let entries = match serde_yaml::from_str::<Vec<ScriptEntry>>(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("scripts: failed to parse {:?}: {}", path, e);
                return None;
            }
        };
        match LightingScript::new(entries) {
            Ok(script) => Some(script),
            Err(e) => {
                log::warn!("scripts: rejecting invalid script {:?}: {}", path, e);
                None
            }
        }
    }
}
