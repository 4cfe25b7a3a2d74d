//! Results export.
//!
//! Snapshots are serialised as JSON (pretty-printed) or MessagePack, in one
//! of two layouts:
//!
//! - `by_element`: the snapshot list as committed.
//! - `by_class`: every exported property as a column over the run's steps,
//!   grouped under the element's class.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use grid_engine::{PropertyValue, TimeStep};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::results::Snapshot;

/// Export failures.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON serialisation failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding failed.
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failed.
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportLayout {
    #[default]
    ByElement,
    ByClass,
}

/// Property columns over the run, grouped by element class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassTable {
    pub steps: Vec<TimeStep>,
    /// class -> element -> property -> one value per step (`None` where the
    /// step did not record it).
    pub classes: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<Option<PropertyValue>>>>>,
}

impl ClassTable {
    #[must_use]
    pub fn from_snapshots(snapshots: &[Snapshot]) -> Self {
        let mut table = Self {
            steps: snapshots.iter().map(|s| s.step).collect(),
            classes: BTreeMap::new(),
        };
        let len = snapshots.len();
        for (index, snapshot) in snapshots.iter().enumerate() {
            for (element, properties) in &snapshot.elements {
                let (class, name) = element.split_once('.').unwrap_or(("", element));
                let columns = table
                    .classes
                    .entry(class.to_string())
                    .or_default()
                    .entry(name.to_string())
                    .or_default();
                for (property, value) in properties {
                    let column = columns
                        .entry(property.clone())
                        .or_insert_with(|| vec![None; len]);
                    column[index] = Some(value.clone());
                }
            }
        }
        table
    }
}

/// Where and how large an export ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub location: String,
    pub bytes: usize,
    pub snapshots: usize,
}

/// Persists a run's snapshots.
pub trait ResultsExporter {
    /// Write the full time series, replacing any earlier export.
    ///
    /// # Errors
    ///
    /// Any serialisation or I/O failure.
    fn export(&mut self, snapshots: &[Snapshot]) -> Result<ExportArtifact, ExportError>;
}

fn encode_value<T: Serialize>(format: ExportFormat, value: &T) -> Result<Vec<u8>, ExportError> {
    Ok(match format {
        ExportFormat::Json => serde_json::to_vec_pretty(value)?,
        // Named fields so the output is self-describing.
        ExportFormat::MessagePack => rmp_serde::to_vec_named(value)?,
    })
}

/// Serialise snapshots in the given format and layout.
///
/// # Errors
///
/// [`ExportError::Json`] or [`ExportError::Encode`].
pub fn encode(
    format: ExportFormat,
    layout: ExportLayout,
    snapshots: &[Snapshot],
) -> Result<Vec<u8>, ExportError> {
    match layout {
        ExportLayout::ByElement => encode_value(format, &snapshots),
        ExportLayout::ByClass => encode_value(format, &ClassTable::from_snapshots(snapshots)),
    }
}

/// Deserialise an exported document.
///
/// # Errors
///
/// [`ExportError::Json`] or [`ExportError::Decode`].
pub fn decode<T: DeserializeOwned>(format: ExportFormat, bytes: &[u8]) -> Result<T, ExportError> {
    Ok(match format {
        ExportFormat::Json => serde_json::from_slice(bytes)?,
        ExportFormat::MessagePack => rmp_serde::from_slice(bytes)?,
    })
}

/// Writes the export to one file, creating parent directories.
#[derive(Debug, Clone)]
pub struct FileExporter {
    path: PathBuf,
    format: ExportFormat,
    layout: ExportLayout,
}

impl FileExporter {
    pub fn new(path: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            path: path.into(),
            format,
            layout: ExportLayout::default(),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: ExportLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsExporter for FileExporter {
    fn export(&mut self, snapshots: &[Snapshot]) -> Result<ExportArtifact, ExportError> {
        let bytes = encode(self.format, self.layout, snapshots)?;
        let io = |source| ExportError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(&self.path, &bytes).map_err(io)?;
        Ok(ExportArtifact {
            location: self.path.display().to_string(),
            bytes: bytes.len(),
            snapshots: snapshots.len(),
        })
    }
}

/// Shared buffer receiving every export made by a [`MemoryExporter`].
pub type MemorySink = Rc<RefCell<Vec<Vec<u8>>>>;

/// Keeps each export in memory.
#[derive(Debug, Clone)]
pub struct MemoryExporter {
    format: ExportFormat,
    layout: ExportLayout,
    sink: MemorySink,
}

impl MemoryExporter {
    #[must_use]
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            layout: ExportLayout::default(),
            sink: MemorySink::default(),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: ExportLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Handle to the exported documents, usable after the exporter moved
    /// into a collector.
    #[must_use]
    pub fn sink(&self) -> MemorySink {
        Rc::clone(&self.sink)
    }
}

impl ResultsExporter for MemoryExporter {
    fn export(&mut self, snapshots: &[Snapshot]) -> Result<ExportArtifact, ExportError> {
        let bytes = encode(self.format, self.layout, snapshots)?;
        let len = bytes.len();
        let mut sink = self.sink.borrow_mut();
        sink.push(bytes);
        Ok(ExportArtifact {
            location: format!("memory[{}]", sink.len() - 1),
            bytes: len,
            snapshots: snapshots.len(),
        })
    }
}
