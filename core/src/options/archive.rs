//! Saving and restoring whole option trees.
//!
//! Text archives are pretty-printed JSON, binary archives are `bincode`. The build-time
//! default is text; the `binary-archives` feature switches it to binary. Loading picks the
//! format from the file extension.

use super::OptionsList;
use crate::error::{Result, RlsError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    Text,
    Binary,
}

impl Default for ArchiveFormat {
    #[cfg(feature = "binary-archives")]
    fn default() -> Self {
        ArchiveFormat::Binary
    }

    #[cfg(not(feature = "binary-archives"))]
    fn default() -> Self {
        ArchiveFormat::Text
    }
}

impl ArchiveFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Text => "json",
            ArchiveFormat::Binary => "bin",
        }
    }

    /// Format implied by the file extension, if it is a known one.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(ArchiveFormat::Text),
            "bin" => Some(ArchiveFormat::Binary),
            _ => None,
        }
    }

    pub fn encode(self, opt: &OptionsList) -> Result<Vec<u8>> {
        match self {
            ArchiveFormat::Text => {
                serde_json::to_vec_pretty(opt)
                    .map_err(|e| RlsError::Serialization(e.to_string()))
            }
            ArchiveFormat::Binary => {
                bincode::serialize(opt).map_err(|e| RlsError::Serialization(e.to_string()))
            }
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<OptionsList> {
        match self {
            ArchiveFormat::Text => {
                serde_json::from_slice(bytes)
                    .map_err(|e| RlsError::Serialization(e.to_string()))
            }
            ArchiveFormat::Binary => {
                bincode::deserialize(bytes)
                    .map_err(|e| RlsError::Serialization(e.to_string()))
            }
        }
    }
}

impl OptionsList {
    /// Writes the tree to `path`, in the format its extension names (or the default).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = ArchiveFormat::from_path(path).unwrap_or_default();
        self.save_as(path, format)
    }

    pub fn save_as(&self, path: impl AsRef<Path>, format: ArchiveFormat) -> Result<()> {
        let path = path.as_ref();
        let bytes = format.encode(self)?;
        std::fs::write(path, bytes).map_err(|e| RlsError::io(path, e))?;
        tracing::debug!(path = %path.display(), ?format, "saved options");
        Ok(())
    }

    /// Reads a tree written by [`OptionsList::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ArchiveFormat::from_path(path).unwrap_or_default();
        let bytes = std::fs::read(path).map_err(|e| RlsError::io(path, e))?;
        format.decode(&bytes)
    }
}
