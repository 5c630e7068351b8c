//! The small JSON sidecar persisted next to the two indices. It is the
//! source of truth for the embedding dimension, the HNSW shape, the doc id
//! watermark and the schema fingerprint.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HybridError, Result};
use crate::hnsw_index::{DistanceKind, HnswConfig};

pub const META_FILE_NAME: &str = "hybrid.meta.json";
pub const META_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    pub version: u32,
    pub embedding_dimension: u32,
    pub distance_type: DistanceKind,
    pub hnsw_config: HnswConfig,
    pub next_doc_id: u64,
    pub primary_id_field: String,
    pub schema_fingerprint: String,
}

impl IndexMeta {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(META_FILE_NAME)
    }

    pub fn exists(dir: &Path) -> bool {
        Self::path(dir).exists()
    }

    /// Atomically replace the sidecar: write to a temp name, then rename.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = Self::path(dir);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path(dir);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(HybridError::MetadataMissing(path))
            }
            Err(e) => return Err(e.into()),
        };
        let meta: IndexMeta = serde_json::from_str(&raw)
            .map_err(|e| HybridError::MetadataCorrupt(e.to_string()))?;
        if meta.version != META_VERSION {
            return Err(HybridError::MetadataCorrupt(format!(
                "unsupported metadata version {} (expected {})",
                meta.version, META_VERSION
            )));
        }
        Ok(meta)
    }
}
