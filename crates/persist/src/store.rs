//! File-backed patch log.
//!
//! Layout inside the log directory:
//! ```text
//! log.meta.json                 - collection name and schema version
//! owners/<owner>/
//!   000001.patch.cbor.zst       - one CBOR+zstd compressed patch per segment
//!   manifest.json               - per-owner hash chain over the segments
//! ```
//!
//! Owner directory names are the owner id itself when it is made of
//! `[a-z0-9_-]`. Other ids up to 100 bytes become `~` followed by the
//! hex-encoded id; longer ones become `=` followed by the sha256 of the id.
//! Names therefore never differ only by case and stay well under the usual
//! 255-byte limit. Segments always carry their owner, and listing skips any
//! that belong to someone else.
//!
//! JSON files (meta and manifests) are replaced by writing a `.tmp` sibling
//! and renaming it over the old file.

use crate::log::{PatchLogStore, StoreError, next_created_at};
use crate::patch::{NewPatch, Patch};
use async_trait::async_trait;
use revlog_common::{OwnerRef, PatchId, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Current on-disk schema version.
const LOG_SCHEMA_VERSION: u32 = 1;

/// Longest raw id that is hex-encoded into a directory name.
const MAX_HEX_OWNER_LEN: usize = 100;

/// Metadata stored in log.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMeta {
    pub log_schema_version: u32,
    pub collection: String,
}

/// A single entry in an owner's integrity manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub patch_id: PatchId,
    pub created_at: Timestamp,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Per-owner hash chain over patch segments, in append order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerManifest {
    pub entries: Vec<ManifestEntry>,
}

struct Layout {
    root: PathBuf,
    meta: LogMeta,
}

/// Durable patch log with schema versioning and integrity checking.
///
/// Blocking file I/O runs on the tokio blocking pool; a single lock
/// serializes appends so per-owner `createdAt` ordering holds.
#[derive(Clone)]
pub struct FilePatchLog {
    layout: Arc<Mutex<Layout>>,
}

impl FilePatchLog {
    /// Open or create a patch log named `collection` under `dir`.
    pub fn open(dir: impl AsRef<Path>, collection: &str) -> Result<Self, StoreError> {
        let root = dir.as_ref().join(collection);
        std::fs::create_dir_all(root.join("owners"))?;

        let meta_path = root.join("log.meta.json");
        let meta = if meta_path.exists() {
            let meta: LogMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.log_schema_version != LOG_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.log_schema_version,
                    expected_version: LOG_SCHEMA_VERSION,
                });
            }
            meta
        } else {
            let meta = LogMeta {
                log_schema_version: LOG_SCHEMA_VERSION,
                collection: collection.to_owned(),
            };
            write_json_atomic(&meta_path, &meta)?;
            meta
        };
        tracing::debug!(root = %root.display(), "patch log opened");

        Ok(Self {
            layout: Arc::new(Mutex::new(Layout { root, meta })),
        })
    }

    /// Root directory of this collection.
    pub fn root(&self) -> Result<PathBuf, StoreError> {
        self.lock(|l| Ok(l.root.clone()))
    }

    pub fn meta(&self) -> Result<LogMeta, StoreError> {
        self.lock(|l| Ok(l.meta.clone()))
    }

    /// Verify every segment hash and the chain continuity for one owner.
    pub fn verify_integrity(&self, owner: &OwnerRef) -> Result<(), StoreError> {
        self.lock(|l| l.verify_integrity(owner))
    }

    fn lock<T>(&self, f: impl FnOnce(&Layout) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let guard = self
            .layout
            .lock()
            .map_err(|_| StoreError::Backend("patch log lock poisoned".into()))?;
        f(&guard)
    }

    async fn blocking<T: Send + 'static>(
        &self,
        f: impl FnOnce(&Layout) -> Result<T, StoreError> + Send + 'static,
    ) -> Result<T, StoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.lock(f))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl PatchLogStore for FilePatchLog {
    async fn append(&self, patch: NewPatch) -> Result<Patch, StoreError> {
        self.blocking(move |l| l.append(patch)).await
    }

    async fn list_by_owner(&self, owner: &OwnerRef) -> Result<Vec<Patch>, StoreError> {
        let owner = owner.clone();
        self.blocking(move |l| l.list(&owner)).await
    }

    async fn delete_by_owner(&self, owner: &OwnerRef) -> Result<usize, StoreError> {
        let owner = owner.clone();
        self.blocking(move |l| l.delete(&owner)).await
    }
}

impl Layout {
    fn owner_dir(&self, owner: &OwnerRef) -> PathBuf {
        self.root.join("owners").join(owner_dir_name(owner))
    }

    fn load_manifest(&self, owner: &OwnerRef) -> Result<OwnerManifest, StoreError> {
        let path = self.owner_dir(owner).join("manifest.json");
        if !path.exists() {
            return Ok(OwnerManifest::default());
        }
        Ok(serde_json::from_reader(std::fs::File::open(path)?)?)
    }

    fn save_manifest(&self, owner: &OwnerRef, manifest: &OwnerManifest) -> Result<(), StoreError> {
        write_json_atomic(&self.owner_dir(owner).join("manifest.json"), manifest)
    }

    fn append(&self, patch: NewPatch) -> Result<Patch, StoreError> {
        let owner = patch.owner.clone();
        let mut manifest = self.load_manifest(&owner)?;
        let id = patch.id.clone().unwrap_or_else(PatchId::generate);
        if manifest.entries.iter().any(|e| e.patch_id == id) {
            return Err(StoreError::DuplicatePatch(id));
        }
        let latest = manifest.entries.last().map(|e| e.created_at);
        let created_at = next_created_at(&owner, latest, patch.created_at)?;
        let stored = patch.into_stored(id, created_at);

        let dir = self.owner_dir(&owner);
        std::fs::create_dir_all(&dir)?;
        let filename = format!("{:06}.patch.cbor.zst", manifest.entries.len() + 1);

        let cbor_bytes = cbor_serialize(&stored)?;
        let compressed = zstd_compress(&cbor_bytes)?;
        let hash = sha256_hex(&compressed);
        let prev_hash = manifest.entries.last().map(|e| e.sha256.clone());

        std::fs::write(dir.join(&filename), &compressed)?;

        manifest.entries.push(ManifestEntry {
            filename,
            patch_id: stored.id().clone(),
            created_at,
            sha256: hash,
            prev_hash,
        });
        self.save_manifest(&owner, &manifest)?;
        tracing::trace!(%owner, patch = %stored.id(), "patch segment written");
        Ok(stored)
    }

    fn list(&self, owner: &OwnerRef) -> Result<Vec<Patch>, StoreError> {
        let manifest = self.load_manifest(owner)?;
        let dir = self.owner_dir(owner);
        let mut patches = manifest
            .entries
            .iter()
            .map(|entry| {
                let compressed = std::fs::read(dir.join(&entry.filename))?;
                verify_hash(entry, &compressed)?;
                let cbor_bytes = zstd_decompress(&compressed)?;
                cbor_deserialize::<Patch>(&cbor_bytes)
            })
            .collect::<Result<Vec<_>, _>>()?;
        patches.retain(|patch| {
            let own = patch.owner() == owner;
            if !own {
                tracing::warn!(
                    %owner,
                    found = %patch.owner(),
                    patch = %patch.id(),
                    "skipping foreign segment"
                );
            }
            own
        });
        patches.sort_by_key(Patch::created_at);
        Ok(patches)
    }

    fn delete(&self, owner: &OwnerRef) -> Result<usize, StoreError> {
        let manifest = self.load_manifest(owner)?;
        let dir = self.owner_dir(owner);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(manifest.entries.len())
    }

    fn verify_integrity(&self, owner: &OwnerRef) -> Result<(), StoreError> {
        let manifest = self.load_manifest(owner)?;
        let dir = self.owner_dir(owner);
        let mut prev_hash: Option<String> = None;
        for entry in &manifest.entries {
            // Check chain continuity
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }
            let data = std::fs::read(dir.join(&entry.filename))?;
            verify_hash(entry, &data)?;
            prev_hash = Some(entry.sha256.clone());
        }
        Ok(())
    }
}

fn owner_dir_name(owner: &OwnerRef) -> String {
    let raw = owner.as_str();
    if raw
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
    {
        raw.to_owned()
    } else if raw.len() <= MAX_HEX_OWNER_LEN {
        let hex: String = raw.bytes().map(|b| format!("{b:02x}")).collect();
        format!("~{hex}")
    } else {
        format!("={}", sha256_hex(raw.as_bytes()))
    }
}

/// Replace `path` with the JSON form of `value` without ever leaving it
/// truncated.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&tmp)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn verify_hash(entry: &ManifestEntry, data: &[u8]) -> Result<(), StoreError> {
    let actual = sha256_hex(data);
    if actual != entry.sha256 {
        return Err(StoreError::IntegrityMismatch {
            expected: entry.sha256.clone(),
            actual,
        });
    }
    Ok(())
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
