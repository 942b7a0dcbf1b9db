//! On-disk archive for snapshots.
//!
//! Layout: `MRQ1` magic, little-endian `u32` format version, the SHA-256
//! digest of the body, then the body: an LZ4 block (uncompressed size
//! prepended) holding the bincode-encoded manifest, documents and index
//! geometry. Anything that does not decode into a consistent snapshot is
//! reported as corruption.

use crate::geometry::IndexGeometry;
use crate::snapshot::{Snapshot, SnapshotManifest};
use crate::types::{IndexableDocument, RecordId};
use bincode::Options;
use marquee_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

const MAGIC: &[u8; 4] = b"MRQ1";
const FORMAT_VERSION: u32 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = 8 + DIGEST_LEN;

/// LZ4 cannot expand data by more than this factor.
const MAX_COMPRESSION_RATIO: usize = 255;

#[derive(Serialize)]
struct PayloadRef<'a> {
    manifest: &'a SnapshotManifest,
    documents: Vec<DocumentRef<'a>>,
    index: &'a IndexGeometry,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    text: &'a str,
    id: IdRef<'a>,
}

#[derive(Serialize)]
enum IdRef<'a> {
    Int(i64),
    Str(&'a str),
}

#[derive(Deserialize)]
struct Payload {
    manifest: SnapshotManifest,
    documents: Vec<StoredDocument>,
    index: IndexGeometry,
}

#[derive(Deserialize)]
struct StoredDocument {
    text: String,
    id: StoredId,
}

/// Externally tagged so the binary codec can decode it.
#[derive(Deserialize)]
enum StoredId {
    Int(i64),
    Str(String),
}

impl From<StoredDocument> for IndexableDocument {
    fn from(stored: StoredDocument) -> Self {
        let source_id = match stored.id {
            StoredId::Int(id) => RecordId::Int(id),
            StoredId::Str(id) => RecordId::Str(id),
        };
        IndexableDocument {
            text: stored.text,
            source_id,
        }
    }
}

impl<'a> From<&'a IndexableDocument> for DocumentRef<'a> {
    fn from(document: &'a IndexableDocument) -> Self {
        let id = match &document.source_id {
            RecordId::Int(id) => IdRef::Int(*id),
            RecordId::Str(id) => IdRef::Str(id),
        };
        DocumentRef {
            text: &document.text,
            id,
        }
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().reject_trailing_bytes()
}

/// Encode a snapshot into archive bytes.
pub fn encode(snapshot: &Snapshot) -> AppResult<Vec<u8>> {
    let payload = PayloadRef {
        manifest: snapshot.manifest(),
        documents: snapshot.documents().iter().map(DocumentRef::from).collect(),
        index: snapshot.index(),
    };

    let raw = codec()
        .serialize(&payload)
        .map_err(|e| AppError::Serialization(format!("Failed to encode snapshot: {}", e)))?;
    let bytes = assemble(&lz4_flex::compress_prepend_size(&raw));

    debug!(
        "Encoded snapshot: {} bytes raw, {} bytes compressed",
        raw.len(),
        bytes.len()
    );

    Ok(bytes)
}

/// Prefix a compressed body with the header.
fn assemble(body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&Sha256::digest(body));
    bytes.extend_from_slice(body);
    bytes
}

/// Decode archive bytes into a validated snapshot.
pub fn decode(bytes: &[u8]) -> AppResult<Snapshot> {
    let corrupt = |msg: String| AppError::PersistenceCorruption(msg);

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("archive is only {} bytes", bytes.len())));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);

    if &header[..4] != MAGIC {
        return Err(corrupt("not a marquee index archive (bad magic)".to_string()));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported archive version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    if Sha256::digest(body).as_slice() != &header[8..HEADER_LEN] {
        return Err(corrupt("checksum mismatch".to_string()));
    }

    if body.len() < 4 {
        return Err(corrupt("archive body is truncated".to_string()));
    }
    let declared = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
    let limit = (body.len() - 4)
        .saturating_mul(MAX_COMPRESSION_RATIO)
        .saturating_add(64);
    if declared > limit {
        return Err(corrupt(format!(
            "declared size {} is impossible for {} compressed bytes",
            declared,
            body.len() - 4
        )));
    }

    let raw = lz4_flex::decompress_size_prepended(body)
        .map_err(|e| corrupt(format!("decompression failed: {}", e)))?;

    let payload: Payload = codec()
        .deserialize(&raw)
        .map_err(|e| corrupt(format!("payload does not decode: {}", e)))?;

    let documents = payload.documents.into_iter().map(Into::into).collect();
    Snapshot::new(payload.manifest, documents, payload.index).map_err(corrupt)
}

/// Write a snapshot to `path`, replacing any previous archive atomically.
///
/// Returns the number of bytes written.
pub fn write_archive(path: &Path, snapshot: &Snapshot) -> AppResult<u64> {
    let bytes = encode(snapshot)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            AppError::Config(format!("Archive path has no file name: {}", path.display()))
        })?;
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;

    info!(
        "Saved index archive to {} ({} bytes)",
        path.display(),
        bytes.len()
    );

    Ok(bytes.len() as u64)
}

/// Read and validate the archive at `path`.
///
/// A missing file is an I/O error, not corruption.
pub fn read_archive(path: &Path) -> AppResult<Snapshot> {
    let bytes = fs::read(path)?;
    let snapshot = decode(&bytes)?;

    info!(
        "Loaded {} index with {} documents from {}",
        snapshot.manifest().kind,
        snapshot.len(),
        path.display()
    );

    Ok(snapshot)
}
