//! Workspace bundles: a zip holding the SQLite file and a manifest with its
//! SHA-256, so a truncated or edited bundle is refused on import.

use crate::db::DB_FILE_NAME;
use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/amist.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "amist-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "sqlite3";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    version: u32,
    app_version: String,
    exported_at: String,
    db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let digest = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        db_sha256: digest.clone(),
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    tracing::info!(out = %out_path.to_string_lossy(), sha256 = %digest, "workspace exported");
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        db_sha256: digest,
    })
}

/// Replaces the workspace database with the bundle's. A bare SQLite file
/// is accepted as well and copied as is.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    let (db_bytes, format) = if is_raw_sqlite(in_path)? {
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        (bytes, RAW_SQLITE_FORMAT)
    } else {
        (read_bundle(in_path)?, BUNDLE_FORMAT_V1)
    };

    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp_dst = workspace_path.join(format!("{DB_FILE_NAME}.importing"));
    {
        let mut out = File::create(&tmp_dst).with_context(|| {
            format!(
                "failed to create temp database {}",
                tmp_dst.to_string_lossy()
            )
        })?;
        out.write_all(&db_bytes)
            .context("failed to write extracted database")?;
        out.flush().context("failed to flush extracted database")?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    tracing::info!(workspace = %workspace_path.to_string_lossy(), format, "workspace imported");
    Ok(ImportSummary {
        bundle_format_detected: format.to_string(),
    })
}

fn read_bundle(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/amist.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if !actual.eq_ignore_ascii_case(&manifest.db_sha256) {
        return Err(anyhow!(
            "database checksum mismatch: manifest {}, bundle {}",
            manifest.db_sha256,
            actual
        ));
    }
    Ok(db_bytes)
}

fn is_raw_sqlite(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 16];
    let mut read = 0;
    while read < sig.len() {
        let n = f
            .read(&mut sig[read..])
            .context("failed to read file signature")?;
        if n == 0 {
            return Ok(false);
        }
        read += n;
    }
    Ok(&sig == SQLITE_MAGIC)
}
