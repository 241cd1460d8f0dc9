use std::collections::BTreeSet;
use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FileCityError, Result};
use crate::sandbox::{is_readable, ClientPath, PathSandbox};

/// Bytes rendered per hex dump row.
pub const HEX_ROW_BYTES: usize = 16;

/// Width of the hex column: 16 two-digit pairs with single spaces between.
pub const HEX_COLUMN_WIDTH: usize = HEX_ROW_BYTES * 3 - 1;

/// Top-level directories whose files are synthesized by the kernel.
pub const EPHEMERAL_ROOTS: &[&str] = &["proc"];

const MIN_HEIGHT: f64 = 0.1;
const MAX_HEIGHT: f64 = 10.0;
const DIRECTORY_HEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HexLine {
    pub offset: String,
    pub hex: String,
    pub ascii: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: ClientPath,
    pub is_directory: bool,
    pub size: u64,
    pub modified: f64,
    pub mime_type: Option<String>,
    /// Log-compressed size used as the building height.
    pub log_size: f64,
    pub hex_preview: Option<Vec<HexLine>>,
    pub is_favourite: bool,
    pub preview_available: bool,
    pub preview_unavailable_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewAvailability {
    pub available: bool,
    pub reason: Option<&'static str>,
}

impl PreviewAvailability {
    fn available() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    fn unavailable(reason: &'static str) -> Self {
        Self {
            available: false,
            reason: Some(reason),
        }
    }
}

/// Map a byte size onto [0.1, 10.0]: `log10(size) / 2`, clamped.
pub fn log_height(size: i128) -> f64 {
    if size <= 0 {
        return MIN_HEIGHT;
    }
    let height = (size.max(1) as f64).log10() / 2.0;
    height.clamp(MIN_HEIGHT, MAX_HEIGHT)
}

/// Hex dump of the first `max_bytes` of a regular file, or `None` when the
/// path is not a regular file or cannot be read.
pub fn hex_preview(path: &Path, max_bytes: usize) -> Option<Vec<HexLine>> {
    if !path.is_file() {
        return None;
    }
    let file = File::open(path).ok()?;
    let mut data = Vec::new();
    file.take(max_bytes as u64).read_to_end(&mut data).ok()?;
    Some(hex_lines(&data))
}

pub fn hex_lines(data: &[u8]) -> Vec<HexLine> {
    data.chunks(HEX_ROW_BYTES)
        .enumerate()
        .map(|(row, chunk)| {
            let hex = chunk
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            let ascii = chunk
                .iter()
                .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
                .collect();
            HexLine {
                offset: format!("{:08x}", row * HEX_ROW_BYTES),
                hex: format!("{:<width$}", hex, width = HEX_COLUMN_WIDTH),
                ascii,
            }
        })
        .collect()
}

/// Whether the client may request a preview of this entry.
pub fn preview_availability(
    path: &Path,
    metadata: &Metadata,
    client: &ClientPath,
) -> PreviewAvailability {
    if metadata.is_dir() {
        return PreviewAvailability::available();
    }
    if !metadata.is_file() {
        return PreviewAvailability::unavailable("Unsupported file type");
    }
    if !is_readable(path) {
        return PreviewAvailability::unavailable("Permission denied");
    }
    if client
        .first_segment()
        .is_some_and(|first| EPHEMERAL_ROOTS.contains(&first))
    {
        return PreviewAvailability::unavailable("Ephemeral process file");
    }
    PreviewAvailability::available()
}

pub fn guess_mime(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}

impl FileEntry {
    /// Build an entry for `absolute`, which is the resolved location of `client`.
    pub fn describe(
        name: String,
        client: ClientPath,
        absolute: &Path,
        favourites: &BTreeSet<ClientPath>,
    ) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(absolute)?;
        let is_directory = metadata.is_dir();
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let preview = preview_availability(absolute, &metadata, &client);

        Ok(Self {
            name,
            is_favourite: favourites.contains(&client),
            path: client,
            is_directory,
            size: if is_directory { 0 } else { metadata.len() },
            modified,
            mime_type: if is_directory { None } else { guess_mime(absolute) },
            log_size: if is_directory {
                DIRECTORY_HEIGHT
            } else {
                log_height(metadata.len().into())
            },
            hex_preview: None,
            preview_available: preview.available,
            preview_unavailable_reason: preview.reason.map(str::to_string),
        })
    }
}

/// Describe every child of a directory, sorted by name. Children that vanish,
/// cannot be stat'ed, or resolve outside the root are skipped.
pub fn list_directory(
    sandbox: &PathSandbox,
    client: &ClientPath,
    absolute: &Path,
    favourites: &BTreeSet<ClientPath>,
) -> Result<Vec<FileEntry>> {
    let entries = std::fs::read_dir(absolute)
        .map_err(|e| FileCityError::AccessDenied(format!("Cannot access directory: {}", e)))?;

    let mut items = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("skipping non-UTF-8 name {:?} in {}", raw, client);
                continue;
            }
        };
        let child = client.join(&name);

        let resolved = match sandbox.resolve_client(&child) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("skipping {}: {}", child, e);
                continue;
            }
        };
        match FileEntry::describe(name, child, &resolved, favourites) {
            Ok(item) => items.push(item),
            Err(e) => debug!("skipping entry in {}: {}", client, e),
        }
    }

    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}
