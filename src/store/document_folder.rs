// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::form::FormState;
use crate::model::{DocumentId, IdError};

const DOCUMENT_EXTENSION: &str = ".drawio";
const FORM_STATE_EXTENSION: &str = ".form.json";
const TMP_PREFIX: &str = ".flowform.tmp.";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("json error at {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid document id {value:?}: {source}")]
    InvalidId { value: String, source: IdError },
    #[error("refusing to write through symlink at {path:?}")]
    SymlinkRefused { path: PathBuf },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WriteDurability {
    /// Temp file plus atomic rename, no fsync.
    #[default]
    Fast,
    /// Also syncs the file and its directory where the platform allows.
    Durable,
}

/// A directory of documents: `<id>.drawio` holds the document text, `<id>.form.json` the last
/// saved [`FormState`].
#[derive(Debug, Clone)]
pub struct DocumentFolder {
    root: PathBuf,
    durability: WriteDurability,
}

impl DocumentFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            durability: WriteDurability::default(),
        }
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn durability(&self) -> WriteDurability {
        self.durability
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, id: &DocumentId) -> PathBuf {
        self.root
            .join(format!("{}{DOCUMENT_EXTENSION}", encode_id_segment(id.as_str())))
    }

    pub fn form_state_path(&self, id: &DocumentId) -> PathBuf {
        self.root
            .join(format!("{}{FORM_STATE_EXTENSION}", encode_id_segment(id.as_str())))
    }

    /// Ids of every stored document, sorted.
    pub fn list(&self) -> Result<Vec<DocumentId>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&self.root)(source)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&self.root))?;
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(DOCUMENT_EXTENSION))
            else {
                continue;
            };
            if stem.starts_with(TMP_PREFIX) {
                continue;
            }
            match decode_id_segment(stem).and_then(|raw| DocumentId::new(raw).ok()) {
                Some(id) => ids.push(id),
                None => warn!(file = %stem, "skipping document with undecodable name"),
            }
        }
        ids.sort_by(|a, b| a.cmp_natural(b));
        Ok(ids)
    }

    pub fn read_document(&self, id: &DocumentId) -> Result<String, StoreError> {
        let path = self.document_path(id);
        fs::read_to_string(&path).map_err(|source| StoreError::Io { path, source })
    }

    pub fn write_document(&self, id: &DocumentId, text: &str) -> Result<(), StoreError> {
        let path = self.document_path(id);
        write_atomic(&self.root, &path, text.as_bytes(), self.durability)?;
        debug!(document_id = %id, bytes = text.len(), "wrote document");
        Ok(())
    }

    /// The saved form state, or an empty one when none was saved yet.
    pub fn read_form_state(&self, id: &DocumentId) -> Result<FormState, StoreError> {
        let path = self.form_state_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(FormState::default()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path, source })
    }

    pub fn write_form_state(&self, id: &DocumentId, state: &FormState) -> Result<(), StoreError> {
        let path = self.form_state_path(id);
        let mut json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        json.push(b'\n');
        write_atomic(&self.root, &path, &json, self.durability)
    }

    /// Removes the document and its form state. Missing files are not an error.
    pub fn remove(&self, id: &DocumentId) -> Result<(), StoreError> {
        for path in [self.document_path(id), self.form_state_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Ok(())
    }
}

/// Parses a raw id the way stored ids are validated.
pub fn parse_document_id(raw: &str) -> Result<DocumentId, StoreError> {
    DocumentId::new(raw).map_err(|source| StoreError::InvalidId {
        value: raw.to_owned(),
        source,
    })
}

/// Base names Windows reserves for devices, whatever the extension.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const FORBIDDEN_CHARS: &str = r#"<>:"/\|?*"#;

/// File-name-safe form of an id segment: unchanged when portable, else `~` plus lowercase hex.
fn encode_id_segment(segment: &str) -> String {
    if is_portable_segment(segment) {
        return segment.to_owned();
    }
    let hex: String = segment.bytes().map(|byte| format!("{byte:02x}")).collect();
    format!("~{hex}")
}

fn decode_id_segment(segment: &str) -> Option<String> {
    let Some(hex) = segment.strip_prefix('~') else {
        return Some(segment.to_owned());
    };
    let digits = hex.as_bytes();
    if digits.len() % 2 != 0 || !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let bytes = digits
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).ok().and_then(|p| u8::from_str_radix(p, 16).ok()))
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

/// A segment every supported file system accepts verbatim and that cannot be mistaken for an
/// encoded one.
fn is_portable_segment(segment: &str) -> bool {
    let stem = segment.split('.').next().unwrap_or(segment);
    let reserved = RESERVED_NAMES.iter().any(|name| name.eq_ignore_ascii_case(stem));
    !reserved
        && !segment.starts_with(['~', '.'])
        && !segment.ends_with([' ', '.'])
        && !segment
            .chars()
            .any(|ch| ch.is_control() || FORBIDDEN_CHARS.contains(ch))
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

/// Whether `path` exists. A symlink there is refused.
fn exists_without_symlink(path: &Path) -> Result<bool, StoreError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(StoreError::SymlinkRefused {
            path: path.to_path_buf(),
        }),
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(io_error(path)(source)),
    }
}

/// Writes `contents` to `path` through a staging file in `root` and a rename, so readers see
/// either the old or the new file.
fn write_atomic(
    root: &Path,
    path: &Path,
    contents: &[u8],
    durability: WriteDurability,
) -> Result<(), StoreError> {
    if !exists_without_symlink(root)? {
        fs::create_dir_all(root).map_err(io_error(root))?;
    }
    exists_without_symlink(path)?;

    let name = path
        .file_name()
        .ok_or_else(|| io_error(path)(io::Error::other("path has no file name")))?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let staging = root.join(format!("{TMP_PREFIX}{}.{stamp}", name.to_string_lossy()));

    let written = write_staging(&staging, contents, durability)
        .and_then(|()| fs::rename(&staging, path).map_err(io_error(path)));
    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(&staging) {
            debug!(path = %staging.display(), error = %cleanup, "staging file not removed");
        }
        return Err(err);
    }

    if durability == WriteDurability::Durable {
        sync_dir(root)?;
    }
    Ok(())
}

fn write_staging(
    staging: &Path,
    contents: &[u8],
    durability: WriteDurability,
) -> Result<(), StoreError> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)
        .map_err(io_error(staging))?;
    file.write_all(contents).map_err(io_error(staging))?;
    if durability == WriteDurability::Durable {
        file.sync_all().map_err(io_error(staging))?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(io_error(dir))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}
