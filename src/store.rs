use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::domain::BookRecord;
use crate::error::GutenError;
use crate::slug::{DEFAULT_SLUG_LEN, slugify};

/// What is on disk at a candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Missing,
    Empty,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Download,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPlan {
    pub epub_path: Utf8PathBuf,
    pub json_path: Utf8PathBuf,
    pub action: PlanAction,
}

/// Which record id a final EPUB path was given to during the current run.
pub type Claims = HashMap<Utf8PathBuf, u64>;

#[derive(Debug, Clone)]
pub struct OutputDir {
    root: Utf8PathBuf,
}

impl OutputDir {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn from_std(root: std::path::PathBuf) -> Result<Self, GutenError> {
        let root = Utf8PathBuf::from_path_buf(root).map_err(|path| {
            GutenError::Filesystem(format!("non-utf8 output directory: {}", path.display()))
        })?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<(), GutenError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| GutenError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn epub_path(&self, slug: &str) -> Utf8PathBuf {
        self.root.join(format!("{slug}.epub"))
    }

    pub fn suffixed_epub_path(&self, slug: &str, id: u64) -> Utf8PathBuf {
        self.root.join(format!("{slug}_{id}.epub"))
    }

    pub fn sidecar_path(epub_path: &Utf8Path) -> Utf8PathBuf {
        epub_path.with_extension("json")
    }

    pub fn file_state(path: &Utf8Path) -> Result<FileState, GutenError> {
        match fs::metadata(path.as_std_path()) {
            Ok(meta) if meta.len() > 0 => Ok(FileState::Present),
            Ok(_) => Ok(FileState::Empty),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(FileState::Missing),
            Err(err) => Err(GutenError::Filesystem(format!("stat {path}: {err}"))),
        }
    }

    /// The record id stored in the sidecar next to `epub_path`, if readable.
    pub fn sidecar_owner(epub_path: &Utf8Path) -> Option<u64> {
        let content = fs::read_to_string(Self::sidecar_path(epub_path).as_std_path()).ok()?;
        let value: serde_json::Value = serde_json::from_str(&content).ok()?;
        value.get("id").and_then(|id| id.as_u64())
    }

    /// Decides where `record` goes and whether it is already there.
    ///
    /// A non-empty `<slug>.epub` owned by another id (per `claims`, then per
    /// its sidecar) or an empty one moves the record to `<slug>_<id>.epub`.
    /// Suffixes never chain: the second name is always derived from the
    /// record's own id.
    pub fn plan(
        &self,
        record: &BookRecord,
        claims: &Claims,
    ) -> Result<DestinationPlan, GutenError> {
        let slug = slugify(record.title(), DEFAULT_SLUG_LEN);
        let primary = self.epub_path(&slug);
        let suffixed = self.suffixed_epub_path(&slug, record.id());

        let target = match Self::file_state(&primary)? {
            FileState::Missing => primary,
            FileState::Empty => suffixed.clone(),
            FileState::Present => {
                let owner = claims
                    .get(&primary)
                    .copied()
                    .or_else(|| Self::sidecar_owner(&primary));
                match owner {
                    Some(owner) if owner != record.id() => {
                        debug!(
                            id = record.id(),
                            owner,
                            path = %primary,
                            "slug taken by another record"
                        );
                        suffixed.clone()
                    }
                    _ => return Ok(Self::planned(primary, PlanAction::AlreadyPresent)),
                }
            }
        };

        if target == suffixed && Self::file_state(&suffixed)? == FileState::Present {
            return Ok(Self::planned(suffixed, PlanAction::AlreadyPresent));
        }
        Ok(Self::planned(target, PlanAction::Download))
    }

    fn planned(epub_path: Utf8PathBuf, action: PlanAction) -> DestinationPlan {
        DestinationPlan {
            json_path: Self::sidecar_path(&epub_path),
            epub_path,
            action,
        }
    }

    /// Writes `record` as pretty JSON unless the file already exists.
    ///
    /// The JSON goes to a temporary file first, so a sidecar is either
    /// complete or absent. Returns whether a new file was written.
    pub fn write_sidecar(path: &Utf8Path, record: &BookRecord) -> Result<bool, GutenError> {
        if path.as_std_path().exists() {
            return Ok(false);
        }
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|err| GutenError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".gutendex-")
            .suffix(".json.part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| GutenError::Filesystem(format!("temp file in {parent}: {err}")))?;
        temp.write_all(&bytes)
            .map_err(|err| GutenError::Filesystem(format!("write {path}: {err}")))?;
        match temp.persist_noclobber(path.as_std_path()) {
            Ok(_) => Ok(true),
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(GutenError::Filesystem(format!("persist {path}: {}", err.error))),
        }
    }
}
