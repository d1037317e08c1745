//! Artifact storage: locations, file naming and the filesystem store

use crate::errors::CameraError;
use crate::types::{Artifact, ArtifactKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Internal,
    External,
    Cloud,
}

/// A place artifacts can be saved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub kind: LocationKind,
    pub available: bool,
}

impl StorageLocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            kind: LocationKind::Internal,
            available: true,
        }
    }
}

/// The standard locations under `root`
pub fn default_locations(root: &Path) -> Vec<StorageLocation> {
    vec![
        StorageLocation::new("downloads", "Downloads", root.join("Download")),
        StorageLocation::new("dcim", "Camera (DCIM)", root.join("DCIM").join("Camera")),
        StorageLocation::new("custom", "Custom folder", root.join("CineCraft")),
    ]
}

/// `IMG_YYYY-MM-DD_HH-MM-SS.jpg` / `VID_YYYY-MM-DD_HH-MM-SS.<ext>`
pub fn generate_filename(kind: ArtifactKind, extension: &str, at: DateTime<Utc>) -> String {
    let prefix = match kind {
        ArtifactKind::Photo => "IMG",
        ArtifactKind::Video => "VID",
    };
    format!("{}_{}.{}", prefix, at.format("%Y-%m-%d_%H-%M-%S"), extension)
}

/// Filename for an artifact, timestamped with its creation time
pub fn filename_for(artifact: &Artifact) -> String {
    generate_filename(artifact.kind, artifact.extension(), artifact.created_at)
}

/// Where an artifact ended up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedArtifact {
    pub location_id: String,
    pub filename: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Storage collaborator. Called once per artifact and never retried.
pub trait ArtifactStore: Send + Sync {
    fn save(&self, artifact: &Artifact, filename: &str, location: &StorageLocation)
        -> Result<SavedArtifact, CameraError>;
}

/// Writes artifacts into the location's directory
#[derive(Debug, Clone, Default)]
pub struct FileSystemStore;

impl FileSystemStore {
    pub fn new() -> Self {
        Self
    }

    /// `dir/filename`, or `dir/stem-N.ext` when that name is taken
    fn unique_path(dir: &Path, filename: &str) -> PathBuf {
        let candidate = dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (filename, None),
        };
        (1..)
            .map(|n| match ext {
                Some(ext) => dir.join(format!("{}-{}.{}", stem, n, ext)),
                None => dir.join(format!("{}-{}", stem, n)),
            })
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }
}

impl ArtifactStore for FileSystemStore {
    fn save(
        &self,
        artifact: &Artifact,
        filename: &str,
        location: &StorageLocation,
    ) -> Result<SavedArtifact, CameraError> {
        if !location.available {
            return Err(CameraError::StorageWriteFailed(format!(
                "storage location {} is not available",
                location.id
            )));
        }

        fs::create_dir_all(&location.path).map_err(|e| {
            CameraError::StorageWriteFailed(format!("cannot create {}: {}", location.path.display(), e))
        })?;

        let path = Self::unique_path(&location.path, filename);
        fs::write(&path, &artifact.data)
            .map_err(|e| CameraError::StorageWriteFailed(format!("cannot write {}: {}", path.display(), e)))?;

        log::info!("File saved to: {}/{}", location.name, filename);
        Ok(SavedArtifact {
            location_id: location.id.clone(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| filename.to_string()),
            path,
            bytes: artifact.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resolution;
    use bytes::Bytes;
    use chrono::TimeZone;

    fn photo() -> Artifact {
        Artifact::new(
            ArtifactKind::Photo,
            "image/jpeg",
            Bytes::from_static(b"\xFF\xD8jpeg"),
            Resolution::new(4, 4),
        )
    }

    #[test]
    fn test_generate_filename() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            generate_filename(ArtifactKind::Photo, "jpg", at),
            "IMG_2024-03-09_14-05-07.jpg"
        );
        assert_eq!(
            generate_filename(ArtifactKind::Video, "webm", at),
            "VID_2024-03-09_14-05-07.webm"
        );
    }

    #[test]
    fn test_default_locations() {
        let locations = default_locations(Path::new("/data"));
        let ids: Vec<_> = locations.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["downloads", "dcim", "custom"]);
        assert_eq!(locations[1].path, PathBuf::from("/data/DCIM/Camera"));
    }

    #[test]
    fn test_filesystem_store_writes_and_avoids_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let location = StorageLocation::new("custom", "Custom", dir.path().join("nested"));
        let store = FileSystemStore::new();

        let first = store.save(&photo(), "IMG_x.jpg", &location).unwrap();
        let second = store.save(&photo(), "IMG_x.jpg", &location).unwrap();

        assert_eq!(first.filename, "IMG_x.jpg");
        assert_eq!(second.filename, "IMG_x-1.jpg");
        assert_eq!(fs::read(&first.path).unwrap(), b"\xFF\xD8jpeg");
        assert_eq!(first.bytes, 6);
    }

    #[test]
    fn test_unavailable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut location = StorageLocation::new("custom", "Custom", dir.path());
        location.available = false;

        let result = FileSystemStore::new().save(&photo(), "IMG_x.jpg", &location);
        assert!(matches!(result, Err(CameraError::StorageWriteFailed(_))));
    }
}
