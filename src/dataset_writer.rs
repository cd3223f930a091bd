use crate::temp::write_partial_file;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while writing the dataset to disk
#[derive(Debug, Error)]
pub enum DatasetWriteError {
    /// Failed to create a species folder
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },

    /// Failed to write an image file
    #[error("Failed to write image {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// The scientific name yields no usable folder name
    #[error("Cannot derive a folder name from '{0}'")]
    InvalidFolderName(String),
}

/// Sanitizes a scientific name for use as a folder name
///
/// Replaces characters that are invalid or problematic in paths across platforms:
/// - Path separators: / \
/// - Reserved characters: : * ? " < > |
/// - Control characters
/// - Trim leading/trailing whitespace and dots
pub fn species_folder_name(scientific_name: &str) -> String {
    let sanitized: String = scientific_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    sanitized
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// File name for the image at a 1-based `index`
pub fn image_file_name(index: usize, extension: &str) -> String {
    format!("image_{}{}", index, extension)
}

/// Removes `<stem>.*` files in `dir` other than `keep`
fn remove_other_variants(dir: &Path, stem: &str, keep: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path == keep || !path.is_file() {
            continue;
        }
        if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
            debug!(path = %path.display(), "Removing image with outdated extension");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Writes images into `<root>/<scientific name>/image_<n><ext>`
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    root: PathBuf,
}

impl DatasetWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The dataset root folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder that holds the images of a species
    pub fn species_dir(&self, scientific_name: &str) -> Result<PathBuf, DatasetWriteError> {
        let folder = species_folder_name(scientific_name);
        if folder.is_empty() {
            return Err(DatasetWriteError::InvalidFolderName(
                scientific_name.to_string(),
            ));
        }
        Ok(self.root.join(folder))
    }

    /// Writes one image, creating the species folder on first use.
    ///
    /// An existing file with the same name is replaced, and so is a file
    /// for the same index under another extension. The bytes are written to
    /// a partial file first, so the target is never left truncated.
    ///
    /// # Returns
    ///
    /// The path of the written image
    pub fn write_image(
        &self,
        scientific_name: &str,
        index: usize,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, DatasetWriteError> {
        let dir = self.species_dir(scientific_name)?;

        fs::create_dir_all(&dir).map_err(|e| DatasetWriteError::CreateDirectory {
            path: dir.clone(),
            source: e,
        })?;

        let target = dir.join(image_file_name(index, extension));
        let stem = format!("image_{}", index);

        write_partial_file(&dir, &stem, bytes)
            .and_then(|partial| partial.persist(&target))
            .and_then(|()| remove_other_variants(&dir, &stem, &target))
            .map_err(|e| DatasetWriteError::Write {
                path: target.clone(),
                source: e,
            })?;

        debug!(path = %target.display(), size = bytes.len(), "Image written");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_species_folder_name() {
        assert_eq!(species_folder_name("Panthera leo"), "Panthera leo");
        assert_eq!(species_folder_name("Ailuropoda melanoleuca"), "Ailuropoda melanoleuca");
        assert_eq!(species_folder_name("Canis lupus × familiaris"), "Canis lupus × familiaris");
        assert_eq!(species_folder_name("Genus/species"), "Genus-species");
        assert_eq!(species_folder_name("  ..hidden.. "), "hidden");
    }

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name(1, ".jpg"), "image_1.jpg");
        assert_eq!(image_file_name(12, ".png"), "image_12.png");
    }

    #[test]
    fn test_write_image_creates_species_folder() {
        let root = TempDir::new().unwrap();
        let writer = DatasetWriter::new(root.path().join("dataset"));

        let path = writer.write_image("Panthera leo", 1, ".jpg", b"lion").unwrap();

        assert_eq!(path, root.path().join("dataset/Panthera leo/image_1.jpg"));
        assert_eq!(fs::read(&path).unwrap(), b"lion");
        // No partial files left behind
        assert_eq!(file_names(path.parent().unwrap()), vec!["image_1.jpg"]);
    }

    #[test]
    fn test_write_image_overwrites() {
        let root = TempDir::new().unwrap();
        let writer = DatasetWriter::new(root.path());

        writer.write_image("Canis lupus", 1, ".jpg", b"first").unwrap();
        let path = writer.write_image("Canis lupus", 1, ".jpg", b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert_eq!(file_names(&root.path().join("Canis lupus")), vec!["image_1.jpg"]);
    }

    #[test]
    fn test_write_image_replaces_other_extension() {
        let root = TempDir::new().unwrap();
        let writer = DatasetWriter::new(root.path());

        writer.write_image("Canis lupus", 1, ".jpg", b"jpeg").unwrap();
        writer.write_image("Canis lupus", 10, ".jpg", b"tenth").unwrap();
        let path = writer.write_image("Canis lupus", 1, ".png", b"png").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"png");
        assert_eq!(
            file_names(&root.path().join("Canis lupus")),
            vec!["image_1.png", "image_10.jpg"]
        );
    }

    #[test]
    fn test_species_dir_rejects_empty_name() {
        let writer = DatasetWriter::new("dataset");
        assert!(matches!(
            writer.species_dir(" .. "),
            Err(DatasetWriteError::InvalidFolderName(_))
        ));
    }

    #[test]
    fn test_write_fails_when_root_is_a_file() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("dataset");
        fs::write(&blocker, b"not a directory").unwrap();

        let writer = DatasetWriter::new(&blocker);
        let result = writer.write_image("Homo sapiens", 1, ".jpg", b"data");

        assert!(matches!(result, Err(DatasetWriteError::CreateDirectory { .. })));
    }
}
