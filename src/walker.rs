use crate::error::AppError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalFile {
    pub filename: String,
    pub path: PathBuf,
    pub extension: String,
}

#[derive(Debug, Default)]
pub struct Listing {
    pub photos: Vec<OriginalFile>,
    pub unsupported: Vec<String>,
}

pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

pub fn is_photo_file(filename: &str, allowed_extensions: &BTreeSet<String>) -> bool {
    let extension = extension_of(filename).to_lowercase();
    !extension.is_empty() && allowed_extensions.contains(&extension)
}

/// Lists the regular files directly inside `directory` in filename order.
pub fn list_originals(directory: &Path, allowed_extensions: &BTreeSet<String>) -> Result<Listing, AppError> {
    log::info!("Scanning originals in {:?}", directory);
    log::debug!("Configured allowed extensions: {:?}", allowed_extensions);

    let mut listing = Listing::default();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            log::trace!("Skipping non-file entry: {:?}", entry.path());
            continue;
        }

        let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
            log::warn!("Skipping file with a non UTF-8 name: {:?}", entry.path());
            continue;
        };

        if is_photo_file(&filename, allowed_extensions) {
            log::trace!("Discovered photo: {}", filename);
            listing.photos.push(OriginalFile {
                extension: extension_of(&filename),
                path: entry.path().to_path_buf(),
                filename,
            });
        } else {
            log::debug!("Unsupported file: {}", filename);
            listing.unsupported.push(filename);
        }
    }

    log::info!(
        "Found {} photos and {} unsupported files",
        listing.photos.len(),
        listing.unsupported.len()
    );
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> BTreeSet<String> {
        ["jpg", "jpeg", "png", "gif"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classifies_by_extension_case_insensitively() {
        assert!(is_photo_file("IMG_1.JPG", &allowed()));
        assert!(is_photo_file("a.gif", &allowed()));
        assert!(!is_photo_file("notes.txt", &allowed()));
        assert!(!is_photo_file("jpg", &allowed()));
        assert!(!is_photo_file("", &allowed()));
    }

    #[test]
    fn lists_top_level_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "readme.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();
        std::fs::write(dir.path().join("nested.jpg").join("c.jpg"), b"x").unwrap();

        let listing = list_originals(dir.path(), &allowed()).unwrap();
        let names: Vec<&str> = listing.photos.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
        assert_eq!(listing.photos[0].extension, "JPG");
        assert_eq!(listing.unsupported, vec!["readme.txt".to_string()]);
    }
}
