//! Image directory listing.

use std::io;
use std::path::{Path, PathBuf};

/// List the image files in `dir`: regular files whose name has an extension,
/// sorted by file name. Subdirectories are not descended into.
pub fn list_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some() {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// Identifier of an image: its file name.
pub fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"b").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("README"), b"no extension").unwrap();
        std::fs::create_dir(dir.path().join("nested.d")).unwrap();
        std::fs::write(dir.path().join("nested.d").join("c.jpg"), b"c").unwrap();

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| image_name(p))
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_images(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_image_name() {
        assert_eq!(image_name(Path::new("/data/test/img_01.jpg")), "img_01.jpg");
    }
}
