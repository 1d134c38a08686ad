//! Input resolution: normalise a user-supplied path into ordered pages.
//!
//! Rasterisation is an external collaborator — this crate takes page
//! bitmaps, not PDFs. The CLI (and any caller working from disk) points at
//! either a single page image or a directory of them; directory entries
//! are sorted by filename, which is the page order every rasteriser we
//! know of encodes (`page-001.png`, `page-002.png`, …). Decode failures
//! are fatal at this stage: a page the caller explicitly handed us that we
//! cannot read is a broken input, not a recoverable variant glitch.

use crate::error::RestoreError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One input page: an immutable bitmap plus its position in the document.
#[derive(Debug)]
pub struct PageImage {
    /// 0-indexed page position.
    pub index: usize,
    /// The page bitmap, owned by the pipeline invocation.
    pub image: DynamicImage,
}

impl PageImage {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Resolve a path into an ordered page list.
///
/// A file yields one page; a directory yields one page per image file,
/// sorted by filename.
pub fn resolve_pages(path: impl AsRef<Path>) -> Result<Vec<PageImage>, RestoreError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RestoreError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    if path.is_dir() {
        resolve_directory(path)
    } else {
        let image = load_page(path)?;
        debug!("Resolved single page: {}", path.display());
        Ok(vec![PageImage::new(0, image)])
    }
}

fn resolve_directory(dir: &Path) -> Result<Vec<PageImage>, RestoreError> {
    let entries = std::fs::read_dir(dir).map_err(|e| map_io_error(dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();

    if files.is_empty() {
        return Err(RestoreError::NoPages {
            path: dir.to_path_buf(),
        });
    }

    // Filename order is page order.
    files.sort();

    let mut pages = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        pages.push(PageImage::new(index, load_page(file)?));
    }

    info!("Resolved {} pages from {}", pages.len(), dir.display());
    Ok(pages)
}

fn load_page(path: &Path) -> Result<DynamicImage, RestoreError> {
    if !has_image_extension(path) {
        return Err(RestoreError::UnsupportedImage {
            path: path.to_path_buf(),
        });
    }

    // Open first so permission problems surface as themselves rather than
    // as a decode failure.
    if let Err(e) = std::fs::File::open(path) {
        return Err(map_io_error(path, e));
    }

    image::open(path).map_err(|e| RestoreError::ImageDecode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn map_io_error(path: &Path, e: std::io::Error) -> RestoreError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        RestoreError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        RestoreError::InputNotFound {
            path: path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_png(dir: &Path, name: &str) {
        let img = GrayImage::from_pixel(8, 8, Luma([200u8]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn missing_path_is_input_not_found() {
        let err = resolve_pages("/definitely/not/a/real/page.png").unwrap_err();
        assert!(matches!(err, RestoreError::InputNotFound { .. }));
    }

    #[test]
    fn single_file_resolves_to_one_page() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "page.png");
        let pages = resolve_pages(dir.path().join("page.png")).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 0);
    }

    #[test]
    fn directory_pages_are_ordered_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        // Written out of order on purpose.
        write_png(dir.path(), "page-003.png");
        write_png(dir.path(), "page-001.png");
        write_png(dir.path(), "page-002.png");
        // Non-image files are ignored.
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let pages = resolve_pages(dir.path()).unwrap();
        assert_eq!(pages.len(), 3);
        let indices: Vec<usize> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn directory_without_images_is_no_pages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "no pages here").unwrap();
        let err = resolve_pages(dir.path()).unwrap_err();
        assert!(matches!(err, RestoreError::NoPages { .. }));
    }

    #[test]
    fn wrong_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.tiff");
        std::fs::write(&path, b"not an image").unwrap();
        let err = resolve_pages(&path).unwrap_err();
        assert!(matches!(err, RestoreError::UnsupportedImage { .. }));
    }

    #[test]
    fn corrupt_image_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = resolve_pages(&path).unwrap_err();
        assert!(matches!(err, RestoreError::ImageDecode { .. }));
    }
}
