//! Carousel packaging: rendered slides into a zip archive.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{MediaError, MediaResult};
use crate::render::RenderedFrame;

/// Archive entry name for the slide at `position` (0-based).
pub fn slide_entry_name(position: usize) -> String {
    format!("slide_{:02}.png", position + 1)
}

/// Zip `slides` (in order) into `output`. Returns the archive size in bytes.
pub async fn package_slides(slides: &[RenderedFrame], output: impl AsRef<Path>) -> MediaResult<u64> {
    if slides.is_empty() {
        return Err(MediaError::invalid_storyboard("no slides to package"));
    }

    let paths: Vec<PathBuf> = slides.iter().map(|s| s.path.clone()).collect();
    let output = output.as_ref().to_path_buf();

    let size = tokio::task::spawn_blocking(move || write_archive(&paths, &output))
        .await
        .map_err(|e| MediaError::internal(format!("Carousel packaging task failed: {}", e)))??;

    info!("Packaged {} slides ({} bytes)", slides.len(), size);
    Ok(size)
}

fn write_archive(slides: &[PathBuf], output: &Path) -> MediaResult<u64> {
    let file = File::create(output)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    // PNG data is already compressed
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (position, path) in slides.iter().enumerate() {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::FileNotFound(path.clone()),
            _ => MediaError::Io(e),
        })?;
        zip.start_file(slide_entry_name(position), options)?;
        zip.write_all(&bytes)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    drop(writer);

    Ok(std::fs::metadata(output)?.len())
}
