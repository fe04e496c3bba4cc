//! Filesystem helpers for relocating artifacts.
//!
//! Scratch directories and the public output directory are often on
//! different filesystems, where `rename` fails with EXDEV.

use std::path::Path;
use tokio::fs;

use crate::error::StorageResult;

/// Move a file from `src` to `dst`, creating `dst`'s parent and falling back
/// to copy-and-delete across devices. The destination appears atomically.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> StorageResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Copy `src` to `dst` through a sibling temp file, leaving `src` in place.
pub async fn copy_atomic(src: &Path, dst: &Path) -> StorageResult<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp_dst = dst.with_extension("partial");
    let size = match fs::copy(src, &tmp_dst).await {
        Ok(size) => size,
        Err(e) => {
            let _ = fs::remove_file(&tmp_dst).await;
            return Err(e.into());
        }
    };

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }
    Ok(size)
}

/// EXDEV (cross-device link) on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> StorageResult<()> {
    copy_atomic(src, dst).await?;

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source after cross-device move: {}: {}",
            src.display(),
            e
        );
    }
    Ok(())
}
