//! Naming and writing of finished images.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CaptureError, CaptureResult};

/// Writes `<prefix>_<ms>.png` and `<prefix>_<ms>_<NN>.png` into one directory.
#[derive(Clone, Debug)]
pub struct ArtifactWriter {
    out_dir: PathBuf,
    prefix: String,
}

impl ArtifactWriter {
    pub fn new(out_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn long_image_name(&self, timestamp_ms: u64) -> String {
        format!("{}_{}.png", self.prefix, timestamp_ms)
    }

    /// `index` is 1-based.
    pub fn part_name(&self, timestamp_ms: u64, index: usize) -> String {
        format!("{}_{}_{:02}.png", self.prefix, timestamp_ms, index)
    }

    pub async fn write_long_image(&self, timestamp_ms: u64, png: &[u8]) -> CaptureResult<PathBuf> {
        self.ensure_dir().await?;
        let path = self.out_dir.join(self.long_image_name(timestamp_ms));
        write(&path, png).await?;
        info!(path = %path.display(), bytes = png.len(), "Wrote long image");
        Ok(path)
    }

    /// Write parts in order; part `i` of `pngs` gets index `i + 1`.
    pub async fn write_parts(&self, timestamp_ms: u64, pngs: &[Vec<u8>]) -> CaptureResult<Vec<PathBuf>> {
        self.ensure_dir().await?;
        let mut paths = Vec::with_capacity(pngs.len());
        for (offset, png) in pngs.iter().enumerate() {
            let path = self.out_dir.join(self.part_name(timestamp_ms, offset + 1));
            write(&path, png).await?;
            paths.push(path);
        }
        info!(dir = %self.out_dir.display(), parts = paths.len(), "Wrote split parts");
        Ok(paths)
    }

    async fn ensure_dir(&self) -> CaptureResult<()> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| CaptureError::io_at("create output directory", &self.out_dir, e))
    }
}

async fn write(path: &Path, bytes: &[u8]) -> CaptureResult<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| CaptureError::io_at("write image", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_artifact_pattern() {
        let writer = ArtifactWriter::new("/tmp/out", "longshot");
        assert_eq!(writer.long_image_name(1700000000123), "longshot_1700000000123.png");
        assert_eq!(writer.part_name(1700000000123, 1), "longshot_1700000000123_01.png");
        assert_eq!(writer.part_name(1700000000123, 12), "longshot_1700000000123_12.png");
    }

    #[tokio::test]
    async fn parts_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("shots"), "page");
        let paths = writer
            .write_parts(42, &[vec![1], vec![2], vec![3]])
            .await
            .unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page_42_01.png", "page_42_02.png", "page_42_03.png"]);
        assert_eq!(std::fs::read(&paths[2]).unwrap(), vec![3]);

        let long = writer.write_long_image(42, &[7, 7]).await.unwrap();
        assert_eq!(long.file_name().unwrap(), "page_42.png");
    }
}
