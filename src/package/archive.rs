//! Package archives (`<package>.tar.gz`)

use crate::error::{FirmloopError, FirmloopResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;
use tar::{Archive, Builder};
use tracing::debug;

/// Extracts and creates package archives.
///
/// Implementations are blocking; async callers go through `spawn_blocking`.
pub trait Archiver: Send + Sync {
    /// Unpack `archive` into `dest`, creating `dest`
    fn extract(&self, archive: &Path, dest: &Path) -> FirmloopResult<()>;

    /// Pack the contents of `src_dir` into the gzip tarball `archive`
    fn compress(&self, src_dir: &Path, archive: &Path) -> FirmloopResult<()>;
}

/// gzip-compressed tar archives
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzArchiver;

fn archive_err(path: &Path, e: impl ToString) -> FirmloopError {
    FirmloopError::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl Archiver for TarGzArchiver {
    fn extract(&self, archive: &Path, dest: &Path) -> FirmloopResult<()> {
        debug!("Extracting {} to {}", archive.display(), dest.display());
        let file = File::open(archive).map_err(|e| archive_err(archive, e))?;
        std::fs::create_dir_all(dest)
            .map_err(|e| FirmloopError::io(format!("creating {}", dest.display()), e))?;

        let mut tarball = Archive::new(GzDecoder::new(file));
        tarball.unpack(dest).map_err(|e| archive_err(archive, e))
    }

    fn compress(&self, src_dir: &Path, archive: &Path) -> FirmloopResult<()> {
        debug!("Compressing {} into {}", src_dir.display(), archive.display());
        let file = File::create(archive).map_err(|e| archive_err(archive, e))?;

        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        builder
            .append_dir_all(".", src_dir)
            .map_err(|e| archive_err(archive, e))?;
        let encoder = builder.into_inner().map_err(|e| archive_err(archive, e))?;
        encoder.finish().map_err(|e| archive_err(archive, e))?;
        Ok(())
    }
}
