//  FS.rs
//    by Eisfeld
//
//  Created:
//    09 Feb 2023, 14:02:31
//  Last edited:
//    04 Apr 2023, 15:26:40
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements async filesystem helpers, most importantly packing a
//!   directory into a gzipped tarball.
//

use std::error::Error;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::{Path, PathBuf};

use async_compression::tokio::write::GzipEncoder;
use log::debug;
use tokio::fs as tfs;
use tokio::io::AsyncWriteExt;
use tokio_tar::Builder;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use async_compression::tokio::bufread::GzipDecoder;
    use tokio::io::BufReader;
    use tokio_tar::Archive;
    use super::*;

    /// Archiving a folder and unpacking the result should yield the same files.
    #[tokio::test]
    async fn archive_then_unpack() {
        let source = tempfile::tempdir().unwrap();
        tfs::write(source.path().join("stdout.txt"), b"hello".to_vec()).await.unwrap();
        tfs::create_dir(source.path().join("outputs")).await.unwrap();
        tfs::write(source.path().join("outputs").join("result.dat"), b"abc123".to_vec()).await.unwrap();

        let target = tempfile::tempdir().unwrap();
        let tar_path: PathBuf = target.path().join("bundle.tar.gz");
        archive_async(source.path(), &tar_path, true).await.unwrap();

        // Unpack it again with the inverse stack
        let handle: tfs::File = tfs::File::open(&tar_path).await.unwrap();
        let mut archive = Archive::new(GzipDecoder::new(BufReader::new(handle)));
        let unpack = tempfile::tempdir().unwrap();
        archive.unpack(unpack.path()).await.unwrap();

        assert_eq!(tfs::read(unpack.path().join("stdout.txt")).await.unwrap(), b"hello");
        assert_eq!(tfs::read(unpack.path().join("outputs").join("result.dat")).await.unwrap(), b"abc123");
    }

    /// Without `skip_root_dir`, entries live under the source folder's name.
    #[tokio::test]
    async fn archive_keeps_root_dir() {
        let source = tempfile::tempdir().unwrap();
        let nested: PathBuf = source.path().join("bundle");
        tfs::create_dir(&nested).await.unwrap();
        tfs::write(nested.join("manifest.json"), b"{}".to_vec()).await.unwrap();

        let target = tempfile::tempdir().unwrap();
        let tar_path: PathBuf = target.path().join("out.tar.gz");
        archive_async(&nested, &tar_path, false).await.unwrap();

        let handle: tfs::File = tfs::File::open(&tar_path).await.unwrap();
        let mut archive = Archive::new(GzipDecoder::new(BufReader::new(handle)));
        let unpack = tempfile::tempdir().unwrap();
        archive.unpack(unpack.path()).await.unwrap();

        assert!(unpack.path().join("bundle").join("manifest.json").exists());
    }

    /// A missing source directory is an error that names the path.
    #[tokio::test]
    async fn archive_missing_source() {
        let target = tempfile::tempdir().unwrap();
        let missing: PathBuf = target.path().join("nope");
        let err: FsError = archive_async(&missing, target.path().join("out.tar.gz"), true).await.unwrap_err();
        assert!(matches!(err, FsError::DirReadError{ .. }));
        assert!(err.to_string().contains("nope"));
    }
}




/***** ERRORS *****/
/// Defines errors that occur when archiving directories.
#[derive(Debug)]
pub enum FsError {
    /// Failed to create the target tarball file.
    TarCreateError{ path: PathBuf, err: std::io::Error },
    /// Failed to read the source directory.
    DirReadError{ path: PathBuf, err: std::io::Error },
    /// Failed to read an entry in the source directory.
    DirEntryReadError{ path: PathBuf, err: std::io::Error },
    /// Failed to append an entry to the tarball.
    TarAppendError{ source: PathBuf, tarball: PathBuf, err: std::io::Error },
    /// Failed to finish the tarball itself.
    TarFinishError{ tarball: PathBuf, err: std::io::Error },
    /// Failed to flush the compression stream wrapping the tarball.
    TarFlushError{ tarball: PathBuf, err: std::io::Error },
    /// The source directory has no name to archive it under.
    NoFileName{ path: PathBuf },
}

impl Display for FsError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use FsError::*;
        match self {
            TarCreateError{ path, err }          => write!(f, "Failed to create tarball file '{}': {}", path.display(), err),
            DirReadError{ path, err }            => write!(f, "Failed to read source directory '{}': {}", path.display(), err),
            DirEntryReadError{ path, err }       => write!(f, "Failed to read entry in source directory '{}': {}", path.display(), err),
            TarAppendError{ source, tarball, err } => write!(f, "Failed to append '{}' to tarball '{}': {}", source.display(), tarball.display(), err),
            TarFinishError{ tarball, err }       => write!(f, "Failed to finish tarball '{}': {}", tarball.display(), err),
            TarFlushError{ tarball, err }        => write!(f, "Failed to flush compression stream to tarball '{}': {}", tarball.display(), err),
            NoFileName{ path }                   => write!(f, "Source directory '{}' has no name to archive it under", path.display()),
        }
    }
}

impl Error for FsError {}





/***** LIBRARY *****/
/// Archives the given directory as a gzipped tarball.
///
/// # Arguments
/// - `source`: The directory to archive.
/// - `tarball`: The path of the `.tar.gz` file to write.
/// - `skip_root_dir`: If true, the _contents_ of `source` become the root entries of the
///   archive; if false, everything is nested under a folder named after `source`.
///
/// # Returns
/// Nothing, but does write the tarball to the given path.
///
/// # Errors
/// This function errors if we failed to read the source or write the tarball.
pub async fn archive_async(source: impl AsRef<Path>, tarball: impl AsRef<Path>, skip_root_dir: bool) -> Result<(), FsError> {
    let source  : &Path = source.as_ref();
    let tarball : &Path = tarball.as_ref();
    debug!("Archiving '{}' to '{}'...", source.display(), tarball.display());

    // Create the target file, wrapped in a compressor and a tar builder
    let handle: tfs::File = match tfs::File::create(tarball).await {
        Ok(handle) => handle,
        Err(err)   => { return Err(FsError::TarCreateError{ path: tarball.into(), err }); },
    };
    let mut tar: Builder<GzipEncoder<tfs::File>> = Builder::new(GzipEncoder::new(handle));

    // Append the source, either as a set of root-level entries or as one folder
    if skip_root_dir {
        let mut entries: tfs::ReadDir = match tfs::read_dir(source).await {
            Ok(entries) => entries,
            Err(err)    => { return Err(FsError::DirReadError{ path: source.into(), err }); },
        };
        loop {
            // Fetch the next entry
            let entry: tfs::DirEntry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None)        => { break; },
                Err(err)        => { return Err(FsError::DirEntryReadError{ path: source.into(), err }); },
            };

            // Folders need the recursive append, files the plain one
            let is_dir: bool = match entry.file_type().await {
                Ok(kind) => kind.is_dir(),
                Err(err) => { return Err(FsError::DirEntryReadError{ path: entry.path(), err }); },
            };
            let res: Result<(), std::io::Error> = if is_dir {
                tar.append_dir_all(entry.file_name(), entry.path()).await
            } else {
                tar.append_path_with_name(entry.path(), entry.file_name()).await
            };
            if let Err(err) = res { return Err(FsError::TarAppendError{ source: entry.path(), tarball: tarball.into(), err }); }
        }
    } else {
        let name: &OsStr = match source.file_name() {
            Some(name) => name,
            None       => { return Err(FsError::NoFileName{ path: source.into() }); },
        };
        if let Err(err) = tar.append_dir_all(name, source).await {
            return Err(FsError::TarAppendError{ source: source.into(), tarball: tarball.into(), err });
        }
    }

    // Finish the archive, then make sure the compressor writes its trailer too
    let mut handle: GzipEncoder<tfs::File> = match tar.into_inner().await {
        Ok(handle) => handle,
        Err(err)   => { return Err(FsError::TarFinishError{ tarball: tarball.into(), err }); },
    };
    if let Err(err) = handle.shutdown().await {
        return Err(FsError::TarFlushError{ tarball: tarball.into(), err });
    }

    // Done
    Ok(())
}
