//  PROVENANCE.rs
//    by Eisfeld
//
//  Created:
//    21 Feb 2023, 15:12:09
//  Last edited:
//    06 Apr 2023, 13:44:58
//  Auto updated?
//    Yes
//
//  Description:
//!   Bundles the full record of a completed action into a tarball, so that
//!   what ran, with which inputs and which outputs, can be audited long
//!   after the action itself has been released.
//

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::fs as tfs;

use floe_shr::fs::archive_async;
use specifications::action::{ActionId, ActionStatus, ActionStatusValue};
use specifications::auth::Principal;

pub use crate::errors::ProvenanceError as Error;


/***** TESTS *****/





/***** HELPER FUNCTIONS *****/
/// Renders the SHA-256 digest of the given bytes as lowercase hex.
///
/// # Arguments
/// - `bytes`: The bytes to hash.
///
/// # Returns
/// The digest as a 64-character hex string.
fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher: Sha256 = Sha256::new();
    hasher.update(bytes);
    let mut digest: String = String::with_capacity(64);
    for byte in hasher.finalize() {
        let _ = write!(digest, "{:02x}", byte);
    }
    digest
}

/// Collects the SHA-256 checksum of every file the container left in its work directory.
///
/// # Arguments
/// - `work`: The host-side work directory to scan.
///
/// # Returns
/// A map of paths (relative to `work`) to hex digests.
///
/// # Errors
/// This function errors if the directory tree could not be walked or one of the files could
/// not be read.
async fn checksum_outputs(work: &Path) -> Result<BTreeMap<String, String>, Error> {
    let mut checksums: BTreeMap<String, String> = BTreeMap::new();

    // Walk the tree iteratively, since the container may have nested its outputs
    let mut todo: Vec<PathBuf> = vec![work.into()];
    while let Some(dir) = todo.pop() {
        let mut entries: tfs::ReadDir = match tfs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err)    => { return Err(Error::WorkdirReadError{ path: dir, err }); },
        };
        loop {
            let entry: tfs::DirEntry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None)        => { break; },
                Err(err)        => { return Err(Error::WorkdirEntryReadError{ path: dir.clone(), err }); },
            };
            let path: PathBuf = entry.path();
            let is_dir: bool = match entry.file_type().await {
                Ok(ftype) => ftype.is_dir(),
                Err(err)  => { return Err(Error::WorkdirEntryReadError{ path, err }); },
            };
            if is_dir {
                todo.push(path);
                continue;
            }

            // It's a file; hash its contents
            let bytes: Vec<u8> = match tfs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err)  => { return Err(Error::OutputReadError{ path, err }); },
            };
            let rel: String = match path.strip_prefix(work) {
                Ok(rel) => rel.to_string_lossy().to_string(),
                Err(_)  => path.to_string_lossy().to_string(),
            };
            checksums.insert(rel, hex_digest(&bytes));
        }
    }

    Ok(checksums)
}





/***** LIBRARY *****/
/// The manifest written at the root of every provenance bundle.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProvenanceManifest {
    /// The action this bundle belongs to.
    pub action_id  : ActionId,
    /// Who created the action.
    pub creator_id : Principal,
    /// The label the request carried, if any.
    pub label      : Option<String>,
    /// The submitted input document, verbatim.
    pub body       : Value,

    /// The status the action ended in.
    pub status          : ActionStatusValue,
    /// When the provider accepted the run.
    pub start_time      : DateTime<Utc>,
    /// When the action completed.
    pub completion_time : Option<DateTime<Utc>>,
    /// The container's exit code, if it ran to one.
    pub exit_code       : Option<i32>,

    /// SHA-256 checksums of the files the container left behind, by relative path.
    pub outputs : BTreeMap<String, String>,
}



/// Bundles the record of a completed action into `<root>/<action id>.tar.gz`.
///
/// The bundle contains a `manifest.json` (see [`ProvenanceManifest`]), the captured
/// `stdout.txt` and `stderr.txt`, and checksums of whatever the container left in its work
/// directory.
///
/// # Arguments
/// - `root`: The directory that collects the bundles. Created if missing.
/// - `status`: The final status document of the action.
/// - `body`: The input document the action was submitted with.
/// - `exit_code`: The container's exit code, if it ran to one.
/// - `stdout`: The captured standard output of the container.
/// - `stderr`: The captured standard error of the container.
/// - `work_dir`: The host-side work directory to checksum, if one was mounted.
///
/// # Returns
/// The path of the written tarball.
///
/// # Errors
/// This function errors if any of the files could not be written or the bundle could not be
/// archived.
pub async fn record(root: impl AsRef<Path>, status: &ActionStatus, body: &Value, exit_code: Option<i32>, stdout: &str, stderr: &str, work_dir: Option<&Path>) -> Result<PathBuf, Error> {
    let root: &Path = root.as_ref();
    debug!("Bundling provenance of action '{}' under '{}'...", status.action_id, root.display());

    // Make sure the bundle collection exists
    if let Err(err) = tfs::create_dir_all(root).await {
        return Err(Error::DirCreateError{ path: root.into(), err });
    }

    // Checksum whatever the container left behind
    let outputs: BTreeMap<String, String> = match work_dir {
        Some(work) => checksum_outputs(work).await?,
        None       => BTreeMap::new(),
    };

    // Stage the bundle contents in a scratch directory
    let tmpdir: TempDir = match TempDir::new() {
        Ok(tmpdir) => tmpdir,
        Err(err)   => { return Err(Error::TempDirCreateError{ err }); },
    };
    let manifest: ProvenanceManifest = ProvenanceManifest {
        action_id       : status.action_id.clone(),
        creator_id      : status.creator_id,
        label           : status.label.clone(),
        body            : body.clone(),
        status          : status.status,
        start_time      : status.start_time,
        completion_time : status.completion_time,
        exit_code,
        outputs,
    };
    let raw: String = match serde_json::to_string_pretty(&manifest) {
        Ok(raw)  => raw,
        Err(err) => { return Err(Error::ManifestSerializeError{ action: status.action_id.clone(), err }); },
    };
    for (name, contents) in [("manifest.json", raw.as_str()), ("stdout.txt", stdout), ("stderr.txt", stderr)] {
        let path: PathBuf = tmpdir.path().join(name);
        if let Err(err) = tfs::write(&path, contents).await {
            return Err(Error::FileWriteError{ path, err });
        }
    }

    // Pack it up next to the other bundles
    let tarball: PathBuf = root.join(format!("{}.tar.gz", status.action_id));
    if let Err(err) = archive_async(tmpdir.path(), &tarball, true).await {
        return Err(Error::ArchiveError{ path: tmpdir.path().into(), tarball, err });
    }
    Ok(tarball)
}
