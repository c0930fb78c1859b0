//  ERRORS.rs
//    by Eisfeld
//
//  Created:
//    14 Feb 2023, 10:04:33
//  Last edited:
//    05 Apr 2023, 16:27:19
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the errors that may occur in the `floe-ap` crate.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;

use bollard::ClientVersion;

use floe_shr::fs::FsError;
use specifications::action::ActionId;


/***** LIBRARY *****/
/// Defines errors that occur when resolving bearer tokens to principal sets.
#[derive(Debug)]
pub enum AuthError {
    /// Failed to send the token to the introspection endpoint.
    IntrospectRequestError{ endpoint: String, err: reqwest::Error },
    /// The introspection endpoint did not reply with a success status.
    IntrospectResponseError{ endpoint: String, status: reqwest::StatusCode },
    /// The introspection reply was not parseable as the expected JSON.
    IntrospectParseError{ endpoint: String, err: reqwest::Error },
    /// The introspection reply carried a subject that was not an identity UUID.
    IllegalSubject{ raw: String, err: uuid::Error },
}

impl Display for AuthError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use AuthError::*;
        match self {
            IntrospectRequestError{ endpoint, err }     => write!(f, "Failed to send introspection request to '{}': {}", endpoint, err),
            IntrospectResponseError{ endpoint, status } => write!(f, "Introspection endpoint '{}' replied with status {}", endpoint, status),
            IntrospectParseError{ endpoint, err }       => write!(f, "Failed to parse reply of introspection endpoint '{}' as JSON: {}", endpoint, err),
            IllegalSubject{ raw, err }                  => write!(f, "Introspection subject '{}' is not a valid identity: {}", raw, err),
        }
    }
}

impl Error for AuthError {}



/// Defines errors that occur when talking to the local Docker daemon.
#[derive(Debug)]
pub enum DockerError {
    /// We failed to connect to the local Docker daemon.
    ConnectionError{ path: PathBuf, version: ClientVersion, err: bollard::errors::Error },

    /// Failed to pull the compute image.
    ImagePullError{ image: String, err: bollard::errors::Error },
    /// Failed to create a temporary directory to stage the build context archive in.
    TempDirCreateError{ err: std::io::Error },
    /// Failed to archive the build context directory before streaming it to the daemon.
    ContextArchiveError{ path: PathBuf, err: FsError },
    /// Failed to open the archived build context for streaming.
    ContextOpenError{ path: PathBuf, err: std::io::Error },
    /// The daemon failed to build the compute image from the given context.
    ImageBuildError{ image: String, err: bollard::errors::Error },
    /// The daemon reported a failure in the build stream itself.
    ImageBuildFailure{ image: String, reason: String },

    /// Could not create the given container.
    CreateContainerError{ name: String, image: String, err: bollard::errors::Error },
    /// Could not start the given container.
    StartError{ name: String, image: String, err: bollard::errors::Error },
    /// Failed to wait for the container with the given name.
    WaitError{ name: String, err: bollard::errors::Error },
    /// Failed to get the logs of a container.
    LogsError{ name: String, err: bollard::errors::Error },

    /// Failed to inspect the given container.
    InspectContainerError{ name: String, err: bollard::errors::Error },
    /// An executed container had no execution state (it wasn't started?)
    ContainerNoState{ name: String },
    /// An executed container had no return code.
    ContainerNoExitCode{ name: String },

    /// Failed to stop the given container.
    ContainerStopError{ name: String, err: bollard::errors::Error },
    /// Failed to remove the given container.
    ContainerRemoveError{ name: String, err: bollard::errors::Error },
}

impl Display for DockerError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use DockerError::*;
        match self {
            ConnectionError{ path, version, err } => write!(f, "Failed to connect to the local Docker daemon through socket '{}' and with client version {}: {}", path.display(), version, err),

            ImagePullError{ image, err }      => write!(f, "Failed to pull image '{}' into Docker engine: {}", image, err),
            TempDirCreateError{ err }         => write!(f, "Failed to create temporary directory for build context archive: {}", err),
            ContextArchiveError{ path, err }  => write!(f, "Failed to archive build context '{}': {}", path.display(), err),
            ContextOpenError{ path, err }     => write!(f, "Failed to open archived build context '{}': {}", path.display(), err),
            ImageBuildError{ image, err }     => write!(f, "Failed to build image '{}' in Docker engine: {}", image, err),
            ImageBuildFailure{ image, reason }=> write!(f, "Docker engine failed to build image '{}': {}", image, reason),

            CreateContainerError{ name, image, err } => write!(f, "Could not create Docker container with name '{}' (image: {}): {}", name, image, err),
            StartError{ name, image, err }           => write!(f, "Could not start Docker container with name '{}' (image: {}): {}", name, image, err),
            WaitError{ name, err }                   => write!(f, "Failed to wait for Docker container with name '{}': {}", name, err),
            LogsError{ name, err }                   => write!(f, "Failed to get logs of Docker container with name '{}': {}", name, err),

            InspectContainerError{ name, err } => write!(f, "Failed to inspect Docker container with name '{}': {}", name, err),
            ContainerNoState{ name }           => write!(f, "Docker container with name '{}' has no execution state (has it been started?)", name),
            ContainerNoExitCode{ name }        => write!(f, "Docker container with name '{}' has no return code (did you wait before completing?)", name),

            ContainerStopError{ name, err }   => write!(f, "Failed to stop Docker container with name '{}': {}", name, err),
            ContainerRemoveError{ name, err } => write!(f, "Failed to remove Docker container with name '{}': {}", name, err),
        }
    }
}

impl Error for DockerError {}



/// Defines errors that occur when executing an action as a container.
#[derive(Debug)]
pub enum ExecuteError {
    /// Failed to serialize the action parameters for the container environment.
    ParametersSerializeError{ action: ActionId, err: serde_json::Error },
    /// Failed to create the per-action working directory.
    WorkdirCreateError{ action: ActionId, path: PathBuf, err: std::io::Error },
    /// The container for the given action failed somewhere in its lifecycle.
    DockerError{ action: ActionId, image: String, err: DockerError },
}

impl Display for ExecuteError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ExecuteError::*;
        match self {
            ParametersSerializeError{ action, err } => write!(f, "Failed to serialize the parameters of action '{}': {}", action, err),
            WorkdirCreateError{ action, path, err } => write!(f, "Failed to create working directory '{}' for action '{}': {}", path.display(), action, err),
            DockerError{ action, image, err }       => write!(f, "Failed to execute action '{}' (image '{}') as a Docker container: {}", action, image, err),
        }
    }
}

impl Error for ExecuteError {}



/// Defines errors that occur when writing provenance bundles.
#[derive(Debug)]
pub enum ProvenanceError {
    /// Failed to create the provenance root directory.
    DirCreateError{ path: PathBuf, err: std::io::Error },
    /// Failed to create a temporary directory to stage the bundle in.
    TempDirCreateError{ err: std::io::Error },
    /// Failed to serialize the bundle manifest.
    ManifestSerializeError{ action: ActionId, err: serde_json::Error },
    /// Failed to write one of the bundle files.
    FileWriteError{ path: PathBuf, err: std::io::Error },

    /// Failed to read the work directory while checksumming outputs.
    WorkdirReadError{ path: PathBuf, err: std::io::Error },
    /// Failed to read an entry of the work directory while checksumming outputs.
    WorkdirEntryReadError{ path: PathBuf, err: std::io::Error },
    /// Failed to read one of the output files while checksumming it.
    OutputReadError{ path: PathBuf, err: std::io::Error },

    /// Failed to archive the bundle directory into the provenance tarball.
    ArchiveError{ path: PathBuf, tarball: PathBuf, err: FsError },
}

impl Display for ProvenanceError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ProvenanceError::*;
        match self {
            DirCreateError{ path, err }            => write!(f, "Failed to create provenance directory '{}': {}", path.display(), err),
            TempDirCreateError{ err }              => write!(f, "Failed to create temporary directory to stage provenance bundle in: {}", err),
            ManifestSerializeError{ action, err }  => write!(f, "Failed to serialize provenance manifest of action '{}': {}", action, err),
            FileWriteError{ path, err }            => write!(f, "Failed to write bundle file '{}': {}", path.display(), err),

            WorkdirReadError{ path, err }      => write!(f, "Failed to read work directory '{}': {}", path.display(), err),
            WorkdirEntryReadError{ path, err } => write!(f, "Failed to read entry in work directory '{}': {}", path.display(), err),
            OutputReadError{ path, err }       => write!(f, "Failed to read output file '{}' for checksumming: {}", path.display(), err),

            ArchiveError{ path, tarball, err } => write!(f, "Failed to archive bundle directory '{}' to '{}': {}", path.display(), tarball.display(), err),
        }
    }
}

impl Error for ProvenanceError {}
