//  DOCKER.rs
//    by Eisfeld
//
//  Created:
//    17 Feb 2023, 14:09:26
//  Last edited:
//    04 Apr 2023, 09:57:12
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines functions that interact with the local Docker daemon:
//!   bootstrapping the compute image and running the per-action
//!   containers.
//

use std::path::{Path, PathBuf};

use bollard::{API_DEFAULT_VERSION, Docker};
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions
};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::models::{BuildInfo, HostConfig};
use futures_util::stream::TryStreamExt;
use futures_util::StreamExt;
use hyper::Body;
use log::debug;
use tempfile::TempDir;
use tokio::fs::File as TFile;
use tokio_util::codec::{BytesCodec, FramedRead};
use uuid::Uuid;

use floe_shr::fs::archive_async;

pub use crate::errors::DockerError as Error;


/***** AUXILLARY STRUCTS *****/
/// Collects everything we need to run one compute container.
#[derive(Clone, Debug)]
pub struct ComputeSpec {
    /// The name prefix of the container-to-be (a random suffix is added per run).
    pub name    : String,
    /// The image to run.
    pub image   : String,
    /// The command to run in the container, if the image default is to be overridden.
    pub command : Option<Vec<String>>,

    /// The environment to pass, as `KEY=value` pairs.
    pub env     : Vec<String>,
    /// The extra mounts to add, as `host:container` bind strings.
    pub binds   : Vec<String>,
    /// The network to connect the container to.
    pub network : String,
}

impl ComputeSpec {
    /// Constructor for the ComputeSpec.
    ///
    /// # Arguments
    /// - `name`: The name prefix of the container-to-be.
    /// - `image`: The image to run.
    /// - `command`: The command to run in the container, if the image default is to be overridden.
    /// - `env`: The environment to pass, as `KEY=value` pairs.
    /// - `binds`: The extra mounts to add, as `host:container` bind strings.
    /// - `network`: The network to connect the container to.
    ///
    /// # Returns
    /// A new ComputeSpec instance populated with the given values.
    #[inline]
    pub fn new(name: impl Into<String>, image: impl Into<String>, command: Option<Vec<String>>, env: Vec<String>, binds: Vec<String>, network: impl Into<String>) -> Self {
        ComputeSpec {
            name  : name.into(),
            image : image.into(),
            command,

            env,
            binds,
            network : network.into(),
        }
    }
}





/***** HELPER FUNCTIONS *****/
/// Builds the compute image from the given build context directory.
///
/// The context is packed into a gzipped tarball (with the `Dockerfile` expected at
/// its root) and streamed to the daemon.
///
/// # Arguments
/// - `docker`: An already connected local instance of Docker.
/// - `image`: The tag to give the built image.
/// - `context`: The directory to use as the build context.
///
/// # Errors
/// This function errors if the context could not be packed or the daemon refused or
/// failed the build.
async fn build_image(docker: &Docker, image: &str, context: &Path) -> Result<(), Error> {
    // Pack the build context in a scratch directory
    let tmpdir: TempDir = match TempDir::new() {
        Ok(tmpdir) => tmpdir,
        Err(err)   => { return Err(Error::TempDirCreateError{ err }); },
    };
    let tar_path: PathBuf = tmpdir.path().join("context.tar.gz");
    if let Err(err) = archive_async(context, &tar_path, true).await {
        return Err(Error::ContextArchiveError{ path: context.into(), err });
    }

    // Open the archive with a FramedReader, freezing all the chunks we read
    let handle: TFile = match TFile::open(&tar_path).await {
        Ok(handle) => handle,
        Err(err)   => { return Err(Error::ContextOpenError{ path: tar_path, err }); },
    };
    let byte_stream = FramedRead::new(handle, BytesCodec::new()).map(|r| {
        let bytes = r.unwrap().freeze();
        Ok::<_, Error>(bytes)
    });

    // Wrap it in a HTTP body and hand it to the Docker API
    let options: BuildImageOptions<String> = BuildImageOptions {
        dockerfile : "Dockerfile".into(),
        t          : image.into(),
        rm         : true,
        ..Default::default()
    };
    let body = Body::wrap_stream(byte_stream);
    let infos: Vec<BuildInfo> = match docker.build_image(options, None, Some(body)).try_collect().await {
        Ok(infos) => infos,
        Err(err)  => { return Err(Error::ImageBuildError{ image: image.into(), err }); },
    };

    // The daemon reports build failures inside the stream rather than as transport errors
    for info in infos {
        if let Some(reason) = info.error {
            return Err(Error::ImageBuildFailure{ image: image.into(), reason });
        }
    }
    Ok(())
}

/// Pulls the compute image from its registry.
///
/// # Arguments
/// - `docker`: An already connected local instance of Docker.
/// - `image`: The image to pull.
///
/// # Errors
/// This function errors if we failed to pull the image, e.g., the Docker engine did
/// not know where to find it, or there was no internet.
async fn pull_image(docker: &Docker, image: &str) -> Result<(), Error> {
    // Define the options for this image
    let options = Some(CreateImageOptions {
        from_image : image,
        ..Default::default()
    });

    // Try to create it
    match docker.create_image(options, None, None).try_collect::<Vec<_>>().await {
        Ok(_)    => Ok(()),
        Err(err) => Err(Error::ImagePullError{ image: image.into(), err }),
    }
}

/// Returns the exit code of a container that is (hopefully) already stopped.
///
/// # Arguments
/// - `docker`: The Docker instance to use for accessing the container.
/// - `name`: The container's name.
///
/// # Returns
/// The exit-/returncode that was returned by the container.
///
/// # Errors
/// This function errors if the Docker daemon could not be reached, such a container
/// did not exist, could not be inspected or did not have a return code (yet).
async fn returncode_container(docker: &Docker, name: impl AsRef<str>) -> Result<i32, Error> {
    let name: &str = name.as_ref();

    // Do the inspect call
    let info = match docker.inspect_container(name, None).await {
        Ok(info)    => info,
        Err(reason) => { return Err(Error::InspectContainerError{ name: name.into(), err: reason }); }
    };

    // Try to get the execution state from the container
    let state = match info.state {
        Some(state) => state,
        None        => { return Err(Error::ContainerNoState{ name: name.into() }); }
    };

    // Finally, try to get the exit code itself
    match state.exit_code {
        Some(code) => Ok(code as i32),
        None       => Err(Error::ContainerNoExitCode{ name: name.into() }),
    }
}

/// Tries to remove the docker container with the given name.
///
/// # Arguments
/// - `docker`: An already connected local instance of Docker.
/// - `name`: The name of the container to remove.
///
/// # Errors
/// This function errors if we failed to remove it.
async fn remove_container(docker: &Docker, name: impl AsRef<str>) -> Result<(), Error> {
    let name: &str = name.as_ref();

    // Set the options
    let remove_options = Some(RemoveContainerOptions {
        force: true,
        ..Default::default()
    });

    // Attempt the removal
    match docker.remove_container(name, remove_options).await {
        Ok(_)       => Ok(()),
        Err(reason) => Err(Error::ContainerRemoveError{ name: name.into(), err: reason }),
    }
}





/***** LIBRARY *****/
/// Connects to the local Docker daemon over its unix socket.
///
/// # Arguments
/// - `socket`: The path of the socket to connect through.
///
/// # Returns
/// A Docker handle that the other functions in this module accept.
///
/// # Errors
/// This function errors if the connection could not be set up.
pub fn connect(socket: impl AsRef<Path>) -> Result<Docker, Error> {
    let socket: &Path = socket.as_ref();

    match Docker::connect_with_unix(&socket.to_string_lossy(), 120, API_DEFAULT_VERSION) {
        Ok(docker)  => Ok(docker),
        Err(reason) => Err(Error::ConnectionError{ path: socket.into(), version: *API_DEFAULT_VERSION, err: reason }),
    }
}

/// Makes sure the compute image exists in the local Docker daemon.
///
/// # Arguments
/// - `docker`: An already connected local instance of Docker.
/// - `image`: The image the provider is configured to run.
/// - `build_context`: If given, a directory to build the image from when it is
///   missing. Without it, a missing image is pulled by name instead.
///
/// # Errors
/// This function errors if it failed to ensure the image existed (i.e., build or
/// pull failed).
pub async fn ensure_compute_image(docker: &Docker, image: impl AsRef<str>, build_context: Option<impl AsRef<Path>>) -> Result<(), Error> {
    let image: &str = image.as_ref();

    // Abort if the image is already loaded
    if docker.inspect_image(image).await.is_ok() {
        debug!("Compute image '{}' already exists in Docker daemon.", image);
        return Ok(());
    }
    debug!("Compute image '{}' doesn't exist in Docker daemon.", image);

    // Otherwise, build it if a context is configured or pull it
    match build_context {
        Some(context) => {
            debug!(" > Building from context '{}'...", context.as_ref().display());
            build_image(docker, image, context.as_ref()).await
        },
        None => {
            debug!(" > Pulling image '{}'...", image);
            pull_image(docker, image).await
        },
    }
}

/// Creates a container for the given spec and starts it (non-blocking after that).
///
/// # Arguments
/// - `docker`: The Docker instance to use for accessing the container.
/// - `spec`: The ComputeSpec describing what to launch and how.
///
/// # Returns
/// The name of the container such that it can be waited on later.
///
/// # Errors
/// This function may error for many reasons, which usually means that the container
/// failed to be created or started.
pub async fn create_and_start(docker: &Docker, spec: &ComputeSpec) -> Result<String, Error> {
    // Generate unique (temporary) container name
    let container_name: String = format!("{}-{}", spec.name, &Uuid::new_v4().to_string()[..6]);
    let create_options = CreateContainerOptions { name: &container_name };

    // Combine the properties in the spec into a HostConfig
    let host_config = HostConfig {
        binds        : Some(spec.binds.iter().map(|bind| { debug!("Binding '{}' (host:container)", bind); bind.clone() }).collect()),
        network_mode : Some(spec.network.clone()),
        privileged   : Some(false),
        ..Default::default()
    };

    // Create the container config
    let create_config: Config<String> = Config {
        image       : Some(spec.image.clone()),
        cmd         : spec.command.clone(),
        env         : Some(spec.env.clone()),
        host_config : Some(host_config),
        ..Default::default()
    };

    // Run it with that config
    debug!("Launching container with name '{}' (image: {})...", container_name, spec.image);
    if let Err(reason) = docker.create_container(Some(create_options), create_config).await { return Err(Error::CreateContainerError{ name: container_name, image: spec.image.clone(), err: reason }); }
    debug!(" > Container created");
    match docker.start_container(&container_name, None::<StartContainerOptions<String>>).await {
        Ok(_) => {
            debug!(" > Container '{}' started", container_name);
            Ok(container_name)
        },
        Err(reason) => Err(Error::StartError{ name: container_name, image: spec.image.clone(), err: reason }),
    }
}

/// Joins the container with the given name, i.e., waits for it to complete and
/// returns its results.
///
/// # Arguments
/// - `docker`: The Docker instance to use for accessing the container.
/// - `name`: The name of the container to wait on.
/// - `keep_container`: Whether to keep the container around after it's finished or
///   not.
///
/// # Returns
/// The return code of the docker container, its stdout and its stderr (in that
/// order).
///
/// # Errors
/// This function may error for many reasons, which usually means that the container
/// is unknown or the Docker engine is unreachable.
pub async fn join(docker: &Docker, name: impl AsRef<str>, keep_container: bool) -> Result<(i32, String, String), Error> {
    let name: &str = name.as_ref();

    // Wait for the container to complete
    if let Err(reason) = docker.wait_container(name, None::<WaitContainerOptions<String>>).try_collect::<Vec<_>>().await {
        return Err(Error::WaitError{ name: name.into(), err: reason });
    }

    // Get stdout and stderr logs from container
    let logs_options = Some(LogsOptions::<String> {
        stdout: true,
        stderr: true,
        ..Default::default()
    });
    let log_outputs = match docker.logs(name, logs_options).try_collect::<Vec<LogOutput>>().await {
        Ok(out)     => out,
        Err(reason) => { return Err(Error::LogsError{ name: name.into(), err: reason }); }
    };

    // Collect them in one string per output channel
    let mut stderr = String::new();
    let mut stdout = String::new();
    for log_output in log_outputs {
        match log_output {
            LogOutput::StdErr { message } => stderr.push_str(String::from_utf8_lossy(&message).as_ref()),
            LogOutput::StdOut { message } => stdout.push_str(String::from_utf8_lossy(&message).as_ref()),
            _ => { continue; },
        }
    }

    // Get the container's exit status by inspecting it
    let code = returncode_container(docker, name).await?;

    // Don't leave behind any waste: remove container (but only if told to do so!)
    if !keep_container { remove_container(docker, name).await?; }

    // Return the return data of this container!
    Ok((code, stdout, stderr))
}

/// Stops the container with the given name, asking politely first.
///
/// The container is _not_ removed; whoever is joining it still collects its output
/// and cleans it up the normal way.
///
/// # Arguments
/// - `docker`: The Docker instance to use for accessing the container.
/// - `name`: The name of the container to stop.
///
/// # Errors
/// This function errors if the daemon could not stop the container (e.g., it is
/// already gone).
pub async fn stop(docker: &Docker, name: impl AsRef<str>) -> Result<(), Error> {
    let name: &str = name.as_ref();

    // Give the process a grace period before the daemon kills it
    let stop_options = Some(StopContainerOptions { t: 10 });
    match docker.stop_container(name, stop_options).await {
        Ok(_)       => Ok(()),
        Err(reason) => Err(Error::ContainerStopError{ name: name.into(), err: reason }),
    }
}
