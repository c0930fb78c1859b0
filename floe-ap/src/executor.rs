//  EXECUTOR.rs
//    by Eisfeld
//
//  Created:
//    20 Feb 2023, 10:33:48
//  Last edited:
//    12 Apr 2023, 17:21:36
//  Auto updated?
//    Yes
//
//  Description:
//!   Drives the container lifecycle behind admitted actions. The
//!   [`Launcher`] trait is the seam between the HTTP handlers and the
//!   Docker daemon; [`DockerLauncher`] is the real implementation, which
//!   runs every action as a background task that reports back through the
//!   [`ActionStore`].
//

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bollard::Docker;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::fs as tfs;

use floe_cfg::provider::ExecutionConfig;
use floe_shr::debug::BlockFormatter;
use specifications::action::{ActionId, ActionStatus, ActionStatusValue};

pub use crate::errors::ExecuteError as Error;
use crate::docker::{self, ComputeSpec};
use crate::provenance;
use crate::store::{self, ActionStore};


/***** CONSTANTS *****/
/// The environment variable through which a container learns the ID of the action it runs.
pub const ACTION_ID_ENV: &str = "FLOE_ACTION_ID";

/// The environment variable through which a container receives the submitted input document,
/// serialized as JSON.
pub const PARAMETERS_ENV: &str = "FLOE_PARAMETERS";

/// Where the per-action work directory is mounted inside the container.
pub const CONTAINER_WORK_DIR: &str = "/work";





/***** HELPER FUNCTIONS *****/
/// Marks the given action as failed because its container never produced a result.
///
/// # Arguments
/// - `store`: The store in which the action lives.
/// - `action`: The action to fail.
/// - `err`: What went wrong.
fn fail_action(store: &ActionStore, action: &ActionId, err: Error) {
    error!("{}", err);
    store.complete(action, ActionStatusValue::Failed, Some(json!({ "error": err.to_string() })), Utc::now());
    store.append_log(action, store::LOG_LAUNCH_FAILED, err.to_string(), None);
}

/// Runs the entire container lifecycle for a single action, start to finish.
///
/// Every outcome, good or bad, is reported through the given store; this function itself
/// never fails. Spawned as a background task by [`DockerLauncher::launch()`].
///
/// # Arguments
/// - `docker`: The connection to the local Docker daemon.
/// - `exec`: The execution part of the provider configuration.
/// - `provenance`: Where to write the provenance bundle, if anywhere.
/// - `store`: The store to report transitions to.
/// - `running`: The shared registry of live containers, by action.
/// - `status`: The status document of the freshly admitted action.
/// - `body`: The submitted input document.
/// - `params`: The same document, already serialized for the container environment.
#[allow(clippy::too_many_arguments)]
async fn run_action(docker: Docker, exec: ExecutionConfig, provenance: Option<PathBuf>, store: Arc<ActionStore>, running: Arc<DashMap<ActionId, String>>, status: ActionStatus, body: Value, params: String) {
    let action: ActionId = status.action_id.clone();

    // Prepare the per-action work directory, if one is configured
    let mut binds: Vec<String> = vec![];
    let mut work_dir: Option<PathBuf> = None;
    if let Some(root) = &exec.work_dir {
        let dir: PathBuf = root.join(action.to_string());
        if let Err(err) = tfs::create_dir_all(&dir).await {
            fail_action(&store, &action, Error::WorkdirCreateError{ action: action.clone(), path: dir, err });
            return;
        }
        binds.push(format!("{}:{}", dir.display(), CONTAINER_WORK_DIR));
        work_dir = Some(dir);
    }

    // Describe the container, then bring it up
    let spec: ComputeSpec = ComputeSpec::new(
        format!("floe-{}", action),
        exec.image.clone(),
        exec.command.clone(),
        vec![
            format!("{}={}", ACTION_ID_ENV, action),
            format!("{}={}", PARAMETERS_ENV, params),
        ],
        binds,
        exec.network.clone(),
    );
    let name: String = match docker::create_and_start(&docker, &spec).await {
        Ok(name) => name,
        Err(err) => {
            fail_action(&store, &action, Error::DockerError{ action: action.clone(), image: exec.image, err });
            return;
        },
    };
    running.insert(action.clone(), name.clone());
    store.append_log(&action, store::LOG_CONTAINER_LAUNCHED, format!("Container '{}' started", name), None);
    debug!("Action '{}' is running in container '{}'", action, name);

    // Wait for it to run its course
    let result: Result<(i32, String, String), docker::Error> = docker::join(&docker, &name, exec.keep_containers).await;
    running.remove(&action);
    let (code, stdout, stderr): (i32, String, String) = match result {
        Ok(res)  => res,
        Err(err) => {
            fail_action(&store, &action, Error::DockerError{ action: action.clone(), image: exec.image, err });
            return;
        },
    };
    debug!("Container '{}' of action '{}' returned exit code {}", name, action, code);
    debug!("Container stdout/stderr:\n\nstdout:\n{}\n\nstderr:\n{}\n", BlockFormatter::new(&stdout), BlockFormatter::new(&stderr));

    // Transition the record; a cancellation that raced us wins, so the result may be discarded
    let value: ActionStatusValue = if code == 0 { ActionStatusValue::Succeeded } else { ActionStatusValue::Failed };
    let details: Value = json!({ "exit_code": code, "stdout": stdout, "stderr": stderr });
    let applied: bool = store.complete(&action, value, Some(details), Utc::now());
    store.append_log(&action, store::LOG_CONTAINER_EXITED, format!("Container '{}' exited with code {}", name, code), Some(json!({ "exit_code": code })));
    if !applied { debug!("Action '{}' was already complete; container result not recorded", action); }

    // Finally, bundle what happened if provenance capture is on
    if let Some(root) = &provenance {
        // Prefer the store's view of the final status, since it may have recorded a
        // cancellation; fall back to a local copy if the action was released already
        let final_status: ActionStatus = store.get(&action, |_| true).unwrap_or_else(|| {
            let mut status: ActionStatus = status.clone();
            status.status          = value;
            status.completion_time = Some(Utc::now());
            status
        });
        match provenance::record(root, &final_status, &body, Some(code), &stdout, &stderr, work_dir.as_deref()).await {
            Ok(tarball) => {
                store.append_log(&action, store::LOG_PROVENANCE_RECORDED, format!("Provenance bundle written to '{}'", tarball.display()), None);
                info!("Recorded provenance of action '{}' to '{}'", action, tarball.display());
            },
            Err(err) => {
                error!("Failed to record provenance of action '{}': {}", action, err);
            },
        }
    }
}





/***** LIBRARY *****/
/// Defines a common interface for launching admitted actions.
///
/// This is mostly for testing reasons, as it allows the HTTP handlers to be exercised
/// without a Docker daemon behind them.
#[async_trait::async_trait]
pub trait Launcher: Send + Sync {
    /// Sets the given action in motion in the background.
    ///
    /// # Arguments
    /// - `status`: The status document of the freshly admitted action.
    /// - `body`: The submitted input document, passed to the container as its parameters.
    ///
    /// # Errors
    /// This function errors only if the execution could not be set in motion at all;
    /// anything that goes wrong during the run itself is reported through the store instead.
    async fn launch(&self, status: ActionStatus, body: Value) -> Result<(), Error>;

    /// Stops the running container of the given action, if it has one (best-effort).
    ///
    /// # Arguments
    /// - `action`: The action whose container to stop.
    async fn abort(&self, action: &ActionId);
}



/// Runs every launched action as a Docker container on the local daemon.
pub struct DockerLauncher {
    /// The shared connection to the local daemon.
    docker     : Docker,
    /// How containers are to be run.
    exec       : ExecutionConfig,
    /// Where to write provenance bundles, if anywhere.
    provenance : Option<PathBuf>,

    /// The store that the lifecycle reports to.
    store   : Arc<ActionStore>,
    /// The containers currently running, by action.
    running : Arc<DashMap<ActionId, String>>,
}

impl DockerLauncher {
    /// Constructor for the DockerLauncher.
    ///
    /// # Arguments
    /// - `docker`: The connection to the local Docker daemon.
    /// - `exec`: The execution part of the provider configuration.
    /// - `provenance`: Where to write provenance bundles. None disables capture.
    /// - `store`: The store to report lifecycle transitions to.
    ///
    /// # Returns
    /// A new DockerLauncher instance.
    #[inline]
    pub fn new(docker: Docker, exec: ExecutionConfig, provenance: Option<PathBuf>, store: Arc<ActionStore>) -> Self {
        Self {
            docker,
            exec,
            provenance,
            store,
            running : Arc::new(DashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl Launcher for DockerLauncher {
    async fn launch(&self, status: ActionStatus, body: Value) -> Result<(), Error> {
        // Serialize the parameters up-front, so a pathological body is caught before anything runs
        let params: String = match serde_json::to_string(&body) {
            Ok(params) => params,
            Err(err)   => { return Err(Error::ParametersSerializeError{ action: status.action_id.clone(), err }); },
        };

        // The rest of the lifecycle runs in the background
        let docker     : Docker                         = self.docker.clone();
        let exec       : ExecutionConfig                = self.exec.clone();
        let provenance : Option<PathBuf>                = self.provenance.clone();
        let store      : Arc<ActionStore>               = self.store.clone();
        let running    : Arc<DashMap<ActionId, String>> = self.running.clone();
        tokio::spawn(async move {
            run_action(docker, exec, provenance, store, running, status, body, params).await;
        });
        Ok(())
    }

    async fn abort(&self, action: &ActionId) {
        // Clone the name out of the registry so no reference is held across the stop
        let name: Option<String> = self.running.get(action).map(|entry| entry.value().clone());
        if let Some(name) = name {
            debug!("Stopping container '{}' of action '{}'...", name, action);
            if let Err(err) = docker::stop(&self.docker, &name).await {
                warn!("Failed to stop container '{}' of canceled action '{}': {}", name, action, err);
            }
        }
    }
}



/// Launches the background task that periodically removes completed actions whose release
/// deadline has passed.
///
/// # Arguments
/// - `store`: The store to sweep.
/// - `interval`: How long to sleep between sweeps.
pub fn start_sweeper(store: Arc<ActionStore>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed: Vec<ActionId> = store.sweep(Utc::now());
            if !removed.is_empty() {
                info!("Swept {} expired action(s)", removed.len());
                for action in removed {
                    debug!("Swept expired action '{}'", action);
                }
            }
        }
    });
}
