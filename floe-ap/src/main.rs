//  MAIN.rs
//    by Eisfeld
//
//  Created:
//    23 Feb 2023, 13:27:41
//  Last edited:
//    14 Apr 2023, 15:06:20
//  Auto updated?
//    Yes
//
//  Description:
//!   Entrypoint to the `floe-ap` service.
//

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bollard::Docker;
use clap::Parser;
use dotenvy::dotenv;
use log::{debug, error, info, LevelFilter};
use warp::Filter;

use floe_cfg::provider::ProviderConfig;
use floe_flw::builder::FlowBuilder;
use floe_flw::spec::FlowBlueprint;
use floe_flw::tools::{ComputeTool, TransferTool};
use specifications::provider::{ProviderInfo, ACTION_TYPE, API_VERSION};

use floe_ap::actions;
use floe_ap::auth::Authenticator;
use floe_ap::docker;
use floe_ap::executor::{self, DockerLauncher};
use floe_ap::health;
use floe_ap::spec::{Context, EnumerateQuery, LogQuery, URL_PREFIX};
use floe_ap::store::ActionStore;
use floe_ap::version;


/***** CONSTANTS *****/
/// How long the sweeper sleeps between two passes over the store.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);





/***** ARGUMENTS *****/
/// Defines the arguments for the `floe-ap` service.
#[derive(Parser)]
struct Args {
    #[clap(long, action, help = "If given, provides additional debug prints on the logger.", env = "DEBUG")]
    debug : bool,

    /// Load everything from the provider.yml file
    #[clap(short, long, default_value = "/provider.yml", help = "The path to the provider configuration. This defines who may see and run what, how the compute container is run and where this service binds.", env = "PROVIDER_CONFIG_PATH")]
    config_path : PathBuf,
}





/***** ENTRYPOINT *****/
#[tokio::main]
async fn main() {
    // Read the env & CLI args
    dotenv().ok();
    let args = Args::parse();

    // Setup the logger according to the debug flag
    let mut logger = env_logger::builder();
    logger.format_module_path(false);
    if args.debug {
        logger.filter_level(LevelFilter::Debug).init();
    } else {
        logger.filter_level(LevelFilter::Info).init();
    }
    info!("Initializing floe-ap v{}...", env!("CARGO_PKG_VERSION"));

    // Load the provider configuration
    debug!("Loading provider.yml file '{}'...", args.config_path.display());
    let config: ProviderConfig = match ProviderConfig::from_path(&args.config_path) {
        Ok(config) => config,
        Err(err)   => {
            error!("Failed to load ProviderConfig file: {}", err);
            std::process::exit(1);
        },
    };

    // Make sure the compute image exists before we advertise anything
    let docker: Docker = match docker::connect(&config.execution.socket) {
        Ok(docker) => docker,
        Err(err)   => {
            error!("Failed to connect to the local Docker daemon: {}", err);
            std::process::exit(1);
        },
    };
    if let Err(err) = docker::ensure_compute_image(&docker, &config.execution.image, config.execution.build_context.as_ref()).await {
        error!("Failed to prepare compute image '{}': {}", config.execution.image, err);
        std::process::exit(1);
    }

    // Compose the introspection document & the companion flow
    let info: ProviderInfo = ProviderInfo {
        types             : vec![ ACTION_TYPE.into() ],
        api_version       : API_VERSION.into(),
        globus_auth_scope : config.provider.globus_auth_scope.clone(),
        title             : config.provider.title.clone(),
        subtitle          : config.provider.subtitle.clone(),
        description       : config.provider.description.clone(),
        keywords          : config.provider.keywords.clone(),
        visible_to        : config.provider.visible_to.clone(),
        runnable_by       : config.provider.runnable_by.clone(),
        administered_by   : config.provider.administered_by.clone(),
        admin_contact     : config.provider.admin_contact.clone(),
        synchronous       : false,
        log_supported     : config.provider.log_supported,
        input_schema      : config.provider.input_schema.clone(),
    };
    let flow: FlowBlueprint = match FlowBuilder::new(format!("Stage inputs to, run and collect results from '{}'", config.provider.title))
        .then(&TransferTool::new("TransferIn", "transfer_in"))
        .then(&ComputeTool::new(config.action_url.clone()))
        .then(&TransferTool::new("TransferOut", "transfer_out"))
        .build()
    {
        Ok(flow) => flow,
        Err(err) => {
            error!("Failed to build companion flow: {}", err);
            std::process::exit(1);
        },
    };

    // Assemble the shared state
    let store: Arc<ActionStore> = Arc::new(ActionStore::new());
    let launcher: DockerLauncher = DockerLauncher::new(docker, config.execution.clone(), config.provenance.clone(), store.clone());
    executor::start_sweeper(store.clone(), SWEEP_INTERVAL);
    let auth: Authenticator = Authenticator::new(config.auth.clone());
    let address: SocketAddr = config.address;
    let context: Arc<Context> = Arc::new(Context {
        config,
        info,
        flow,
        store,
        auth,
        launcher : Box::new(launcher),
    });
    let context = warp::any().map(move || context.clone());

    // Prepare the filters for the webserver
    let enumerate = warp::get()
        .and(warp::path(URL_PREFIX))
        .and(warp::path::end())
        .and(warp::query::<EnumerateQuery>())
        .and(warp::header::optional::<String>("authorization"))
        .and(context.clone())
        .and_then(actions::enumerate);
    let run = warp::post()
        .and(warp::path(URL_PREFIX))
        .and(warp::path("run"))
        .and(warp::path::end())
        .and(warp::body::bytes())
        .and(warp::header::optional::<String>("authorization"))
        .and(context.clone())
        .and_then(actions::run);
    let flow = warp::get()
        .and(warp::path(URL_PREFIX))
        .and(warp::path("flow"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("authorization"))
        .and(context.clone())
        .and_then(actions::flow);
    let status = warp::get()
        .and(warp::path(URL_PREFIX))
        .and(warp::path::param())
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("authorization"))
        .and(context.clone())
        .and_then(actions::status);
    let cancel = warp::post()
        .and(warp::path(URL_PREFIX))
        .and(warp::path::param())
        .and(warp::path("cancel"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("authorization"))
        .and(context.clone())
        .and_then(actions::cancel);
    let release = warp::post()
        .and(warp::path(URL_PREFIX))
        .and(warp::path::param())
        .and(warp::path("release"))
        .and(warp::path::end())
        .and(warp::header::optional::<String>("authorization"))
        .and(context.clone())
        .and_then(actions::release);
    let log = warp::get()
        .and(warp::path(URL_PREFIX))
        .and(warp::path::param())
        .and(warp::path("log"))
        .and(warp::path::end())
        .and(warp::query::<LogQuery>())
        .and(warp::header::optional::<String>("authorization"))
        .and(context.clone())
        .and_then(actions::log);
    let version = warp::path("version")
        .and(warp::path::end())
        .and_then(version::get);
    let health = warp::path("health")
        .and(warp::path::end())
        .and(context.clone())
        .and_then(health::get);
    let filter = enumerate.or(run).or(flow).or(status).or(cancel).or(release).or(log).or(version).or(health).with(warp::log("floe-ap"));

    // Run it
    info!("Binding '{}'...", address);
    warp::serve(filter).run(address).await;
}
