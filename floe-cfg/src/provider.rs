//  PROVIDER.rs
//    by Eisfeld
//
//  Created:
//    10 Feb 2023, 09:22:17
//  Last edited:
//    06 Apr 2023, 16:39:12
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the `provider.yml` file that describes a deployment: where
//!   the service binds, who it says it is, how tokens are resolved and
//!   how the compute container is run.
//

use std::fs::File;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use floe_shr::debug::EnumDebug;
use floe_shr::utilities::ensure_http_schema;
use specifications::auth::Principal;

pub use crate::errors::ProviderConfigError as Error;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    /// A config that only fills the required fields should parse with the documented defaults.
    #[test]
    fn config_minimal_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("provider.yml");
        std::fs::write(&path, r#"
address: "127.0.0.1:8080"
action_url: compute.example.org/cc
provider:
  title: Test provider
  admin_contact: support@example.org
  globus_auth_scope: https://auth.globus.org/scopes/test/action_all
  visible_to: [ public ]
  runnable_by: [ all_authenticated_users ]
auth:
  kind: static
  tokens:
    - token: secret-token
      identity: 8b84bb82-5291-4b1f-9807-8546c286c15b
execution:
  image: floe/compute:latest
"#).unwrap();

        let config: ProviderConfig = ProviderConfig::from_path(&path).unwrap();
        assert_eq!(config.execution.socket, PathBuf::from("/var/run/docker.sock"));
        assert_eq!(config.execution.network, "bridge");
        assert!(!config.execution.keep_containers);
        assert!(config.execution.build_context.is_none());
        assert!(config.provider.log_supported);
        assert_eq!(config.provider.input_schema, serde_json::json!({}));
        assert!(config.provenance.is_none());
        assert_eq!(config.default_release_after, 30 * 24 * 3600);
    }

    /// The action URL is normalized to carry a schema.
    #[test]
    fn config_action_url_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("provider.yml");
        std::fs::write(&path, r#"
address: "0.0.0.0:8080"
action_url: compute.example.org/cc
provider:
  title: Test provider
  admin_contact: support@example.org
  globus_auth_scope: https://auth.globus.org/scopes/test/action_all
  visible_to: [ public ]
  runnable_by: [ public ]
auth:
  kind: static
  tokens: []
execution:
  image: floe/compute:latest
"#).unwrap();

        let config: ProviderConfig = ProviderConfig::from_path(&path).unwrap();
        assert_eq!(config.action_url, "https://compute.example.org/cc");
    }

    /// Writing a config and reading it back should yield the same thing.
    #[test]
    fn config_roundtrip() {
        let config: ProviderConfig = ProviderConfig {
            address    : "0.0.0.0:8080".parse().unwrap(),
            action_url : "https://compute.example.org/cc".into(),

            provider : ProviderSection {
                title             : "Firn compaction model".into(),
                subtitle          : Some("v2 physics".into()),
                description       : None,
                keywords          : vec![ "glaciology".into() ],
                admin_contact     : "support@example.org".into(),
                globus_auth_scope : "https://auth.globus.org/scopes/test/action_all".into(),
                visible_to        : vec![ Principal::Public ],
                runnable_by       : vec![ Principal::AllAuthenticatedUsers ],
                administered_by   : vec![],
                log_supported     : true,
                input_schema      : serde_json::json!({ "type": "object" }),
            },
            auth : AuthConfig::Introspect {
                endpoint      : "https://auth.globus.org/v2/oauth2/token/introspect".into(),
                client_id     : "client".into(),
                client_secret : "hunter2".into(),
                cache_ttl     : 60,
            },
            execution : ExecutionConfig {
                socket          : "/var/run/docker.sock".into(),
                image           : "floe/compute:latest".into(),
                build_context   : Some("./compute".into()),
                command         : Some(vec![ "/entry.sh".into() ]),
                network         : "bridge".into(),
                keep_containers : true,
                work_dir        : Some("/var/lib/floe/work".into()),
            },

            provenance            : Some("/var/lib/floe/provenance".into()),
            default_release_after : 3600,
        };

        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("provider.yml");
        config.to_path(&path).unwrap();

        let back: ProviderConfig = ProviderConfig::from_path(&path).unwrap();
        assert_eq!(back.address, config.address);
        assert_eq!(back.provider.title, config.provider.title);
        assert_eq!(back.execution.keep_containers, config.execution.keep_containers);
        assert_eq!(back.default_release_after, 3600);
        assert!(matches!(back.auth, AuthConfig::Introspect{ cache_ttl: 60, .. }));
    }

    /// A missing file and a malformed file must be distinguishable.
    #[test]
    fn config_missing_vs_malformed() {
        let dir = tempfile::tempdir().unwrap();

        let err: Error = ProviderConfig::from_path(dir.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, Error::FileOpenError{ .. }));
        assert!(err.to_string().contains("nope.yml"));

        let path: PathBuf = dir.path().join("broken.yml");
        std::fs::write(&path, "address: [ this is not\n").unwrap();
        let err: Error = ProviderConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, Error::FileParseError{ .. }));
        assert!(err.to_string().contains("broken.yml"));
    }

    /// An auth section with an unknown kind is a parse error.
    #[test]
    fn config_unknown_auth_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("provider.yml");
        std::fs::write(&path, r#"
address: "0.0.0.0:8080"
action_url: https://compute.example.org/cc
provider:
  title: Test provider
  admin_contact: support@example.org
  globus_auth_scope: https://auth.globus.org/scopes/test/action_all
  visible_to: [ public ]
  runnable_by: [ public ]
auth:
  kind: kerberos
execution:
  image: floe/compute:latest
"#).unwrap();

        let err: Error = ProviderConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, Error::FileParseError{ .. }));
    }
}




/***** HELPER FUNCTIONS *****/
/// Returns the default Docker socket path.
#[inline]
fn default_socket() -> PathBuf { PathBuf::from("/var/run/docker.sock") }

/// Returns the default container network.
#[inline]
fn default_network() -> String { String::from("bridge") }

/// Returns the default introspection cache lifetime (seconds).
#[inline]
fn default_cache_ttl() -> u64 { 300 }

/// Returns the default for whether the log operation is advertised.
#[inline]
fn default_log_supported() -> bool { true }

/// Returns the default (empty) input schema.
#[inline]
fn default_input_schema() -> serde_json::Value { serde_json::json!({}) }

/// Returns the default release deadline for completed actions (seconds).
#[inline]
fn default_release_after() -> u64 { 30 * 24 * 3600 }





/***** LIBRARY *****/
/// Defines the metadata half of the introspection document, i.e., who this provider says it is.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderSection {
    /// Human-readable name of the provider.
    pub title       : String,
    /// Optional secondary name.
    pub subtitle    : Option<String>,
    /// Optional longer account of what running this provider does.
    pub description : Option<String>,
    /// Search keywords.
    #[serde(default)]
    pub keywords    : Vec<String>,

    /// Where humans complain.
    pub admin_contact     : String,
    /// The auth scope a client must hold a token for to talk to this provider.
    pub globus_auth_scope : String,

    /// Principals that may see the introspection document and the companion flow.
    pub visible_to      : Vec<Principal>,
    /// Principals that may submit runs.
    pub runnable_by     : Vec<Principal>,
    /// Principals that administer the deployment.
    #[serde(default)]
    pub administered_by : Vec<Principal>,

    /// Whether the log operation is advertised.
    #[serde(default = "default_log_supported")]
    pub log_supported : bool,
    /// JSON schema describing the expected `body` of a run request.
    #[serde(default = "default_input_schema")]
    pub input_schema  : serde_json::Value,
}



/// Defines a single token record for the static authentication backend.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StaticToken {
    /// The literal bearer token value.
    pub token    : String,
    /// The identity the token resolves to.
    pub identity : Uuid,
    /// The groups that identity is a member of.
    #[serde(default)]
    pub groups   : Vec<Uuid>,
}

/// Defines how bearer tokens are resolved to identities.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuthConfig {
    /// Tokens are listed in the config itself. Meant for single-machine and test
    /// deployments; anyone who can read the config can impersonate anyone in it.
    Static {
        /// The tokens this deployment accepts.
        tokens : Vec<StaticToken>,
    },

    /// Tokens are resolved by POSTing them to a remote introspection endpoint.
    Introspect {
        /// The introspection endpoint to POST tokens to.
        endpoint      : String,
        /// The client ID used as the basic-auth username.
        client_id     : String,
        /// The client secret used as the basic-auth password.
        client_secret : String,
        /// How long a resolved token may be served from cache (seconds).
        #[serde(default = "default_cache_ttl")]
        cache_ttl     : u64,
    },
}

impl EnumDebug for AuthConfig {
    #[inline]
    fn fmt_name(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use AuthConfig::*;
        match self {
            Static{ .. }     => write!(f, "Static"),
            Introspect{ .. } => write!(f, "Introspect"),
        }
    }
}



/// Defines how the compute container is run.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// The Docker socket to connect to.
    #[serde(default = "default_socket")]
    pub socket        : PathBuf,
    /// The image every action runs.
    pub image         : String,
    /// A directory with a Dockerfile; when given, a missing image is built from it instead
    /// of pulled.
    pub build_context : Option<PathBuf>,

    /// Overrides the image's command.
    pub command         : Option<Vec<String>>,
    /// The Docker network containers are attached to.
    #[serde(default = "default_network")]
    pub network         : String,
    /// Whether finished containers are left around for inspection.
    #[serde(default)]
    pub keep_containers : bool,
    /// A host directory; when given, a per-action subdirectory is bind-mounted at `/work`
    /// in the container and scanned for provenance afterwards.
    pub work_dir        : Option<PathBuf>,
}



/// Defines a `provider.yml` file that describes a deployment.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// The socket address the service binds.
    pub address    : SocketAddr,
    /// The public base URL under which orchestrators reach this provider.
    pub action_url : String,

    /// Who this provider says it is.
    pub provider  : ProviderSection,
    /// How bearer tokens are resolved to identities.
    pub auth      : AuthConfig,
    /// How the compute container is run.
    pub execution : ExecutionConfig,

    /// Where completed actions are bundled. None disables provenance capture.
    pub provenance            : Option<PathBuf>,
    /// Seconds before a completed action is swept when the request named no
    /// `release_after` itself.
    #[serde(default = "default_release_after")]
    pub default_release_after : u64,
}

impl ProviderConfig {
    /// Constructor for the ProviderConfig that reads it from the given path.
    ///
    /// # Arguments
    /// - `path`: The path to read the ProviderConfig from.
    ///
    /// # Returns
    /// A new ProviderConfig instance with the contents defined in the file. The action URL
    /// is normalized to carry an HTTP(S) schema.
    ///
    /// # Errors
    /// This function errors if the given file cannot be read or has an invalid format.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path: &Path = path.as_ref();

        // Get the raw file to parse
        let mut raw: String = String::new();
        {
            // Open the file
            let mut handle: File = match File::open(path) {
                Ok(handle) => handle,
                Err(err)   => { return Err(Error::FileOpenError { path: path.into(), err }); },
            };

            // Read the file
            if let Err(err) = handle.read_to_string(&mut raw) { return Err(Error::FileReadError { path: path.into(), err }); }
        }

        // Parse with serde
        let mut config: Self = match serde_yaml::from_str(&raw) {
            Ok(config) => config,
            Err(err)   => { return Err(Error::FileParseError { path: path.into(), err }); },
        };

        // Normalize the action URL so the flow tools can rely on it
        config.action_url = match ensure_http_schema(&config.action_url, true) {
            Ok(url)  => url,
            Err(err) => { return Err(Error::IllegalActionUrl{ raw: config.action_url, err }); },
        };
        debug!("Loaded provider config '{}' ({} auth backend)", path.display(), config.auth.variant());

        // Done
        Ok(config)
    }

    /// Writes the ProviderConfig to the given path.
    ///
    /// # Arguments
    /// - `path`: The path to write the ProviderConfig to.
    ///
    /// # Returns
    /// Nothing, but does obviously create a new file with this ProviderConfig's contents.
    ///
    /// # Errors
    /// This function errors if the given file cannot be written or we failed to serialize ourselves.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path: &Path = path.as_ref();

        // Serialize the config
        let config: String = match serde_yaml::to_string(self) {
            Ok(config) => config,
            Err(err)   => { return Err(Error::ConfigSerializeError{ err }); },
        };

        // Write it
        {
            // Create the file
            let mut handle: File = match File::create(path) {
                Ok(handle) => handle,
                Err(err)   => { return Err(Error::FileCreateError { path: path.into(), err }); },
            };

            // Write the serialized config
            if let Err(err) = handle.write_all(config.as_bytes()) { return Err(Error::FileWriteError { path: path.into(), err }); }
        }

        // Done
        Ok(())
    }
}

impl AsRef<ProviderConfig> for ProviderConfig {
    #[inline]
    fn as_ref(&self) -> &Self { self }
}
impl From<&ProviderConfig> for ProviderConfig {
    #[inline]
    fn from(value: &ProviderConfig) -> Self { value.clone() }
}
