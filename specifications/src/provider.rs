//  PROVIDER.rs
//    by Eisfeld
//
//  Created:
//    08 Feb 2023, 09:33:28
//  Last edited:
//    21 Mar 2023, 10:19:04
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the introspection document a provider advertises at its root.
//

use serde::{Deserialize, Serialize};

use crate::auth::Principal;


/***** TESTS *****/




/***** CONSTANTS *****/
/// The only provider type this contract defines.
pub const ACTION_TYPE: &str = "Action";
/// The contract version this data model implements.
pub const API_VERSION: &str = "1.0";





/***** LIBRARY *****/
/// Defines the introspection document a provider advertises at its root.
///
/// Orchestrators fetch this before composing a flow to learn what the provider is, who may
/// run it and what input it expects.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderInfo {
    /// The provider types implemented here (always `["Action"]`).
    pub types             : Vec<String>,
    /// The contract version (always `"1.0"`).
    pub api_version       : String,
    /// The auth scope a client must hold a token for to talk to this provider.
    pub globus_auth_scope : String,

    /// Human-readable name of the provider.
    pub title       : String,
    /// Optional secondary name.
    pub subtitle    : Option<String>,
    /// Optional longer account of what running this provider does.
    pub description : Option<String>,
    /// Search keywords.
    pub keywords    : Vec<String>,

    /// Principals that may see this document (and the companion flow).
    pub visible_to      : Vec<Principal>,
    /// Principals that may submit runs.
    pub runnable_by     : Vec<Principal>,
    /// Principals that administer the deployment.
    pub administered_by : Vec<Principal>,
    /// Where humans complain.
    pub admin_contact   : String,

    /// Whether run calls block until completion. This provider is asynchronous, so false.
    pub synchronous   : bool,
    /// Whether the log operation is implemented.
    pub log_supported : bool,
    /// JSON schema describing the expected `body` of a run request.
    pub input_schema  : serde_json::Value,
}
