//  SPEC.rs
//    by Eisfeld
//
//  Created:
//    14 Feb 2023, 09:31:17
//  Last edited:
//    28 Mar 2023, 11:02:54
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines (public) interfaces and structs used in the `floe-ap`
//!   crate.
//

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use floe_cfg::provider::ProviderConfig;
use floe_flw::spec::FlowBlueprint;
use specifications::provider::ProviderInfo;

use crate::auth::Authenticator;
use crate::executor::Launcher;
use crate::store::ActionStore;


/***** CONSTANTS *****/
/// The fixed path prefix under which all action routes live.
pub const URL_PREFIX: &str = "cc";





/***** LIBRARY *****/
/// Defines the Context to all warp calls.
pub struct Context {
    /// The provider configuration this service was started with.
    pub config : ProviderConfig,
    /// The introspection document served on a bare GET of the prefix.
    pub info   : ProviderInfo,
    /// The companion flow definition, composed once at startup.
    pub flow   : FlowBlueprint,

    /// The in-memory action & idempotency bookkeeping, shared with the launcher.
    pub store    : Arc<ActionStore>,
    /// Resolves bearer tokens to principal sets.
    pub auth     : Authenticator,
    /// Launches (and aborts) the actual compute containers.
    pub launcher : Box<dyn Launcher>,
}



/// Defines the query parameters accepted by the enumeration endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EnumerateQuery {
    /// A comma-separated list of statuses to filter on (case-insensitive). Omitted means any.
    pub status : Option<String>,
    /// A comma-separated list of roles the caller must hold on a returned action (`creator`, `monitor_by`, `manage_by`). Omitted means any.
    pub roles  : Option<String>,
}

/// Defines the query parameters accepted by the log endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogQuery {
    /// The maximum number of entries on the returned page.
    pub limit  : Option<u64>,
    /// The number of entries to skip before the page starts.
    pub offset : Option<u64>,
}
