//  SPEC.rs
//    by Eisfeld
//
//  Created:
//    13 Feb 2023, 10:14:29
//  Last edited:
//    06 Apr 2023, 16:51:02
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines (public) interfaces and structs for the `floe-flw` crate.
//

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};


/***** LIBRARY *****/
/// Defines a complete Automate flow definition, i.e., the JSON an orchestrator deploys.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FlowDefinition {
    /// Human-readable account of what the flow does.
    #[serde(rename = "Comment")]
    pub comment  : String,
    /// The name of the state the orchestrator starts in.
    #[serde(rename = "StartAt")]
    pub start_at : String,
    /// The states of the flow, linked through their `Next`/`End` fields.
    #[serde(rename = "States")]
    pub states   : Map<String, Value>,
}



/// Defines a built flow plus the input keys a submission must provide.
///
/// The `required_input` list is what a caller has to put under `$.input` for every state's
/// parameter references to resolve; it is aggregated over the tools in submission order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FlowBlueprint {
    /// The flow definition itself.
    pub definition     : FlowDefinition,
    /// The `$.input` keys the definition references, deduplicated, in first-seen order.
    pub required_input : Vec<String>,
}



/// Defines a common interface for flow tools, i.e., reusable bundles of Automate states.
///
/// A tool contributes its states *unlinked*: the builder owns the `Next`/`End` fields and
/// wires consecutive tools together in submission order.
pub trait FlowTool {
    /// Returns the display name of this tool, used in errors and logs.
    fn name(&self) -> &str;

    /// Returns the states this tool contributes, in execution order.
    ///
    /// # Returns
    /// Pairs of state name and state body. The bodies must be JSON objects and must not
    /// carry `Next` or `End` fields of their own.
    fn states(&self) -> Vec<(String, Value)>;

    /// Returns the `$.input` keys the contributed states reference.
    fn required_input(&self) -> Vec<String>;
}
