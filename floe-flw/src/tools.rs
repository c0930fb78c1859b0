//  TOOLS.rs
//    by Eisfeld
//
//  Created:
//    13 Feb 2023, 10:31:17
//  Last edited:
//    11 Apr 2023, 09:22:46
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the reusable flow tools: hosted-service Action states
//!   (transfer, funcx-style tar/encrypt, search ingest) and the state
//!   pointing at a provider's own action URL.
//

use serde_json::{json, Value};

use crate::spec::FlowTool;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    /// The transfer state must reference the prefixed input keys.
    #[test]
    fn transfer_uses_prefix() {
        let tool: TransferTool = TransferTool::new("TransferIn", "transfer_in");
        let states: Vec<(String, Value)> = tool.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].0, "TransferIn");

        let state: &Value = &states[0].1;
        assert_eq!(state["Type"], json!("Action"));
        assert_eq!(state["ActionUrl"], json!(TRANSFER_ACTION_URL));
        assert_eq!(state["Parameters"]["source_endpoint_id.$"], json!("$.input.transfer_in_source_endpoint_id"));
        assert_eq!(state["Parameters"]["transfer_items"][0]["destination_path.$"], json!("$.input.transfer_in_destination_path"));
        assert!(state.get("Next").is_none());
        assert!(state.get("End").is_none());

        assert!(tool.required_input().contains(&"transfer_in_source_path".to_string()));
    }

    /// Two transfers with different prefixes must not share input keys.
    #[test]
    fn transfer_prefixes_disjoint() {
        let inbound: TransferTool  = TransferTool::new("TransferIn", "transfer_in");
        let outbound: TransferTool = TransferTool::new("TransferOut", "transfer_out");
        for key in inbound.required_input() {
            assert!(!outbound.required_input().contains(&key));
        }
    }

    /// The compute state points at the provider given at construction.
    #[test]
    fn compute_points_at_provider() {
        let tool: ComputeTool = ComputeTool::new("https://compute.example.org/cc");
        let states: Vec<(String, Value)> = tool.states();
        assert_eq!(states[0].0, "Compute");
        assert_eq!(states[0].1["ActionUrl"], json!("https://compute.example.org/cc"));
        assert_eq!(states[0].1["Parameters.$"], json!("$.input.compute_parameters"));
        assert_eq!(tool.required_input(), vec![ "compute_parameters".to_string() ]);
    }

    /// The funcx-style tools share the compute endpoint key but keep their own payloads.
    #[test]
    fn funcx_tools_share_endpoint() {
        let tar: TarTool = TarTool::new();
        let encrypt: EncryptTool = EncryptTool::new();
        assert!(tar.required_input().contains(&"compute_endpoint".to_string()));
        assert!(encrypt.required_input().contains(&"compute_endpoint".to_string()));
        assert!(tar.required_input().contains(&"tar_input".to_string()));
        assert!(encrypt.required_input().contains(&"encrypt_key".to_string()));

        let state: Value = tar.states().pop().unwrap().1;
        assert_eq!(state["ActionUrl"], json!(COMPUTE_ACTION_URL));
        assert_eq!(state["Parameters"]["tasks"][0]["function.$"], json!("$.input.tar_function"));
    }

    /// The publish state carries the index/subject/metadata references.
    #[test]
    fn publish_references_search_input() {
        let tool: PublishTool = PublishTool::new();
        let state: Value = tool.states().pop().unwrap().1;
        assert_eq!(state["ActionUrl"], json!(SEARCH_INGEST_ACTION_URL));
        assert_eq!(state["Parameters"]["search_index.$"], json!("$.input.publish_index"));
        assert_eq!(state["Parameters"]["subject.$"], json!("$.input.publish_subject"));
        assert_eq!(state["Parameters"]["content.$"], json!("$.input.publish_metadata"));
    }
}




/***** CONSTANTS *****/
/// The hosted transfer action.
pub const TRANSFER_ACTION_URL: &str = "https://actions.automate.globus.org/transfer/transfer";
/// The hosted funcx/compute action.
pub const COMPUTE_ACTION_URL: &str = "https://compute.actions.globus.org";
/// The hosted search-ingest action.
pub const SEARCH_INGEST_ACTION_URL: &str = "https://actions.globus.org/search/ingest";





/***** LIBRARY *****/
/// A tool that moves a file or directory between two endpoints through the hosted transfer
/// action.
///
/// The input keys are prefixed so that a single flow can carry several transfers (say, an
/// inbound staging transfer and an outbound results transfer) without their inputs
/// colliding.
#[derive(Clone, Debug)]
pub struct TransferTool {
    /// The name of the contributed state.
    state  : String,
    /// The prefix its `$.input` keys carry.
    prefix : String,
}

impl TransferTool {
    /// Constructor for the TransferTool.
    ///
    /// # Arguments
    /// - `state`: The name the contributed state gets (e.g. `TransferIn`).
    /// - `prefix`: The prefix for the `$.input` keys (e.g. `transfer_in`).
    ///
    /// # Returns
    /// A new TransferTool instance.
    #[inline]
    pub fn new(state: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            state  : state.into(),
            prefix : prefix.into(),
        }
    }
}

impl FlowTool for TransferTool {
    #[inline]
    fn name(&self) -> &str { "transfer" }

    fn states(&self) -> Vec<(String, Value)> {
        vec![(self.state.clone(), json!({
            "Comment"   : "Transfer a file or directory between two endpoints",
            "Type"      : "Action",
            "ActionUrl" : TRANSFER_ACTION_URL,
            "Parameters" : {
                "source_endpoint_id.$"      : format!("$.input.{}_source_endpoint_id", self.prefix),
                "destination_endpoint_id.$" : format!("$.input.{}_destination_endpoint_id", self.prefix),
                "transfer_items" : [{
                    "source_path.$"      : format!("$.input.{}_source_path", self.prefix),
                    "destination_path.$" : format!("$.input.{}_destination_path", self.prefix),
                    "recursive.$"        : format!("$.input.{}_recursive", self.prefix),
                }],
            },
            "ResultPath" : format!("$.{}", self.state),
            "WaitTime"   : 21600,
        }))]
    }

    fn required_input(&self) -> Vec<String> {
        vec![
            format!("{}_source_endpoint_id", self.prefix),
            format!("{}_destination_endpoint_id", self.prefix),
            format!("{}_source_path", self.prefix),
            format!("{}_destination_path", self.prefix),
            format!("{}_recursive", self.prefix),
        ]
    }
}



/// A tool that runs the containerized compute step on a provider of this project.
///
/// The whole `$.input.compute_parameters` object is forwarded as the action body, which the
/// provider validates against its advertised input schema.
#[derive(Clone, Debug)]
pub struct ComputeTool {
    /// The action URL of the provider deployment.
    action_url : String,
}

impl ComputeTool {
    /// Constructor for the ComputeTool.
    ///
    /// # Arguments
    /// - `action_url`: The public action URL of the provider that should run the step.
    ///
    /// # Returns
    /// A new ComputeTool instance.
    #[inline]
    pub fn new(action_url: impl Into<String>) -> Self {
        Self {
            action_url : action_url.into(),
        }
    }
}

impl FlowTool for ComputeTool {
    #[inline]
    fn name(&self) -> &str { "compute" }

    fn states(&self) -> Vec<(String, Value)> {
        vec![("Compute".into(), json!({
            "Comment"      : "Run the containerized compute step",
            "Type"         : "Action",
            "ActionUrl"    : self.action_url,
            "Parameters.$" : "$.input.compute_parameters",
            "ResultPath"   : "$.Compute",
            "WaitTime"     : 86400,
        }))]
    }

    #[inline]
    fn required_input(&self) -> Vec<String> {
        vec![ "compute_parameters".into() ]
    }
}



/// A tool that packs a path into a tarball on a funcx-style compute endpoint.
#[derive(Clone, Debug)]
pub struct TarTool;

impl TarTool {
    /// Constructor for the TarTool.
    #[inline]
    pub fn new() -> Self { Self }
}
impl Default for TarTool {
    #[inline]
    fn default() -> Self { Self::new() }
}

impl FlowTool for TarTool {
    #[inline]
    fn name(&self) -> &str { "tar" }

    fn states(&self) -> Vec<(String, Value)> {
        vec![("Tar".into(), json!({
            "Comment"   : "Create a tar archive of the input path",
            "Type"      : "Action",
            "ActionUrl" : COMPUTE_ACTION_URL,
            "Parameters" : {
                "tasks" : [{
                    "endpoint.$" : "$.input.compute_endpoint",
                    "function.$" : "$.input.tar_function",
                    "payload" : {
                        "tar_input.$" : "$.input.tar_input",
                    },
                }],
            },
            "ResultPath" : "$.Tar",
            "WaitTime"   : 600,
        }))]
    }

    fn required_input(&self) -> Vec<String> {
        vec![ "compute_endpoint".into(), "tar_function".into(), "tar_input".into() ]
    }
}



/// A tool that encrypts a path on a funcx-style compute endpoint with a caller-supplied key.
#[derive(Clone, Debug)]
pub struct EncryptTool;

impl EncryptTool {
    /// Constructor for the EncryptTool.
    #[inline]
    pub fn new() -> Self { Self }
}
impl Default for EncryptTool {
    #[inline]
    fn default() -> Self { Self::new() }
}

impl FlowTool for EncryptTool {
    #[inline]
    fn name(&self) -> &str { "encrypt" }

    fn states(&self) -> Vec<(String, Value)> {
        vec![("Encrypt".into(), json!({
            "Comment"   : "Encrypt the input path with the given key",
            "Type"      : "Action",
            "ActionUrl" : COMPUTE_ACTION_URL,
            "Parameters" : {
                "tasks" : [{
                    "endpoint.$" : "$.input.compute_endpoint",
                    "function.$" : "$.input.encrypt_function",
                    "payload" : {
                        "encrypt_input.$" : "$.input.encrypt_input",
                        "encrypt_key.$"   : "$.input.encrypt_key",
                    },
                }],
            },
            "ResultPath" : "$.Encrypt",
            "WaitTime"   : 600,
        }))]
    }

    fn required_input(&self) -> Vec<String> {
        vec![ "compute_endpoint".into(), "encrypt_function".into(), "encrypt_input".into(), "encrypt_key".into() ]
    }
}



/// A tool that ingests gathered metadata into a search index.
#[derive(Clone, Debug)]
pub struct PublishTool;

impl PublishTool {
    /// Constructor for the PublishTool.
    #[inline]
    pub fn new() -> Self { Self }
}
impl Default for PublishTool {
    #[inline]
    fn default() -> Self { Self::new() }
}

impl FlowTool for PublishTool {
    #[inline]
    fn name(&self) -> &str { "publish" }

    fn states(&self) -> Vec<(String, Value)> {
        vec![("Publish".into(), json!({
            "Comment"   : "Ingest the gathered metadata into the search index",
            "Type"      : "Action",
            "ActionUrl" : SEARCH_INGEST_ACTION_URL,
            "Parameters" : {
                "search_index.$" : "$.input.publish_index",
                "subject.$"      : "$.input.publish_subject",
                "visible_to"     : [ "public" ],
                "content.$"      : "$.input.publish_metadata",
            },
            "ResultPath" : "$.Publish",
            "WaitTime"   : 600,
        }))]
    }

    fn required_input(&self) -> Vec<String> {
        vec![ "publish_index".into(), "publish_subject".into(), "publish_metadata".into() ]
    }
}
