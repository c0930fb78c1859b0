//  ACTIONS.rs
//    by Eisfeld
//
//  Created:
//    22 Feb 2023, 09:48:20
//  Last edited:
//    14 Apr 2023, 11:59:33
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the warp handlers for the action routes, i.e., the externally
//!   fixed enumerate / run / status / cancel / release / log contract plus
//!   the companion flow endpoint.
//

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info};
use serde_json::json;
use uuid::Uuid;
use warp::{Rejection, Reply};
use warp::http::HeaderValue;
use warp::hyper::{Body, Response, StatusCode};
use warp::hyper::body::Bytes;

use floe_shr::debug::EnumDebug as _;
use specifications::action::{ActionId, ActionRequest, ActionStatus, ActionStatusValue};
use specifications::auth::Principal;

use crate::auth::AuthState;
use crate::spec::{Context, EnumerateQuery, LogQuery, URL_PREFIX};
use crate::store::{self, ActionStore, CancelOutcome, ReleaseOutcome, SubmitOutcome};


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use serde_json::Value;

    use floe_cfg::provider::{AuthConfig, ExecutionConfig, ProviderConfig, ProviderSection, StaticToken};
    use floe_flw::builder::FlowBuilder;
    use floe_flw::tools::{ComputeTool, TransferTool};
    use specifications::provider::{ProviderInfo, ACTION_TYPE, API_VERSION};

    use crate::auth::Authenticator;
    use crate::executor::Launcher;

    use super::*;


    /// The token every test deployment accepts.
    const TOKEN: &str = "sesame";


    /// A Launcher that only records what it is asked to do.
    #[derive(Clone)]
    struct NopLauncher {
        /// The actions launched so far.
        launched : Arc<Mutex<Vec<ActionId>>>,
        /// The actions aborted so far.
        aborted  : Arc<Mutex<Vec<ActionId>>>,
    }
    impl NopLauncher {
        /// Constructor that starts with nothing recorded.
        fn new() -> Self {
            Self {
                launched : Arc::new(Mutex::new(vec![])),
                aborted  : Arc::new(Mutex::new(vec![])),
            }
        }
    }
    #[async_trait::async_trait]
    impl Launcher for NopLauncher {
        async fn launch(&self, status: ActionStatus, _body: Value) -> Result<(), crate::executor::Error> {
            self.launched.lock().unwrap().push(status.action_id);
            Ok(())
        }

        async fn abort(&self, action: &ActionId) {
            self.aborted.lock().unwrap().push(action.clone());
        }
    }


    /// Builds an Authorization header value carrying the given raw token.
    fn bearer(token: &str) -> Option<String> {
        Some(format!("Bearer {}", token))
    }

    /// Serializes a run request with the given idempotency key and input document.
    fn run_request(request_id: &str, body: Value) -> Bytes {
        Bytes::from(json!({ "request_id": request_id, "body": body }).to_string())
    }

    /// Unpacks the given reply into its status code and parsed JSON body.
    async fn unpack(reply: impl Reply) -> (StatusCode, Value) {
        let response: Response<Body> = reply.into_response();
        let code: StatusCode = response.status();
        let bytes: Bytes = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (code, body)
    }

    /// Builds a full test Context around the given launcher and access lists.
    fn test_context(identity: Uuid, launcher: NopLauncher, visible_to: Vec<Principal>, runnable_by: Vec<Principal>) -> Arc<Context> {
        let config: ProviderConfig = ProviderConfig {
            address    : SocketAddr::from(([127, 0, 0, 1], 8080)),
            action_url : "https://provider.test/cc".into(),
            provider   : ProviderSection {
                title             : "Test provider".into(),
                subtitle          : None,
                description       : None,
                keywords          : vec![],
                admin_contact     : "admin@provider.test".into(),
                globus_auth_scope : "https://auth.globus.org/scopes/test/action_all".into(),
                visible_to        : visible_to.clone(),
                runnable_by       : runnable_by.clone(),
                administered_by   : vec![],
                log_supported     : true,
                input_schema      : json!({}),
            },
            auth : AuthConfig::Static {
                tokens : vec![ StaticToken{ token: TOKEN.into(), identity, groups: vec![] } ],
            },
            execution : ExecutionConfig {
                socket          : "/var/run/docker.sock".into(),
                image           : "floe/compute:test".into(),
                build_context   : None,
                command         : None,
                network         : "bridge".into(),
                keep_containers : false,
                work_dir        : None,
            },
            provenance            : None,
            default_release_after : 3600,
        };

        let info: ProviderInfo = ProviderInfo {
            types             : vec![ ACTION_TYPE.into() ],
            api_version       : API_VERSION.into(),
            globus_auth_scope : config.provider.globus_auth_scope.clone(),
            title             : config.provider.title.clone(),
            subtitle          : None,
            description       : None,
            keywords          : vec![],
            visible_to,
            runnable_by,
            administered_by   : vec![],
            admin_contact     : config.provider.admin_contact.clone(),
            synchronous       : false,
            log_supported     : true,
            input_schema      : json!({}),
        };
        let flow = FlowBuilder::new("Test flow")
            .then(&TransferTool::new("TransferIn", "transfer_in"))
            .then(&ComputeTool::new(config.action_url.clone()))
            .then(&TransferTool::new("TransferOut", "transfer_out"))
            .build().unwrap();
        let auth: Authenticator = Authenticator::new(config.auth.clone());

        Arc::new(Context {
            config,
            info,
            flow,
            store    : Arc::new(ActionStore::new()),
            auth,
            launcher : Box::new(launcher),
        })
    }


    #[tokio::test]
    async fn introspection_is_gated_by_visibility() {
        let identity: Uuid = Uuid::new_v4();
        let query: EnumerateQuery = EnumerateQuery{ status: None, roles: None };

        // Public visibility serves anonymous callers
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);
        let (code, body) = unpack(enumerate(query.clone(), None, context).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["title"], json!("Test provider"));
        assert_eq!(body["types"], json!(["Action"]));

        // Restricted visibility hides the document from anonymous callers...
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::AllAuthenticatedUsers ], vec![ Principal::AllAuthenticatedUsers ]);
        let (code, _) = unpack(enumerate(query.clone(), None, context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        // ...but not from authenticated ones
        let (code, _) = unpack(enumerate(query, bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn run_admits_replays_and_conflicts() {
        let identity: Uuid = Uuid::new_v4();
        let launcher: NopLauncher = NopLauncher::new();
        let context: Arc<Context> = test_context(identity, launcher.clone(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);

        // The first submission is admitted and launched
        let (code, body) = unpack(run(run_request("req-1", json!({ "samples": 4 })), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(body["status"], json!("ACTIVE"));
        let action: String = body["action_id"].as_str().unwrap().to_string();
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);

        // The same submission replays the original action without a second launch
        let (code, body) = unpack(run(run_request("req-1", json!({ "samples": 4 })), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["action_id"], json!(action));
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
        assert_eq!(context.store.len(), 1);

        // The same request ID with a different body is refused
        let (code, body) = unpack(run(run_request("req-1", json!({ "samples": 5 })), bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::CONFLICT);
        assert_eq!(body["code"], json!("Conflict"));
    }

    #[tokio::test]
    async fn run_requires_an_admitted_runner() {
        let identity: Uuid = Uuid::new_v4();
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);

        // Unparseable bodies are refused outright
        let (code, _) = unpack(run(Bytes::from_static(b"{ not json"), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);

        // No token, no run; the record needs a creator
        let (code, _) = unpack(run(run_request("req-1", json!({})), None, context).await.unwrap()).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);

        // A caller outside `runnable_by` is refused
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::Public ], vec![ Principal::identity(Uuid::new_v4()) ]);
        let (code, _) = unpack(run(run_request("req-1", json!({})), bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn status_hides_actions_from_strangers() {
        let identity: Uuid = Uuid::new_v4();
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);

        let (_, body) = unpack(run(run_request("req-1", json!({ "samples": 4 })), bearer(TOKEN), context.clone()).await.unwrap()).await;
        let action: String = body["action_id"].as_str().unwrap().to_string();

        // The creator sees it
        let (code, body) = unpack(status(action.clone(), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], json!("ACTIVE"));

        // Everyone else gets the same 404 as for an unknown or malformed ID
        let (code, _) = unpack(status(action, None, context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        let (code, _) = unpack(status(ActionId::generate().to_string(), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        let (code, _) = unpack(status("not-a-uuid".into(), bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_stops_the_container_once() {
        let identity: Uuid = Uuid::new_v4();
        let launcher: NopLauncher = NopLauncher::new();
        let context: Arc<Context> = test_context(identity, launcher.clone(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);

        let (_, body) = unpack(run(run_request("req-1", json!({})), bearer(TOKEN), context.clone()).await.unwrap()).await;
        let action: String = body["action_id"].as_str().unwrap().to_string();

        // Cancelling marks the action failed and stops its container
        let (code, body) = unpack(cancel(action.clone(), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], json!("FAILED"));
        assert_eq!(body["display_status"], json!(store::CANCELED_DISPLAY_STATUS));
        assert_eq!(launcher.aborted.lock().unwrap().len(), 1);

        // A second cancel is a conflict and does not stop anything again
        let (code, _) = unpack(cancel(action, bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::CONFLICT);
        assert_eq!(launcher.aborted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_requires_completion_and_clears_idempotency() {
        let identity: Uuid = Uuid::new_v4();
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);

        let (_, body) = unpack(run(run_request("req-1", json!({ "n": 1 })), bearer(TOKEN), context.clone()).await.unwrap()).await;
        let action: String = body["action_id"].as_str().unwrap().to_string();

        // Releasing a running action is refused
        let (code, _) = unpack(release(action.clone(), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::CONFLICT);

        // Once complete it can be released...
        let id: ActionId = ActionId::from_str(&action).unwrap();
        assert!(context.store.complete(&id, ActionStatusValue::Succeeded, None, Utc::now()));
        let (code, body) = unpack(release(action.clone(), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], json!("SUCCEEDED"));

        // ...after which it is gone and the request ID is free again
        let (code, _) = unpack(status(action, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        let (code, _) = unpack(run(run_request("req-1", json!({ "n": 1 })), bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn log_pages_through_recorded_events() {
        let identity: Uuid = Uuid::new_v4();
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);

        let (_, body) = unpack(run(run_request("req-1", json!({})), bearer(TOKEN), context.clone()).await.unwrap()).await;
        let action: String = body["action_id"].as_str().unwrap().to_string();
        let id: ActionId = ActionId::from_str(&action).unwrap();
        for i in 0..4 {
            assert!(context.store.append_log(&id, "Tick", format!("tick {}", i), None));
        }

        // Admission left one entry, so five in total; page through them
        let (code, body) = unpack(log(action.clone(), LogQuery{ limit: Some(3), offset: None }, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["entries"].as_array().unwrap().len(), 3);
        assert_eq!(body["has_next_page"], json!(true));
        assert_eq!(body["entries"][0]["code"], json!(store::LOG_ACTION_RECEIVED));

        let (code, body) = unpack(log(action.clone(), LogQuery{ limit: Some(3), offset: Some(3) }, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["entries"].as_array().unwrap().len(), 2);
        assert_eq!(body["has_next_page"], json!(false));

        // Off the end is an empty page, not an error
        let (code, body) = unpack(log(action.clone(), LogQuery{ limit: None, offset: Some(100) }, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["entries"].as_array().unwrap().len(), 0);
        assert_eq!(body["has_next_page"], json!(false));

        // Strangers get a 404
        let (code, _) = unpack(log(action, LogQuery{ limit: None, offset: None }, None, context).await.unwrap()).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn enumeration_filters_by_status_and_role() {
        let identity: Uuid = Uuid::new_v4();
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::Public ], vec![ Principal::AllAuthenticatedUsers ]);

        // Two runs; fail the first one
        let (_, body) = unpack(run(run_request("req-1", json!({ "n": 1 })), bearer(TOKEN), context.clone()).await.unwrap()).await;
        let first: ActionId = ActionId::from_str(body["action_id"].as_str().unwrap()).unwrap();
        let (code, _) = unpack(run(run_request("req-2", json!({ "n": 2 })), bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert!(context.store.complete(&first, ActionStatusValue::Failed, None, Utc::now()));

        // Anonymous enumeration is refused
        let (code, _) = unpack(enumerate(EnumerateQuery{ status: Some("ACTIVE".into()), roles: None }, None, context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);

        // Status filtering is case-insensitive
        let (code, body) = unpack(enumerate(EnumerateQuery{ status: Some("active".into()), roles: None }, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["status"], json!("ACTIVE"));

        // Multiple statuses plus an explicit creator role
        let (code, body) = unpack(enumerate(EnumerateQuery{ status: Some("ACTIVE,FAILED".into()), roles: Some("creator".into()) }, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        // The creator holds no manage role on their own actions unless listed
        let (code, body) = unpack(enumerate(EnumerateQuery{ status: None, roles: Some("manage_by".into()) }, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 0);

        // Unknown filter values are rejected
        let (code, _) = unpack(enumerate(EnumerateQuery{ status: Some("DONE".into()), roles: None }, bearer(TOKEN), context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        let (code, _) = unpack(enumerate(EnumerateQuery{ status: None, roles: Some("owner".into()) }, bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn flow_shares_introspection_visibility() {
        let identity: Uuid = Uuid::new_v4();
        let context: Arc<Context> = test_context(identity, NopLauncher::new(), vec![ Principal::AllAuthenticatedUsers ], vec![ Principal::AllAuthenticatedUsers ]);

        let (code, _) = unpack(flow(None, context.clone()).await.unwrap()).await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (code, body) = unpack(flow(bearer(TOKEN), context).await.unwrap()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["definition"]["StartAt"], json!("TransferIn"));
        assert!(body["required_input"].as_array().unwrap().iter().any(|key| key == "compute_parameters"));
    }
}





/***** HELPER MACROS *****/
/// "Casts" the given StatusCode and serialized body to a JSON response.
macro_rules! json_response {
    (StatusCode::$status:ident, $body:expr) => {
        {
            let body: String = $body;
            let body_len: usize = body.len();
            let mut response: Response<Body> = Response::new(Body::from(body));
            *response.status_mut() = StatusCode::$status;
            response.headers_mut().insert("Content-Type", HeaderValue::from_static("application/json"));
            response.headers_mut().insert("Content-Length", HeaderValue::from(body_len));
            response
        }
    };
}

/// "Casts" the given StatusCode and human-readable message to the contract's JSON error document.
macro_rules! error_response {
    (StatusCode::$status:ident, $code:expr, $description:expr) => {
        json_response!(StatusCode::$status, json!({ "code": $code, "description": $description }).to_string())
    };
}





/***** CONSTANTS *****/
/// The page size the log endpoint applies when the query names none.
pub const DEFAULT_LOG_LIMIT: u64 = 25;





/***** HELPER STRUCTS *****/
/// The roles a caller can hold on an action, as the `roles` filter names them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ActionRole {
    /// The caller submitted the action.
    Creator,
    /// The caller is in the action's `monitor_by` list.
    MonitorBy,
    /// The caller is in the action's `manage_by` list.
    ManageBy,
}

impl ActionRole {
    /// All roles, i.e., the filter that any visible action matches.
    const ALL: [Self; 3] = [ Self::Creator, Self::MonitorBy, Self::ManageBy ];

    /// Parses the given raw filter value (case-insensitive).
    ///
    /// # Arguments
    /// - `raw`: The raw filter value to parse.
    ///
    /// # Returns
    /// The matching role, or None if the value names none of them.
    fn from_raw(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "creator"    => Some(Self::Creator),
            "monitor_by" => Some(Self::MonitorBy),
            "manage_by"  => Some(Self::ManageBy),
            _            => None,
        }
    }

    /// Returns whether the given caller holds this role on the given action.
    ///
    /// # Arguments
    /// - `state`: The caller's resolved principal set.
    /// - `status`: The action to check against.
    ///
    /// # Returns
    /// True if they do, or false otherwise.
    fn held_by(&self, state: &AuthState, status: &ActionStatus) -> bool {
        match self {
            Self::Creator   => state.principals.contains(&status.creator_id),
            Self::MonitorBy => state.is_allowed(&status.monitor_by),
            Self::ManageBy  => state.is_allowed(&status.manage_by),
        }
    }
}





/***** HELPER FUNCTIONS *****/
/// Resolves the caller's Authorization header to an [`AuthState`].
///
/// # Arguments
/// - `context`: The Context that carries the authenticator.
/// - `authorization`: The raw Authorization header, if the caller sent one.
///
/// # Returns
/// The resolved state, or else the `500` response to reply with if the backend failed.
async fn resolve_caller(context: &Context, authorization: Option<&str>) -> Result<AuthState, Response<Body>> {
    match context.auth.resolve(authorization).await {
        Ok(state) => Ok(state),
        Err(err)  => {
            error!("Failed to resolve caller identity: {}", err);
            Err(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"))
        },
    }
}





/***** LIBRARY *****/
/// Handles a GET on the bare prefix, which doubles as introspection and enumeration.
///
/// # Arguments
/// - `query`: The filter parameters; their absence makes this an introspection request.
/// - `authorization`: The raw Authorization header, if the caller sent one.
/// - `context`: The Context struct that contains things we might need.
///
/// # Returns
/// A response with the following codes:
/// - `200 OK` with the introspection document (no filters) or a JSON array of ActionStatus (filters).
/// - `400 BAD REQUEST` if a filter value names no known status or role.
/// - `401 UNAUTHORIZED` if an anonymous caller tries to enumerate.
/// - `404 NOT FOUND` if the caller is not in `visible_to` (introspection only).
///
/// # Errors
/// This function itself never rejects; failures are encoded in the response.
pub async fn enumerate(query: EnumerateQuery, authorization: Option<String>, context: Arc<Context>) -> Result<impl Reply, Rejection> {
    debug!("Handling GET on '/{}' (i.e., introspect or enumerate)...", URL_PREFIX);

    // Resolve the caller first, since everything here is access-gated
    let state: AuthState = match resolve_caller(&context, authorization.as_deref()).await {
        Ok(state)     => state,
        Err(response) => { return Ok(response); },
    };

    // Without filter parameters this is an introspection request
    if query.status.is_none() && query.roles.is_none() {
        if !state.is_allowed(&context.config.provider.visible_to) {
            debug!("Caller may not see the introspection document");
            return Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", "Not found"));
        }
        let body: String = match serde_json::to_string(&context.info) {
            Ok(body) => body,
            Err(err) => {
                error!("Failed to serialize introspection document: {}", err);
                return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
            },
        };
        return Ok(json_response!(StatusCode::OK, body));
    }

    // Enumeration proper is never anonymous
    if !state.is_authenticated() {
        return Ok(error_response!(StatusCode::UNAUTHORIZED, "Unauthorized", "Authentication required to enumerate actions"));
    }

    // Parse the status filter...
    let statuses: Option<Vec<ActionStatusValue>> = match &query.status {
        Some(raw) => {
            let mut statuses: Vec<ActionStatusValue> = vec![];
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match ActionStatusValue::from_str(part) {
                    Ok(value) => { statuses.push(value); },
                    Err(err)  => {
                        debug!("{}", err);
                        return Ok(error_response!(StatusCode::BAD_REQUEST, "BadRequest", format!("Unknown status filter value '{}'", part)));
                    },
                }
            }
            Some(statuses)
        },
        None => None,
    };
    // ...and the roles filter
    let roles: Option<Vec<ActionRole>> = match &query.roles {
        Some(raw) => {
            let mut roles: Vec<ActionRole> = vec![];
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match ActionRole::from_raw(part) {
                    Some(role) => { roles.push(role); },
                    None       => { return Ok(error_response!(StatusCode::BAD_REQUEST, "BadRequest", format!("Unknown role filter value '{}' (expected creator, monitor_by or manage_by)", part))); },
                }
            }
            Some(roles)
        },
        None => None,
    };

    // An empty filter list constrains nothing
    let statuses: Option<Vec<ActionStatusValue>> = statuses.filter(|s| !s.is_empty());
    let roles: Option<Vec<ActionRole>> = roles.filter(|r| !r.is_empty());

    // Collect every matching action the caller holds a role on
    let actions: Vec<ActionStatus> = context.store.enumerate(|action| {
        if let Some(statuses) = &statuses {
            if !statuses.contains(&action.status) { return false; }
        }
        let roles: &[ActionRole] = match &roles {
            Some(roles) => roles.as_slice(),
            None        => &ActionRole::ALL,
        };
        roles.iter().any(|role| role.held_by(&state, action))
    });
    debug!("Enumeration matched {} action(s)", actions.len());

    let body: String = match serde_json::to_string(&actions) {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to serialize enumerated actions: {}", err);
            return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
        },
    };
    Ok(json_response!(StatusCode::OK, body))
}



/// Handles a POST on the run path, i.e., admits and launches a new action.
///
/// # Arguments
/// - `body`: The body of the given request, which we will attempt to parse as an ActionRequest.
/// - `authorization`: The raw Authorization header, if the caller sent one.
/// - `context`: The Context struct that contains things we might need.
///
/// # Returns
/// A response with the following codes:
/// - `202 ACCEPTED` with the ActionStatus of a newly admitted action.
/// - `200 OK` with the original ActionStatus if the same request was submitted before.
/// - `400 BAD REQUEST` if the body was not parseable as an ActionRequest.
/// - `401 UNAUTHORIZED` if the caller presented no (valid) token.
/// - `403 FORBIDDEN` if the caller is not in `runnable_by`.
/// - `409 CONFLICT` if the request ID was used before with a different body.
///
/// # Errors
/// This function itself never rejects; failures are encoded in the response.
pub async fn run(body: Bytes, authorization: Option<String>, context: Arc<Context>) -> Result<impl Reply, Rejection> {
    info!("Handling POST on '/{}/run' (i.e., submit action)...", URL_PREFIX);

    // Parse the incoming body
    debug!("Parsing incoming body...");
    let request: ActionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err)    => {
            error!("Failed to parse incoming request body as JSON: {}", err);
            return Ok(error_response!(StatusCode::BAD_REQUEST, "BadRequest", format!("Failed to parse request body: {}", err)));
        },
    };

    // Submissions are never anonymous, since the record needs a creator
    let state: AuthState = match resolve_caller(&context, authorization.as_deref()).await {
        Ok(state)     => state,
        Err(response) => { return Ok(response); },
    };
    let identity: Uuid = match state.identity {
        Some(identity) => identity,
        None           => { return Ok(error_response!(StatusCode::UNAUTHORIZED, "Unauthorized", "Authentication required to run actions")); },
    };
    if !state.is_allowed(&context.config.provider.runnable_by) {
        debug!("Caller '{}' may not run actions here", identity);
        return Ok(error_response!(StatusCode::FORBIDDEN, "Forbidden", "Caller may not run actions on this provider"));
    }

    // File it under the caller's idempotency key
    let digest: String = ActionStore::digest(&request.body);
    let status: ActionStatus = ActionStatus {
        action_id       : ActionId::generate(),
        status          : ActionStatusValue::Active,
        creator_id      : Principal::identity(identity),
        label           : request.label.clone(),
        monitor_by      : request.monitor_by.clone().unwrap_or_default(),
        manage_by       : request.manage_by.clone().unwrap_or_default(),
        start_time      : Utc::now(),
        completion_time : None,
        release_after   : Some(request.release_after.unwrap_or(context.config.default_release_after)),
        display_status  : None,
        details         : None,
    };
    let action: ActionId = status.action_id.clone();
    let outcome: SubmitOutcome = context.store.submit(identity, request.request_id.as_str(), digest, status.clone());
    debug!("Request '{}' of '{}' resolved to {}", request.request_id, identity, outcome.variant());
    match outcome {
        SubmitOutcome::New => {},
        SubmitOutcome::Replay(prior) => {
            debug!("Request '{}' of '{}' replays action '{}'", request.request_id, identity, prior.action_id);
            let body: String = match serde_json::to_string(&prior) {
                Ok(body) => body,
                Err(err) => {
                    error!("Failed to serialize replayed action: {}", err);
                    return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
                },
            };
            return Ok(json_response!(StatusCode::OK, body));
        },
        SubmitOutcome::Conflict => {
            debug!("Request '{}' of '{}' conflicts with an earlier submission", request.request_id, identity);
            return Ok(error_response!(StatusCode::CONFLICT, "Conflict", format!("Request '{}' was already submitted with a different body", request.request_id)));
        },
    }
    context.store.append_log(&action, store::LOG_ACTION_RECEIVED, format!("Action '{}' admitted", action), None);
    info!("Admitted action '{}' for '{}'", action, identity);

    // Set the container lifecycle in motion
    if let Err(err) = context.launcher.launch(status.clone(), request.body.clone()).await {
        error!("Failed to launch action '{}': {}", action, err);
        context.store.complete(&action, ActionStatusValue::Failed, Some(json!({ "error": err.to_string() })), Utc::now());
        context.store.append_log(&action, store::LOG_LAUNCH_FAILED, err.to_string(), None);
    }

    // Reply with the admitted record (re-fetched, since the launch may already have moved it)
    let status: ActionStatus = context.store.get(&action, |_| true).unwrap_or(status);
    let body: String = match serde_json::to_string(&status) {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to serialize admitted action: {}", err);
            return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
        },
    };
    Ok(json_response!(StatusCode::ACCEPTED, body))
}



/// Handles a GET on an action's status path.
///
/// # Arguments
/// - `action`: The raw action ID from the path.
/// - `authorization`: The raw Authorization header, if the caller sent one.
/// - `context`: The Context struct that contains things we might need.
///
/// # Returns
/// A response with the following codes:
/// - `200 OK` with the current ActionStatus.
/// - `404 NOT FOUND` if the action does not exist _or_ the caller holds no role on it; the
///   two cases are deliberately indistinguishable.
///
/// # Errors
/// This function itself never rejects; failures are encoded in the response.
pub async fn status(action: String, authorization: Option<String>, context: Arc<Context>) -> Result<impl Reply, Rejection> {
    debug!("Handling GET on '/{}/{}/status' (i.e., poll action)...", URL_PREFIX, action);

    let state: AuthState = match resolve_caller(&context, authorization.as_deref()).await {
        Ok(state)     => state,
        Err(response) => { return Ok(response); },
    };

    // An unparseable ID cannot name an action
    let action: ActionId = match ActionId::from_str(&action) {
        Ok(action) => action,
        Err(err)   => {
            debug!("{}", err);
            return Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action)));
        },
    };

    match context.store.get(&action, |status| state.may_view(status)) {
        Some(status) => {
            let body: String = match serde_json::to_string(&status) {
                Ok(body) => body,
                Err(err) => {
                    error!("Failed to serialize action '{}': {}", action, err);
                    return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
                },
            };
            Ok(json_response!(StatusCode::OK, body))
        },
        None => Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action))),
    }
}



/// Handles a POST on an action's cancel path.
///
/// # Arguments
/// - `action`: The raw action ID from the path.
/// - `authorization`: The raw Authorization header, if the caller sent one.
/// - `context`: The Context struct that contains things we might need.
///
/// # Returns
/// A response with the following codes:
/// - `200 OK` with the now-failed ActionStatus.
/// - `404 NOT FOUND` if the action does not exist or the caller is neither creator nor manager.
/// - `409 CONFLICT` if the action is already complete.
///
/// # Errors
/// This function itself never rejects; failures are encoded in the response.
pub async fn cancel(action: String, authorization: Option<String>, context: Arc<Context>) -> Result<impl Reply, Rejection> {
    info!("Handling POST on '/{}/{}/cancel' (i.e., cancel action)...", URL_PREFIX, action);

    let state: AuthState = match resolve_caller(&context, authorization.as_deref()).await {
        Ok(state)     => state,
        Err(response) => { return Ok(response); },
    };
    let action: ActionId = match ActionId::from_str(&action) {
        Ok(action) => action,
        Err(err)   => {
            debug!("{}", err);
            return Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action)));
        },
    };

    match context.store.cancel(&action, Utc::now(), |status| state.may_manage(status)) {
        CancelOutcome::Canceled(status) => {
            // The record is final; now take the container down with it (best-effort)
            context.launcher.abort(&action).await;
            context.store.append_log(&action, store::LOG_ACTION_CANCELED, "Canceled on user request", None);
            info!("Canceled action '{}'", action);

            let body: String = match serde_json::to_string(&status) {
                Ok(body) => body,
                Err(err) => {
                    error!("Failed to serialize canceled action '{}': {}", action, err);
                    return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
                },
            };
            Ok(json_response!(StatusCode::OK, body))
        },
        CancelOutcome::AlreadyComplete => Ok(error_response!(StatusCode::CONFLICT, "Conflict", format!("Action '{}' is already complete", action))),
        CancelOutcome::NotFound        => Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action))),
    }
}



/// Handles a POST on an action's release path.
///
/// # Arguments
/// - `action`: The raw action ID from the path.
/// - `authorization`: The raw Authorization header, if the caller sent one.
/// - `context`: The Context struct that contains things we might need.
///
/// # Returns
/// A response with the following codes:
/// - `200 OK` with the final ActionStatus; the action and its idempotency entry are gone.
/// - `404 NOT FOUND` if the action does not exist or the caller is neither creator nor manager.
/// - `409 CONFLICT` if the action is not complete yet.
///
/// # Errors
/// This function itself never rejects; failures are encoded in the response.
pub async fn release(action: String, authorization: Option<String>, context: Arc<Context>) -> Result<impl Reply, Rejection> {
    info!("Handling POST on '/{}/{}/release' (i.e., forget action)...", URL_PREFIX, action);

    let state: AuthState = match resolve_caller(&context, authorization.as_deref()).await {
        Ok(state)     => state,
        Err(response) => { return Ok(response); },
    };
    let action: ActionId = match ActionId::from_str(&action) {
        Ok(action) => action,
        Err(err)   => {
            debug!("{}", err);
            return Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action)));
        },
    };

    match context.store.release(&action, |status| state.may_manage(status)) {
        ReleaseOutcome::Released(status) => {
            info!("Released action '{}'", action);
            let body: String = match serde_json::to_string(&status) {
                Ok(body) => body,
                Err(err) => {
                    error!("Failed to serialize released action '{}': {}", action, err);
                    return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
                },
            };
            Ok(json_response!(StatusCode::OK, body))
        },
        ReleaseOutcome::Incomplete => Ok(error_response!(StatusCode::CONFLICT, "Conflict", format!("Action '{}' is not complete", action))),
        ReleaseOutcome::NotFound   => Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action))),
    }
}



/// Handles a GET on an action's log path.
///
/// # Arguments
/// - `action`: The raw action ID from the path.
/// - `query`: The pagination parameters.
/// - `authorization`: The raw Authorization header, if the caller sent one.
/// - `context`: The Context struct that contains things we might need.
///
/// # Returns
/// A response with the following codes:
/// - `200 OK` with an ActionLogPage; an offset past the end yields an empty page.
/// - `404 NOT FOUND` if the action does not exist or the caller holds no role on it.
///
/// # Errors
/// This function itself never rejects; failures are encoded in the response.
pub async fn log(action: String, query: LogQuery, authorization: Option<String>, context: Arc<Context>) -> Result<impl Reply, Rejection> {
    debug!("Handling GET on '/{}/{}/log' (i.e., read action log)...", URL_PREFIX, action);

    let state: AuthState = match resolve_caller(&context, authorization.as_deref()).await {
        Ok(state)     => state,
        Err(response) => { return Ok(response); },
    };
    let action: ActionId = match ActionId::from_str(&action) {
        Ok(action) => action,
        Err(err)   => {
            debug!("{}", err);
            return Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action)));
        },
    };

    let limit: u64 = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let offset: u64 = query.offset.unwrap_or(0);
    match context.store.log_page(&action, limit, offset, |status| state.may_view(status)) {
        Some(page) => {
            let body: String = match serde_json::to_string(&page) {
                Ok(body) => body,
                Err(err) => {
                    error!("Failed to serialize log page of action '{}': {}", action, err);
                    return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
                },
            };
            Ok(json_response!(StatusCode::OK, body))
        },
        None => Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", format!("No action '{}' known to this provider", action))),
    }
}



/// Handles a GET on the flow path, i.e., serves the companion flow definition.
///
/// # Arguments
/// - `authorization`: The raw Authorization header, if the caller sent one.
/// - `context`: The Context struct that contains things we might need.
///
/// # Returns
/// A response with the following codes:
/// - `200 OK` with the FlowBlueprint composed at startup.
/// - `404 NOT FOUND` if the caller is not in `visible_to`.
///
/// # Errors
/// This function itself never rejects; failures are encoded in the response.
pub async fn flow(authorization: Option<String>, context: Arc<Context>) -> Result<impl Reply, Rejection> {
    debug!("Handling GET on '/{}/flow' (i.e., fetch companion flow)...", URL_PREFIX);

    let state: AuthState = match resolve_caller(&context, authorization.as_deref()).await {
        Ok(state)     => state,
        Err(response) => { return Ok(response); },
    };
    if !state.is_allowed(&context.config.provider.visible_to) {
        debug!("Caller may not see the companion flow");
        return Ok(error_response!(StatusCode::NOT_FOUND, "NotFound", "Not found"));
    }

    let body: String = match serde_json::to_string(&context.flow) {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to serialize companion flow: {}", err);
            return Ok(error_response!(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "An internal error has occurred"));
        },
    };
    Ok(json_response!(StatusCode::OK, body))
}
