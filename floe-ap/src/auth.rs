//  AUTH.rs
//    by Eisfeld
//
//  Created:
//    16 Feb 2023, 11:21:55
//  Last edited:
//    30 Mar 2023, 15:40:31
//  Auto updated?
//    Yes
//
//  Description:
//!   Resolves `Authorization` headers to principal sets and implements
//!   the admission rules the handlers guard with.
//

use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use floe_cfg::provider::{AuthConfig, StaticToken};
use specifications::action::ActionStatus;
use specifications::auth::Principal;

pub use crate::errors::AuthError as Error;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use specifications::action::{ActionId, ActionStatusValue};
    use super::*;

    /// Builds a static-backend Authenticator with one known token.
    fn static_auth(identity: Uuid, group: Uuid) -> Authenticator {
        Authenticator::new(AuthConfig::Static {
            tokens : vec![StaticToken {
                token    : "sesame".into(),
                identity,
                groups   : vec![group],
            }],
        })
    }


    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("  Bearer   abc  "), Some("abc"));
        assert_eq!(extract_bearer("Basic abc"), None);
        assert_eq!(extract_bearer("Bearer"), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[tokio::test]
    async fn static_tokens_resolve() {
        let identity : Uuid = Uuid::new_v4();
        let group    : Uuid = Uuid::new_v4();
        let auth: Authenticator = static_auth(identity, group);

        // The known token yields the identity plus its groups
        let state: AuthState = auth.resolve(Some("Bearer sesame")).await.unwrap();
        assert_eq!(state.identity, Some(identity));
        assert!(state.principals.contains(&Principal::identity(identity)));
        assert!(state.principals.contains(&Principal::group(group)));

        // Unknown tokens and missing headers are anonymous
        let state: AuthState = auth.resolve(Some("Bearer wrong")).await.unwrap();
        assert_eq!(state.identity, None);
        let state: AuthState = auth.resolve(None).await.unwrap();
        assert_eq!(state.identity, None);
    }

    #[test]
    fn admission_rules() {
        let me     : Uuid = Uuid::new_v4();
        let group  : Uuid = Uuid::new_v4();
        let state: AuthState = AuthState {
            identity   : Some(me),
            principals : vec![Principal::identity(me), Principal::group(group)],
        };
        let anonymous: AuthState = AuthState::anonymous();

        // `public` admits everyone, authenticated or not
        assert!(state.is_allowed(&[Principal::Public]));
        assert!(anonymous.is_allowed(&[Principal::Public]));

        // `all_authenticated_users` requires a resolved identity
        assert!(state.is_allowed(&[Principal::AllAuthenticatedUsers]));
        assert!(!anonymous.is_allowed(&[Principal::AllAuthenticatedUsers]));

        // Otherwise the principal sets must intersect
        assert!(state.is_allowed(&[Principal::group(group)]));
        assert!(!state.is_allowed(&[Principal::identity(Uuid::new_v4())]));
        assert!(!state.is_allowed(&[]));
    }

    #[test]
    fn role_guards() {
        let creator : Uuid = Uuid::new_v4();
        let manager : Uuid = Uuid::new_v4();
        let group   : Uuid = Uuid::new_v4();
        let status: ActionStatus = ActionStatus {
            action_id       : ActionId::generate(),
            status          : ActionStatusValue::Active,
            creator_id      : Principal::identity(creator),
            label           : None,
            monitor_by      : vec![Principal::group(group)],
            manage_by       : vec![Principal::identity(manager)],
            start_time      : chrono::Utc::now(),
            completion_time : None,
            release_after   : None,
            display_status  : None,
            details         : None,
        };

        let as_creator: AuthState = AuthState{ identity: Some(creator), principals: vec![Principal::identity(creator)] };
        let as_manager: AuthState = AuthState{ identity: Some(manager), principals: vec![Principal::identity(manager)] };
        let as_monitor: AuthState = AuthState{ identity: Some(Uuid::new_v4()), principals: vec![Principal::identity(Uuid::new_v4()), Principal::group(group)] };
        let stranger: AuthState   = AuthState{ identity: Some(Uuid::new_v4()), principals: vec![Principal::identity(Uuid::new_v4())] };

        assert!(as_creator.may_view(&status) && as_creator.may_manage(&status));
        assert!(as_manager.may_view(&status) && as_manager.may_manage(&status));
        assert!(as_monitor.may_view(&status) && !as_monitor.may_manage(&status));
        assert!(!stranger.may_view(&status) && !stranger.may_manage(&status));
    }
}





/***** HELPER STRUCTS *****/
/// The slice of an introspection reply we care about.
#[derive(Clone, Debug, Deserialize)]
struct IntrospectReply {
    /// Whether the token is live at all.
    active       : bool,
    /// The identity the token was issued to.
    sub          : Option<String>,
    /// Other identities linked to the caller, if the endpoint includes them.
    #[serde(default)]
    identity_set : Vec<String>,
    /// The groups the caller belongs to, if the endpoint includes them.
    #[serde(default)]
    groups       : Vec<Uuid>,
}

/// A cached token resolution.
#[derive(Clone, Debug)]
struct CacheEntry {
    /// The resolved state.
    state   : AuthState,
    /// When this entry stops being served.
    expires : Instant,
}





/***** HELPER FUNCTIONS *****/
/// Extracts the token from an `Authorization` header value.
///
/// # Arguments
/// - `header`: The raw header value.
///
/// # Returns
/// The token, or `None` if the header does not carry a bearer token.
fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token): (&str, &str) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }

    let token: &str = token.trim();
    if token.is_empty() { return None; }
    Some(token)
}

/// Resolves a token against the static token list.
///
/// # Arguments
/// - `tokens`: The configured tokens.
/// - `token`: The presented token.
///
/// # Returns
/// The matching state, or an anonymous one if the token is not listed.
fn resolve_static(tokens: &[StaticToken], token: &str) -> AuthState {
    match tokens.iter().find(|entry| entry.token == token) {
        Some(entry) => {
            let mut principals: Vec<Principal> = vec![Principal::identity(entry.identity)];
            principals.extend(entry.groups.iter().map(|group| Principal::group(*group)));
            AuthState {
                identity : Some(entry.identity),
                principals,
            }
        },
        None => AuthState::anonymous(),
    }
}

/// Resolves a token by POSTing it to the configured introspection endpoint.
///
/// # Arguments
/// - `client`: The HTTP client to send with.
/// - `endpoint`: The introspection endpoint.
/// - `client_id`: The basic-auth username that authenticates us to the endpoint.
/// - `client_secret`: The basic-auth password that goes with it.
/// - `token`: The presented token.
///
/// # Returns
/// The resolved state. An inactive token resolves to an anonymous state.
///
/// # Errors
/// This function errors if the endpoint was unreachable, replied with a non-success
/// status or replied with something we could not make sense of.
async fn introspect_token(client: &Client, endpoint: &str, client_id: &str, client_secret: &str, token: &str) -> Result<AuthState, Error> {
    // Send the token, authenticating ourselves with the client credentials
    let params: [(&str, &str); 2] = [("token", token), ("include", "identity_set")];
    let response: reqwest::Response = match client.post(endpoint).basic_auth(client_id, Some(client_secret)).form(&params).send().await {
        Ok(response) => response,
        Err(err)     => { return Err(Error::IntrospectRequestError{ endpoint: endpoint.into(), err }); },
    };
    if !response.status().is_success() {
        return Err(Error::IntrospectResponseError{ endpoint: endpoint.into(), status: response.status() });
    }

    // Parse the reply
    let reply: IntrospectReply = match response.json().await {
        Ok(reply) => reply,
        Err(err)  => { return Err(Error::IntrospectParseError{ endpoint: endpoint.into(), err }); },
    };

    // An inactive token is simply an unauthenticated caller
    if !reply.active { return Ok(AuthState::anonymous()); }
    let identity: Uuid = match &reply.sub {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(identity) => identity,
            Err(err)     => { return Err(Error::IllegalSubject{ raw: raw.clone(), err }); },
        },
        None => { return Ok(AuthState::anonymous()); },
    };

    // The subject leads the principal set; linked identities and groups complete it
    let mut principals: Vec<Principal> = vec![Principal::identity(identity)];
    for raw in &reply.identity_set {
        match Uuid::parse_str(raw) {
            Ok(linked) => {
                if linked != identity { principals.push(Principal::identity(linked)); }
            },
            Err(err) => { return Err(Error::IllegalSubject{ raw: raw.clone(), err }); },
        }
    }
    principals.extend(reply.groups.iter().map(|group| Principal::group(*group)));

    Ok(AuthState {
        identity : Some(identity),
        principals,
    })
}





/***** LIBRARY *****/
/// What we know about a caller once their header has been resolved.
#[derive(Clone, Debug)]
pub struct AuthState {
    /// The effective identity of the caller, if authenticated.
    pub identity   : Option<Uuid>,
    /// Every principal the caller matches (their identities and groups).
    pub principals : Vec<Principal>,
}

impl AuthState {
    /// Returns the state of a caller that presented no (valid) token.
    #[inline]
    pub fn anonymous() -> Self {
        Self {
            identity   : None,
            principals : vec![],
        }
    }

    /// Returns whether the caller has a resolved identity.
    #[inline]
    pub fn is_authenticated(&self) -> bool { self.identity.is_some() }



    /// Checks whether this caller is admitted by the given principal list.
    ///
    /// # Arguments
    /// - `allowed`: The principals that are allowed in.
    ///
    /// # Returns
    /// True if `allowed` contains `public` (anyone goes), if it contains
    /// `all_authenticated_users` and the caller is authenticated, or if the caller's
    /// principal set intersects it.
    pub fn is_allowed(&self, allowed: &[Principal]) -> bool {
        if allowed.contains(&Principal::Public) { return true; }
        if !self.is_authenticated() { return false; }
        if allowed.contains(&Principal::AllAuthenticatedUsers) { return true; }
        self.principals.iter().any(|principal| allowed.contains(principal))
    }

    /// Whether this caller may observe the given action (as creator, monitor or manager).
    #[inline]
    pub fn may_view(&self, status: &ActionStatus) -> bool {
        self.principals.contains(&status.creator_id) || self.is_allowed(&status.monitor_by) || self.is_allowed(&status.manage_by)
    }

    /// Whether this caller may cancel or release the given action (as creator or manager).
    #[inline]
    pub fn may_manage(&self, status: &ActionStatus) -> bool {
        self.principals.contains(&status.creator_id) || self.is_allowed(&status.manage_by)
    }
}



/// Resolves bearer tokens to [`AuthState`]s using the configured backend.
#[derive(Debug)]
pub struct Authenticator {
    /// The backend to resolve against.
    config : AuthConfig,
    /// The HTTP client used for introspection calls.
    client : Client,
    /// Resolved tokens, so the introspection endpoint is not hit on every request.
    cache  : DashMap<String, CacheEntry>,
}

impl Authenticator {
    /// Constructor for the Authenticator.
    ///
    /// # Arguments
    /// - `config`: The backend to resolve tokens against.
    ///
    /// # Returns
    /// A new Authenticator with an empty cache.
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            client : Client::new(),
            cache  : DashMap::new(),
        }
    }



    /// Resolves the given `Authorization` header value to an [`AuthState`].
    ///
    /// # Arguments
    /// - `authorization`: The raw header value, if the request carried one.
    ///
    /// # Returns
    /// The caller's state. Missing headers, non-bearer schemes, unknown tokens and
    /// inactive tokens all resolve to an anonymous state.
    ///
    /// # Errors
    /// This function errors if the introspection backend could not be consulted.
    pub async fn resolve(&self, authorization: Option<&str>) -> Result<AuthState, Error> {
        let token: &str = match authorization.and_then(extract_bearer) {
            Some(token) => token,
            None        => { return Ok(AuthState::anonymous()); },
        };

        match &self.config {
            AuthConfig::Static{ tokens } => Ok(resolve_static(tokens, token)),

            AuthConfig::Introspect{ endpoint, client_id, client_secret, cache_ttl } => {
                // Serve from cache while the entry is fresh
                if let Some(entry) = self.cache.get(token) {
                    if entry.expires > Instant::now() { return Ok(entry.state.clone()); }
                }

                // Ask the endpoint, then remember the answer for `cache_ttl` seconds
                debug!("Introspecting presented token at '{}'...", endpoint);
                let state: AuthState = introspect_token(&self.client, endpoint, client_id, client_secret, token).await?;
                self.cache.insert(token.into(), CacheEntry {
                    state   : state.clone(),
                    expires : Instant::now() + Duration::from_secs(*cache_ttl),
                });
                Ok(state)
            },
        }
    }
}
