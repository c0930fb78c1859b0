//  ACTION.rs
//    by Eisfeld
//
//  Created:
//    07 Feb 2023, 10:21:56
//  Last edited:
//    04 Apr 2023, 14:02:37
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the action half of the provider contract: identifiers,
//!   lifecycle statuses, run requests, status documents and log pages.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use uuid::Uuid;

use crate::auth::Principal;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    /// An ActionId should survive a trip through its string form.
    #[test]
    fn actionid_string_roundtrip() {
        let id: ActionId = ActionId::generate();
        let sid: String = id.to_string();
        assert_eq!(ActionId::from_str(&sid).unwrap(), id);
    }

    /// Anything that is not a UUID is not an ActionId.
    #[test]
    fn actionid_rejects_garbage() {
        assert!(ActionId::from_str("definitely-not-a-uuid").is_err());
        assert!(ActionId::from_str("").is_err());
    }

    /// The four statuses must serialize to the exact uppercase wire names.
    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&ActionStatusValue::Active).unwrap(), "\"ACTIVE\"");
        assert_eq!(serde_json::to_string(&ActionStatusValue::Inactive).unwrap(), "\"INACTIVE\"");
        assert_eq!(serde_json::to_string(&ActionStatusValue::Succeeded).unwrap(), "\"SUCCEEDED\"");
        assert_eq!(serde_json::to_string(&ActionStatusValue::Failed).unwrap(), "\"FAILED\"");

        // Display mirrors the wire name
        assert_eq!(ActionStatusValue::Succeeded.to_string(), "SUCCEEDED");
    }

    /// Only the two terminal statuses count as complete.
    #[test]
    fn status_completeness() {
        assert!(!ActionStatusValue::Active.is_complete());
        assert!(!ActionStatusValue::Inactive.is_complete());
        assert!(ActionStatusValue::Succeeded.is_complete());
        assert!(ActionStatusValue::Failed.is_complete());
    }

    /// Enumeration filters hand us statuses in whatever case the client felt like.
    #[test]
    fn status_parses_any_case() {
        assert_eq!(ActionStatusValue::from_str("ACTIVE").unwrap(), ActionStatusValue::Active);
        assert_eq!(ActionStatusValue::from_str("active").unwrap(), ActionStatusValue::Active);
        assert_eq!(ActionStatusValue::from_str("Failed").unwrap(), ActionStatusValue::Failed);
        assert_eq!(ActionStatusValue::from_str("sUcCeEdEd").unwrap(), ActionStatusValue::Succeeded);
        assert!(ActionStatusValue::from_str("DONE").is_err());
    }

    /// A run request only needs `request_id` and `body`; everything else defaults to None.
    #[test]
    fn request_minimal_parses() {
        let req: ActionRequest = serde_json::from_value(json!({
            "request_id" : "req-001",
            "body"       : { "input": "s3://bucket/frame.fits" },
        })).unwrap();
        assert_eq!(req.request_id, "req-001");
        assert!(req.label.is_none());
        assert!(req.monitor_by.is_none());
        assert!(req.manage_by.is_none());
        assert!(req.release_after.is_none());
    }

    /// The status document must carry the contract's field names and string forms.
    #[test]
    fn status_document_wire_shape() {
        let id: ActionId = ActionId::generate();
        let status: ActionStatus = ActionStatus {
            action_id       : id.clone(),
            status          : ActionStatusValue::Active,
            creator_id      : Principal::Public,
            label           : Some("stack frames".into()),
            monitor_by      : vec![],
            manage_by       : vec![],
            start_time      : Utc::now(),
            completion_time : None,
            release_after   : Some(3600),
            display_status  : None,
            details         : None,
        };

        let value: serde_json::Value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["action_id"], json!(id.to_string()));
        assert_eq!(value["status"], json!("ACTIVE"));
        assert_eq!(value["creator_id"], json!("public"));
        assert_eq!(value["release_after"], json!(3600));
        assert!(value["start_time"].is_string());
    }

    /// Log pages keep their pagination parameters next to the entries.
    #[test]
    fn log_page_wire_shape() {
        let page: ActionLogPage = ActionLogPage {
            limit         : 25,
            offset        : 0,
            has_next_page : false,
            entries       : vec![ActionLogEntry {
                time        : Utc::now(),
                code        : "ActionReceived".into(),
                description : "Action received and queued for execution".into(),
                details     : None,
            }],
        };

        let value: serde_json::Value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["limit"], json!(25));
        assert_eq!(value["has_next_page"], json!(false));
        assert_eq!(value["entries"][0]["code"], json!("ActionReceived"));
    }
}




/***** ERRORS *****/
/// Defines errors that occur when parsing identifiers.
#[derive(Debug)]
pub enum IdError {
    /// Failed to parse the identifier as a UUID.
    ParseError{ what: &'static str, raw: String, err: uuid::Error },
}

impl Display for IdError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use IdError::*;
        match self {
            ParseError{ what, raw, err } => write!(f, "Failed to parse '{}' as a {}: {}", raw, what, err),
        }
    }
}

impl Error for IdError {}



/// Defines errors that occur when parsing an ActionStatusValue from its wire name.
#[derive(Debug)]
pub enum StatusParseError {
    /// The given string was none of the four lifecycle statuses.
    UnknownStatus{ raw: String },
}

impl Display for StatusParseError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use StatusParseError::*;
        match self {
            UnknownStatus{ raw } => write!(f, "Unknown action status '{}' (expected ACTIVE, INACTIVE, SUCCEEDED or FAILED)", raw),
        }
    }
}

impl Error for StatusParseError {}





/***** LIBRARY *****/
/// Defines a unique identifier for a single submitted action.
///
/// This is the identifier the provider mints; clients address the action by it in every
/// status / cancel / release / log call. Not to be confused with the client-chosen
/// `request_id`, which only scopes idempotency.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generate a new ActionId.
    ///
    /// # Returns
    /// A new instance of an ActionId that is practically unique.
    #[inline]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<&ActionId> for ActionId {
    #[inline]
    fn from(value: &ActionId) -> Self {
        value.clone()
    }
}
impl AsRef<ActionId> for ActionId {
    #[inline]
    fn as_ref(&self) -> &ActionId {
        self
    }
}

impl From<ActionId> for String {
    #[inline]
    fn from(value: ActionId) -> Self {
        Self::from(&value)
    }
}
impl From<&ActionId> for String {
    #[inline]
    fn from(value: &ActionId) -> Self {
        value.0.to_string()
    }
}
impl Display for ActionId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = IdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match Uuid::from_str(value) {
            Ok(uuid) => Ok(Self(uuid)),
            Err(err) => Err(IdError::ParseError{ what: "ActionId", raw: value.into(), err }),
        }
    }
}

impl Serialize for ActionId {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}
impl<'de> Deserialize<'de> for ActionId {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Defines the visitor for the ActionId
        struct ActionIdVisitor;
        impl<'de> Visitor<'de> for ActionIdVisitor {
            type Value = ActionId;

            #[inline]
            fn expecting(&self, f: &mut Formatter<'_>) -> FResult {
                write!(f, "an action identifier (UUID)")
            }

            #[inline]
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match ActionId::from_str(v) {
                    Ok(id)   => Ok(id),
                    Err(err) => Err(E::custom(err)),
                }
            }
        }

        // Call the visitor
        deserializer.deserialize_str(ActionIdVisitor)
    }
}



/// Defines the four lifecycle statuses an action can be in.
///
/// The uppercase string forms are fixed by the external contract; orchestrators poll until
/// they observe one of the two terminal statuses.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatusValue {
    /// The action is running (or queued to run).
    Active,
    /// The action exists but is not making progress and needs provider-side attention.
    Inactive,
    /// The action finished and produced its result.
    Succeeded,
    /// The action finished without producing its result.
    Failed,
}

impl ActionStatusValue {
    /// Returns whether this status is terminal.
    ///
    /// # Returns
    /// True for `Succeeded` and `Failed`, false for the other two.
    #[inline]
    pub fn is_complete(&self) -> bool { matches!(self, Self::Succeeded | Self::Failed) }
}

impl Display for ActionStatusValue {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ActionStatusValue::*;
        match self {
            Active    => write!(f, "ACTIVE"),
            Inactive  => write!(f, "INACTIVE"),
            Succeeded => write!(f, "SUCCEEDED"),
            Failed    => write!(f, "FAILED"),
        }
    }
}

impl FromStr for ActionStatusValue {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_uppercase().as_str() {
            "ACTIVE"    => Ok(Self::Active),
            "INACTIVE"  => Ok(Self::Inactive),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED"    => Ok(Self::Failed),
            _           => Err(StatusParseError::UnknownStatus{ raw: value.into() }),
        }
    }
}



/// Defines the payload of a run call.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ActionRequest {
    /// Client-chosen key that makes the run idempotent per creator. Resubmitting the same
    /// `request_id` with the same `body` yields the original action instead of a new one.
    pub request_id : String,
    /// The provider-specific input document. An arbitrary JSON value as far as the
    /// contract is concerned; the provider validates it against its advertised schema.
    pub body       : serde_json::Value,

    /// A short human-readable name for the action.
    pub label         : Option<String>,
    /// Principals allowed to observe the action, on top of the creator.
    pub monitor_by    : Option<Vec<Principal>>,
    /// Principals allowed to cancel/release the action, on top of the creator.
    pub manage_by     : Option<Vec<Principal>>,
    /// Seconds after completion before the provider may reclaim the action's record.
    pub release_after : Option<u64>,
}



/// Defines the canonical action document returned by every lifecycle operation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ActionStatus {
    /// The provider-minted identifier of the action.
    pub action_id  : ActionId,
    /// Where the action is in its lifecycle.
    pub status     : ActionStatusValue,
    /// The principal that submitted the run.
    pub creator_id : Principal,
    /// The label the request carried, if any.
    pub label      : Option<String>,

    /// Principals allowed to observe the action (on top of the creator).
    pub monitor_by : Vec<Principal>,
    /// Principals allowed to cancel/release the action (on top of the creator).
    pub manage_by  : Vec<Principal>,

    /// When the provider accepted the run.
    pub start_time      : DateTime<Utc>,
    /// When the action reached a terminal status (None while incomplete).
    pub completion_time : Option<DateTime<Utc>>,
    /// Seconds after completion before the record may be reclaimed.
    pub release_after   : Option<u64>,

    /// A short human-readable progress string.
    pub display_status : Option<String>,
    /// Provider-specific result payload (exit codes, output, error details).
    pub details        : Option<serde_json::Value>,
}

impl ActionStatus {
    /// Returns whether this action has reached a terminal status.
    #[inline]
    pub fn is_complete(&self) -> bool { self.status.is_complete() }
}



/// Defines a single entry in an action's execution log.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ActionLogEntry {
    /// When the event happened.
    pub time        : DateTime<Utc>,
    /// A short machine-matchable event code (e.g. `ContainerLaunched`).
    pub code        : String,
    /// A human-readable account of the event.
    pub description : String,
    /// Optional structured payload for the event.
    pub details     : Option<serde_json::Value>,
}

/// Defines one page of an action's execution log.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ActionLogPage {
    /// The page size that was applied.
    pub limit         : u64,
    /// The number of entries skipped before this page.
    pub offset        : u64,
    /// Whether more entries exist past this page.
    pub has_next_page : bool,
    /// The entries of this page, oldest first.
    pub entries       : Vec<ActionLogEntry>,
}
