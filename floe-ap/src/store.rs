//  STORE.rs
//    by Eisfeld
//
//  Created:
//    15 Feb 2023, 13:46:02
//  Last edited:
//    11 Apr 2023, 10:18:47
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the in-memory action store. All bookkeeping lives behind
//!   a single lock so that the idempotency check, the status transitions
//!   and the release path are each one atomic step.
//

use std::collections::HashMap;
use std::fmt::{Formatter, Result as FResult, Write as _};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use floe_shr::debug::EnumDebug;
use specifications::action::{ActionId, ActionLogEntry, ActionLogPage, ActionStatus, ActionStatusValue};


/***** TESTS *****/





/***** CONSTANTS *****/
/// The display status written when an action is cancelled on the user's behalf.
pub const CANCELED_DISPLAY_STATUS: &str = "canceled by user request";

/// Log code for an action that has been admitted to the store.
pub const LOG_ACTION_RECEIVED: &str = "ActionReceived";
/// Log code for a compute container that has been started.
pub const LOG_CONTAINER_LAUNCHED: &str = "ContainerLaunched";
/// Log code for a compute container that ran to an exit code.
pub const LOG_CONTAINER_EXITED: &str = "ContainerExited";
/// Log code for an action whose container never made it off the ground.
pub const LOG_LAUNCH_FAILED: &str = "LaunchFailed";
/// Log code for an action that was cancelled by the user.
pub const LOG_ACTION_CANCELED: &str = "ActionCanceled";
/// Log code for an action whose provenance bundle has been written.
pub const LOG_PROVENANCE_RECORDED: &str = "ProvenanceRecorded";





/***** AUXILLARY *****/
/// Defines the possible outcomes of submitting a request to the store.
#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    /// Nothing was filed under this idempotency key yet; the given status has been admitted as-is.
    New,
    /// The same creator already submitted this request id with an identical body. Carries the filed action's current status.
    Replay(ActionStatus),
    /// The same creator already submitted this request id, but with a different body.
    Conflict,
}

impl EnumDebug for SubmitOutcome {
    fn fmt_name(&self, f: &mut Formatter<'_>) -> FResult {
        use SubmitOutcome::*;
        match self {
            New       => write!(f, "New"),
            Replay(_) => write!(f, "Replay"),
            Conflict  => write!(f, "Conflict"),
        }
    }
}



/// Defines the possible outcomes of cancelling an action.
#[derive(Clone, Debug)]
pub enum CancelOutcome {
    /// The action was still incomplete and has now been failed. Carries the updated status.
    Canceled(ActionStatus),
    /// The action exists, but already ran to completion.
    AlreadyComplete,
    /// No such action, or the caller may not see it.
    NotFound,
}

/// Defines the possible outcomes of releasing an action.
#[derive(Clone, Debug)]
pub enum ReleaseOutcome {
    /// The action was complete and has been removed from both maps. Carries the final status.
    Released(ActionStatus),
    /// The action exists, but has not completed yet.
    Incomplete,
    /// No such action, or the caller may not see it.
    NotFound,
}





/***** HELPER STRUCTS *****/
/// The key under which idempotent submissions are filed.
type IdempotencyKey = (Uuid, String);

/// What we remember about a submission for replay/conflict detection.
#[derive(Clone, Debug)]
struct IdempotencyEntry {
    /// The digest of the submitted body.
    digest : String,
    /// The action that was filed for it.
    action : ActionId,
}

/// The per-action bookkeeping.
#[derive(Clone, Debug)]
struct ActionRecord {
    /// The status document as served to clients.
    status : ActionStatus,
    /// The idempotency key this action was filed under.
    key    : IdempotencyKey,
    /// The log entries recorded for this action so far, oldest first.
    log    : Vec<ActionLogEntry>,
}

/// The maps themselves, so they live behind one lock.
#[derive(Debug)]
struct StoreInner {
    /// All live actions, keyed by their identifier.
    actions     : HashMap<ActionId, ActionRecord>,
    /// Maps (creator identity, request id) to the filed submission.
    idempotency : HashMap<IdempotencyKey, IdempotencyEntry>,
}





/***** LIBRARY *****/
/// The in-memory action store.
///
/// Holds both the action records and the idempotency entries behind a single
/// `RwLock`, which is what makes submit a check-and-set and release an
/// all-or-nothing removal.
#[derive(Debug)]
pub struct ActionStore {
    /// The two maps, guarded together.
    inner : RwLock<StoreInner>,
}

impl ActionStore {
    /// Constructor for the ActionStore that initializes it to an empty one.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner : RwLock::new(StoreInner {
                actions     : HashMap::new(),
                idempotency : HashMap::new(),
            }),
        }
    }



    /// Computes the body digest used for idempotent replay detection.
    ///
    /// The digest is the SHA-256 of the compact `serde_json` rendering. Object keys
    /// are ordered in that rendering, so two bodies that are the same JSON value
    /// digest identically regardless of the key order they were sent with.
    ///
    /// # Arguments
    /// - `body`: The submitted input document.
    ///
    /// # Returns
    /// The digest as a lowercase hex string.
    pub fn digest(body: &Value) -> String {
        let mut hasher: Sha256 = Sha256::new();
        hasher.update(body.to_string().as_bytes());

        let mut digest: String = String::with_capacity(64);
        for byte in hasher.finalize() {
            let _ = write!(digest, "{:02x}", byte);
        }
        digest
    }

    /// Files a new action, unless the idempotency key is already taken.
    ///
    /// # Arguments
    /// - `creator`: The identity of the submitting user.
    /// - `request_id`: The client-chosen request id.
    /// - `digest`: The digest of the submitted body (see [`ActionStore::digest()`]).
    /// - `status`: The initial status document of the action-to-be.
    ///
    /// # Returns
    /// [`SubmitOutcome::New`] if the status was admitted as-is, [`SubmitOutcome::Replay`]
    /// with the previously filed action's current status if this is a resubmission, or
    /// [`SubmitOutcome::Conflict`] if the key is taken by a different body.
    pub fn submit(&self, creator: Uuid, request_id: impl Into<String>, digest: impl Into<String>, status: ActionStatus) -> SubmitOutcome {
        let request_id : String = request_id.into();
        let digest     : String = digest.into();

        let mut inner: RwLockWriteGuard<StoreInner> = self.inner.write().unwrap();

        // Check the idempotency map before anything else
        let key: IdempotencyKey = (creator, request_id);
        if let Some(entry) = inner.idempotency.get(&key) {
            if entry.digest != digest { return SubmitOutcome::Conflict; }
            if let Some(record) = inner.actions.get(&entry.action) {
                return SubmitOutcome::Replay(record.status.clone());
            }
            // The entry points at a removed action; re-file below
        }

        // Free key; file the action under both maps
        inner.idempotency.insert(key.clone(), IdempotencyEntry{ digest, action: status.action_id.clone() });
        inner.actions.insert(status.action_id.clone(), ActionRecord{ status, key, log: vec![] });
        SubmitOutcome::New
    }



    /// Returns the current status of the given action.
    ///
    /// # Arguments
    /// - `action`: The identifier of the action to look up.
    /// - `guard`: Decides whether the caller may see this action at all. A rejected
    ///   lookup is indistinguishable from a missing action.
    ///
    /// # Returns
    /// The status document, or `None` if it does not exist (for this caller).
    pub fn get(&self, action: &ActionId, guard: impl FnOnce(&ActionStatus) -> bool) -> Option<ActionStatus> {
        let inner: RwLockReadGuard<StoreInner> = self.inner.read().unwrap();
        let record: &ActionRecord = inner.actions.get(action)?;
        if !guard(&record.status) { return None; }
        Some(record.status.clone())
    }

    /// Lists the status of every action the guard admits, in submission order.
    ///
    /// # Arguments
    /// - `guard`: The predicate that decides which actions the caller gets to see.
    pub fn enumerate(&self, mut guard: impl FnMut(&ActionStatus) -> bool) -> Vec<ActionStatus> {
        let inner: RwLockReadGuard<StoreInner> = self.inner.read().unwrap();
        let mut statuses: Vec<ActionStatus> = inner.actions.values().filter(|record| guard(&record.status)).map(|record| record.status.clone()).collect();
        statuses.sort_by_key(|status| status.start_time);
        statuses
    }

    /// Returns how many actions are currently filed.
    #[inline]
    pub fn len(&self) -> usize { self.inner.read().unwrap().actions.len() }

    /// Returns true if no actions are currently filed.
    #[inline]
    pub fn is_empty(&self) -> bool { self.len() == 0 }



    /// Cancels the given action by failing it on the user's behalf.
    ///
    /// # Arguments
    /// - `action`: The identifier of the action to cancel.
    /// - `now`: The timestamp to record as the completion time.
    /// - `guard`: Decides whether the caller may touch this action at all.
    ///
    /// # Returns
    /// [`CancelOutcome::Canceled`] with the updated status if the action was still
    /// running, [`CancelOutcome::AlreadyComplete`] if there is nothing left to cancel,
    /// or [`CancelOutcome::NotFound`] if the action does not exist (for this caller).
    pub fn cancel(&self, action: &ActionId, now: DateTime<Utc>, guard: impl FnOnce(&ActionStatus) -> bool) -> CancelOutcome {
        let mut inner: RwLockWriteGuard<StoreInner> = self.inner.write().unwrap();
        let record: &mut ActionRecord = match inner.actions.get_mut(action) {
            Some(record) => record,
            None         => { return CancelOutcome::NotFound; },
        };
        if !guard(&record.status) { return CancelOutcome::NotFound; }
        if record.status.is_complete() { return CancelOutcome::AlreadyComplete; }

        record.status.status          = ActionStatusValue::Failed;
        record.status.completion_time = Some(now);
        record.status.display_status  = Some(CANCELED_DISPLAY_STATUS.into());
        CancelOutcome::Canceled(record.status.clone())
    }

    /// Completes the given action with the given final status.
    ///
    /// This is a compare-and-set: only an `Active` action transitions. A container
    /// result that arrives after a user cancellation therefore changes nothing.
    ///
    /// # Arguments
    /// - `action`: The identifier of the action to complete.
    /// - `status`: The final status value (`Succeeded` or `Failed`).
    /// - `details`: Free-form details to attach to the status document (exit code, output, ...).
    /// - `now`: The timestamp to record as the completion time.
    ///
    /// # Returns
    /// Whether the transition was applied.
    pub fn complete(&self, action: &ActionId, status: ActionStatusValue, details: Option<Value>, now: DateTime<Utc>) -> bool {
        let mut inner: RwLockWriteGuard<StoreInner> = self.inner.write().unwrap();
        let record: &mut ActionRecord = match inner.actions.get_mut(action) {
            Some(record) => record,
            None         => { return false; },
        };
        if record.status.status != ActionStatusValue::Active { return false; }

        record.status.status          = status;
        record.status.completion_time = Some(now);
        record.status.details         = details;
        true
    }

    /// Releases the given action, removing it from both maps.
    ///
    /// # Arguments
    /// - `action`: The identifier of the action to release.
    /// - `guard`: Decides whether the caller may touch this action at all.
    ///
    /// # Returns
    /// [`ReleaseOutcome::Released`] with the final status if it was removed,
    /// [`ReleaseOutcome::Incomplete`] if the action has not completed yet, or
    /// [`ReleaseOutcome::NotFound`] if the action does not exist (for this caller).
    pub fn release(&self, action: &ActionId, guard: impl FnOnce(&ActionStatus) -> bool) -> ReleaseOutcome {
        let mut inner: RwLockWriteGuard<StoreInner> = self.inner.write().unwrap();

        // Check existence, visibility and completeness before taking anything out
        match inner.actions.get(action) {
            Some(record) => {
                if !guard(&record.status) { return ReleaseOutcome::NotFound; }
                if !record.status.is_complete() { return ReleaseOutcome::Incomplete; }
            },
            None => { return ReleaseOutcome::NotFound; },
        }

        // All checks passed; drop it from both maps
        match inner.actions.remove(action) {
            Some(record) => {
                inner.idempotency.remove(&record.key);
                ReleaseOutcome::Released(record.status)
            },
            None => ReleaseOutcome::NotFound,
        }
    }

    /// Removes every completed action whose release deadline has passed, as if released.
    ///
    /// Actions without a `release_after` are only ever removed by an explicit release.
    ///
    /// # Arguments
    /// - `now`: The current time to judge deadlines against.
    ///
    /// # Returns
    /// The identifiers of the actions that were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<ActionId> {
        let mut inner: RwLockWriteGuard<StoreInner> = self.inner.write().unwrap();

        // Collect the expired actions first
        let expired: Vec<ActionId> = inner.actions.iter()
            .filter(|(_, record)| {
                let completion: DateTime<Utc> = match record.status.completion_time {
                    Some(completion) => completion,
                    None             => { return false; },
                };
                let release_after: i64 = match record.status.release_after {
                    Some(secs) => secs as i64,
                    None       => { return false; },
                };
                completion + Duration::seconds(release_after) <= now
            })
            .map(|(id, _)| id.clone())
            .collect();

        // Then drop them from both maps
        for id in &expired {
            if let Some(record) = inner.actions.remove(id) {
                inner.idempotency.remove(&record.key);
            }
        }
        expired
    }



    /// Appends an entry to the given action's log buffer.
    ///
    /// # Arguments
    /// - `action`: The identifier of the action to log for.
    /// - `code`: The short machine-readable code of the entry (see the `LOG_*` constants).
    /// - `description`: The human-readable description of the entry.
    /// - `details`: Optional free-form details.
    ///
    /// # Returns
    /// Whether the action existed (and the entry was thus recorded).
    pub fn append_log(&self, action: &ActionId, code: impl Into<String>, description: impl Into<String>, details: Option<Value>) -> bool {
        let mut inner: RwLockWriteGuard<StoreInner> = self.inner.write().unwrap();
        match inner.actions.get_mut(action) {
            Some(record) => {
                record.log.push(ActionLogEntry {
                    time        : Utc::now(),
                    code        : code.into(),
                    description : description.into(),
                    details,
                });
                true
            },
            None => false,
        }
    }

    /// Returns one page of the given action's log buffer.
    ///
    /// # Arguments
    /// - `action`: The identifier of the action to read the log of.
    /// - `limit`: The maximum number of entries on the page.
    /// - `offset`: The number of entries to skip first. An offset past the end yields
    ///   an empty page rather than an error.
    /// - `guard`: Decides whether the caller may see this action at all.
    ///
    /// # Returns
    /// The page, or `None` if the action does not exist (for this caller).
    pub fn log_page(&self, action: &ActionId, limit: u64, offset: u64, guard: impl FnOnce(&ActionStatus) -> bool) -> Option<ActionLogPage> {
        let inner: RwLockReadGuard<StoreInner> = self.inner.read().unwrap();
        let record: &ActionRecord = inner.actions.get(action)?;
        if !guard(&record.status) { return None; }

        let total : u64 = record.log.len() as u64;
        let start : u64 = offset.min(total);
        let end   : u64 = offset.saturating_add(limit).min(total);
        Some(ActionLogPage {
            limit,
            offset,
            has_next_page : end < total,
            entries       : record.log[start as usize..end as usize].to_vec(),
        })
    }
}
