//  AUTH.rs
//    by Eisfeld
//
//  Created:
//    07 Feb 2023, 11:04:12
//  Last edited:
//    21 Mar 2023, 10:17:50
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the principal URNs that the contract's access-control lists
//!   are written in.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use uuid::Uuid;


/***** TESTS *****/




/***** ERRORS *****/
/// Defines errors that occur when parsing principal URNs.
#[derive(Debug)]
pub enum PrincipalParseError {
    /// The URN carried an identity/group prefix but the trailing part was not a UUID.
    IllegalUuid{ what: &'static str, raw: String, err: uuid::Error },
    /// The string was neither a known URN prefix nor one of the special strings.
    UnknownUrn{ raw: String },
}

impl Display for PrincipalParseError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use PrincipalParseError::*;
        match self {
            IllegalUuid{ what, raw, err } => write!(f, "Failed to parse '{}' in {} URN as a UUID: {}", raw, what, err),
            UnknownUrn{ raw }             => write!(f, "Unknown principal '{}' (expected an identity URN, a group URN, 'public' or 'all_authenticated_users')", raw),
        }
    }
}

impl Error for PrincipalParseError {}





/***** CONSTANTS *****/
/// The URN prefix for auth identities.
pub const IDENTITY_URN_PREFIX: &str = "urn:globus:auth:identity:";
/// The URN prefix for groups.
pub const GROUP_URN_PREFIX: &str = "urn:globus:groups:id:";
/// The special principal that admits anyone, authenticated or not.
pub const PUBLIC: &str = "public";
/// The special principal that admits anyone who presented a valid token.
pub const ALL_AUTHENTICATED_USERS: &str = "all_authenticated_users";





/***** LIBRARY *****/
/// Defines a principal as it appears in the contract's access-control lists.
///
/// Access-control lists (`visible_to`, `runnable_by`, `monitor_by`, `manage_by`, ...) are
/// lists of these. The two special forms are only meaningful inside such lists; an
/// authenticated caller is identified by `Identity` and `Group` principals.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Principal {
    /// A single auth identity.
    Identity(Uuid),
    /// Every member of a group.
    Group(Uuid),
    /// Anyone, including anonymous callers.
    Public,
    /// Anyone who presented a valid token.
    AllAuthenticatedUsers,
}

impl Principal {
    /// Constructor for the Principal that wraps the given identity UUID.
    ///
    /// # Arguments
    /// - `id`: The identity UUID to wrap.
    ///
    /// # Returns
    /// A new `Principal::Identity`.
    #[inline]
    pub fn identity(id: impl Into<Uuid>) -> Self { Self::Identity(id.into()) }

    /// Constructor for the Principal that wraps the given group UUID.
    ///
    /// # Arguments
    /// - `id`: The group UUID to wrap.
    ///
    /// # Returns
    /// A new `Principal::Group`.
    #[inline]
    pub fn group(id: impl Into<Uuid>) -> Self { Self::Group(id.into()) }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Principal::*;
        match self {
            Identity(id)          => write!(f, "{}{}", IDENTITY_URN_PREFIX, id),
            Group(id)             => write!(f, "{}{}", GROUP_URN_PREFIX, id),
            Public                => write!(f, "{}", PUBLIC),
            AllAuthenticatedUsers => write!(f, "{}", ALL_AUTHENTICATED_USERS),
        }
    }
}

impl FromStr for Principal {
    type Err = PrincipalParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == PUBLIC {
            Ok(Self::Public)
        } else if value == ALL_AUTHENTICATED_USERS {
            Ok(Self::AllAuthenticatedUsers)
        } else if let Some(raw) = value.strip_prefix(IDENTITY_URN_PREFIX) {
            match Uuid::from_str(raw) {
                Ok(id)   => Ok(Self::Identity(id)),
                Err(err) => Err(PrincipalParseError::IllegalUuid{ what: "identity", raw: raw.into(), err }),
            }
        } else if let Some(raw) = value.strip_prefix(GROUP_URN_PREFIX) {
            match Uuid::from_str(raw) {
                Ok(id)   => Ok(Self::Group(id)),
                Err(err) => Err(PrincipalParseError::IllegalUuid{ what: "group", raw: raw.into(), err }),
            }
        } else {
            Err(PrincipalParseError::UnknownUrn{ raw: value.into() })
        }
    }
}

impl Serialize for Principal {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for Principal {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Defines the visitor for the Principal
        struct PrincipalVisitor;
        impl<'de> Visitor<'de> for PrincipalVisitor {
            type Value = Principal;

            #[inline]
            fn expecting(&self, f: &mut Formatter<'_>) -> FResult {
                write!(f, "a principal URN or special principal string")
            }

            #[inline]
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match Principal::from_str(v) {
                    Ok(principal) => Ok(principal),
                    Err(err)      => Err(E::custom(err)),
                }
            }
        }

        // Call the visitor
        deserializer.deserialize_str(PrincipalVisitor)
    }
}

impl AsRef<Principal> for Principal {
    #[inline]
    fn as_ref(&self) -> &Self { self }
}
impl From<&Principal> for Principal {
    #[inline]
    fn from(value: &Principal) -> Self { *value }
}
