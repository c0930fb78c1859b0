//  ERRORS.rs
//    by Eisfeld
//
//  Created:
//    13 Feb 2023, 10:11:02
//  Last edited:
//    13 Feb 2023, 10:26:44
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines errors that occur in the `floe-flw` crate.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};


/***** LIBRARY *****/
/// Errors that relate to building a flow definition.
#[derive(Debug)]
pub enum BuildError {
    /// The builder was asked to build a flow with no states at all.
    EmptyFlow,
    /// Two tools contributed a state under the same name.
    DuplicateState{ name: String },
    /// A tool contributed a state that is not a JSON object.
    NonObjectState{ tool: String, name: String },
}

impl Display for BuildError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use BuildError::*;
        match self {
            EmptyFlow                   => write!(f, "Cannot build a flow without any states"),
            DuplicateState{ name }      => write!(f, "State '{}' is contributed more than once", name),
            NonObjectState{ tool, name } => write!(f, "Tool '{}' contributed state '{}' that is not a JSON object", tool, name),
        }
    }
}

impl Error for BuildError {}
