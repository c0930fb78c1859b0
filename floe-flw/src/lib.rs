//  LIB.rs
//    by Eisfeld
//
//  Created:
//    13 Feb 2023, 10:05:33
//  Last edited:
//    13 Feb 2023, 10:09:20
//  Auto updated?
//    Yes
//
//  Description:
//!   The `floe-flw` crate composes Automate flow definitions out of
//!   reusable tool states. The hosted services behind the referenced
//!   action URLs are never reimplemented here; this crate only writes
//!   the JSON that points an orchestrator at them.
//

// Declare the modules
pub mod builder;
pub mod errors;
pub mod spec;
pub mod tools;
