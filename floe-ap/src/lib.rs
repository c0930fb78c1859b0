//  LIB.rs
//    by Eisfeld
//
//  Created:
//    14 Feb 2023, 09:12:41
//  Last edited:
//    03 Apr 2023, 14:55:02
//  Auto updated?
//    Yes
//
//  Description:
//!   The `floe-ap` service implements the action provider itself: the
//!   REST surface that workflow orchestrators call to run, monitor,
//!   cancel and release containerized compute actions.
//

// Declare the modules
pub mod errors;
pub mod spec;
pub mod store;
pub mod auth;
pub mod docker;
pub mod executor;
pub mod provenance;
pub mod health;
pub mod version;
pub mod actions;
