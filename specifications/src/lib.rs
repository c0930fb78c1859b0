//  LIB.rs
//    by Eisfeld
//
//  Created:
//    07 Feb 2023, 10:12:44
//  Last edited:
//    21 Mar 2023, 09:48:31
//  Auto updated?
//    Yes
//
//  Description:
//!   The `specifications` crate defines the project-wide data model of
//!   the action provider contract: action identifiers and lifecycles,
//!   run requests, principal URNs and provider introspection documents.
//

// Declare the modules
pub mod action;
pub mod auth;
pub mod provider;
