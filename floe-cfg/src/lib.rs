//  LIB.rs
//    by Eisfeld
//
//  Created:
//    10 Feb 2023, 09:10:25
//  Last edited:
//    10 Feb 2023, 09:12:48
//  Auto updated?
//    Yes
//
//  Description:
//!   The `floe-cfg` crate defines the provider's on-disk configuration
//!   file and how to read it.
//

// Declare the modules
pub mod errors;
pub mod provider;
