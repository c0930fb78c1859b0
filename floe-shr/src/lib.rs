//  LIB.rs
//    by Eisfeld
//
//  Created:
//    09 Feb 2023, 13:40:02
//  Last edited:
//    09 Feb 2023, 13:41:37
//  Auto updated?
//    Yes
//
//  Description:
//!   The `floe-shr` crate provides common implementations used throughout
//!   the project. Unlike the `specifications` crate it does not define
//!   contracts, just shared plumbing.
//

// Declare some modules
pub mod debug;
pub mod fs;
pub mod utilities;
