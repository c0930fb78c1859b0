//  HEALTH.rs
//    by Eisfeld
//
//  Created:
//    14 Feb 2023, 09:58:11
//  Last edited:
//    14 Apr 2023, 14:48:02
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements function(s) that handle various REST function(s) on the
//!   `/health` path(s).
//

use std::sync::Arc;

use log::debug;
use warp::{Rejection, Reply};
use warp::http::HeaderValue;
use warp::hyper::Body;
use warp::reply::Response;

use crate::spec::Context;


/***** LIBRARY *****/
/// Handles a GET on the main `/health` path, returning that this service is alive.
///
/// # Arguments
/// - `context`: The Context that carries the action store, so occupancy can be logged alongside the check.
///
/// # Returns
/// The response that can be send back to the client. Simply contains the string "OK!\n".
///
/// # Errors
/// This function doesn't usually error.
pub async fn get(context: Arc<Context>) -> Result<impl Reply, Rejection> {
    debug!("Handling GET on `/health` (i.e., confirming service is alive)...");
    debug!("Currently tracking {} action(s)", context.store.len());

    // Construct a response with the body and the content-length header
    let mut response = Response::new(Body::from("OK!\n"));
    response.headers_mut().insert(
        "Content-Length",
        HeaderValue::from(4),
    );

    // Done
    Ok(response)
}
