//  VERSION.rs
//    by Eisfeld
//
//  Created:
//    14 Feb 2023, 10:00:05
//  Last edited:
//    14 Apr 2023, 14:51:37
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the function(s) that handle the `/version` path(s).
//

use log::debug;
use warp::{Rejection, Reply};
use warp::http::HeaderValue;
use warp::hyper::Body;
use warp::reply::Response;

use specifications::provider::API_VERSION;


/***** LIBRARY *****/
/// Handles a GET on the main `/version` path, returning the version number of this service.
///
/// # Returns
/// The response that can be send back to the client. Simply contains the string 'vXX.YY.ZZ', where
/// - `XX` is the major version;
/// - `YY` is the minor version; and
/// - `ZZ` is the patch version.
///
/// The version of the action-provider interface this service speaks is separate from the service
/// version, and is advertised in the `X-Api-Version` header instead.
///
/// # Errors
/// This function doesn't usually error.
pub async fn get() -> Result<impl Reply, Rejection> {
    debug!("Handling GET on `/version` (i.e., get service version)...");

    // Parse Cargo's version number
    let version = env!("CARGO_PKG_VERSION");
    let version = format!("v{}", version);
    let version_len = version.len();

    // Construct a response with the body, the content-length header and the interface version
    let mut response = Response::new(Body::from(version));
    response.headers_mut().insert(
        "Content-Length",
        HeaderValue::from(version_len),
    );
    response.headers_mut().insert(
        "X-Api-Version",
        HeaderValue::from_static(API_VERSION),
    );

    // Done
    Ok(response)
}
