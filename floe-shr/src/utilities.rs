//  UTILITIES.rs
//    by Eisfeld
//
//  Created:
//    09 Feb 2023, 14:31:40
//  Last edited:
//    09 Feb 2023, 14:58:12
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines common utilities across the project.
//

use regex::Regex;
use url::Url;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;

    /// Test some basic HTTP schemas
    #[test]
    fn ensurehttpschema_noschema_added() {
        let url = ensure_http_schema("provider.example.org", true).unwrap();
        assert_eq!(url, "https://provider.example.org");

        let url = ensure_http_schema("provider.example.org", false).unwrap();
        assert_eq!(url, "http://provider.example.org");
    }

    /// Test some more basic HTTP schemas
    #[test]
    fn ensurehttpschema_schema_nothing() {
        let url = ensure_http_schema("http://provider.example.org", true).unwrap();
        assert_eq!(url, "http://provider.example.org");

        let url = ensure_http_schema("https://provider.example.org", false).unwrap();
        assert_eq!(url, "https://provider.example.org");
    }
}




/***** HTTP SCHEMAS *****/
/// Makes sure the given URL carries an `http://` or `https://` schema, prepending one if it
/// does not.
///
/// # Arguments
/// - `url`: The URL to check.
/// - `secure`: Whether to prepend `https` (true) or `http` (false) if no schema is present.
///
/// # Returns
/// The URL with a schema, guaranteed.
///
/// # Errors
/// This function errors if the result is not a parseable URL at all.
pub fn ensure_http_schema<S>(
    url: S,
    secure: bool,
) -> Result<String, url::ParseError>
where
    S: Into<String>,
{
    let url = url.into();
    let re = Regex::new(r"^https?://.*").unwrap();

    let url = if re.is_match(&url) {
        url
    } else {
        format!("{}://{}", if secure { "https" } else { "http" }, url)
    };

    // Check if url is valid.
    let _ = Url::parse(&url)?;

    Ok(url)
}
