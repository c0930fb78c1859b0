//  ERRORS.rs
//    by Eisfeld
//
//  Created:
//    10 Feb 2023, 09:14:51
//  Last edited:
//    10 Feb 2023, 09:41:33
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines errors that occur in the `floe-cfg` crate.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};
use std::path::PathBuf;


/***** LIBRARY *****/
/// Errors that relate to the ProviderConfig.
#[derive(Debug)]
pub enum ProviderConfigError {
    /// Failed to open the given config path.
    FileOpenError{ path: PathBuf, err: std::io::Error },
    /// Failed to read from the given config path.
    FileReadError{ path: PathBuf, err: std::io::Error },
    /// Failed to parse the given file.
    FileParseError{ path: PathBuf, err: serde_yaml::Error },

    /// Failed to create the given config path.
    FileCreateError{ path: PathBuf, err: std::io::Error },
    /// Failed to write to the given config path.
    FileWriteError{ path: PathBuf, err: std::io::Error },
    /// Failed to serialize the ProviderConfig.
    ConfigSerializeError{ err: serde_yaml::Error },

    /// The configured action URL was not something we can build flow states around.
    IllegalActionUrl{ raw: String, err: url::ParseError },
}

impl Display for ProviderConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ProviderConfigError::*;
        match self {
            FileOpenError{ path, err }  => write!(f, "Failed to open the provider config file '{}': {}", path.display(), err),
            FileReadError{ path, err }  => write!(f, "Failed to read the provider config file '{}': {}", path.display(), err),
            FileParseError{ path, err } => write!(f, "Failed to parse provider config file '{}' as YAML: {}", path.display(), err),

            FileCreateError{ path, err } => write!(f, "Failed to create the provider config file '{}': {}", path.display(), err),
            FileWriteError{ path, err }  => write!(f, "Failed to write to the provider config file '{}': {}", path.display(), err),
            ConfigSerializeError{ err }  => write!(f, "Failed to serialize provider config to YAML: {}", err),

            IllegalActionUrl{ raw, err } => write!(f, "Configured action URL '{}' is not a valid URL: {}", raw, err),
        }
    }
}

impl Error for ProviderConfigError {}
