//! Stable exit codes for relay CLI commands.

use crate::error::{RelayError, StateError};

/// Stage completed and state was written.
pub const OK: i32 = 0;
/// Backend failure or any other error.
pub const FAILURE: i32 = 1;
/// Missing environment, invalid config, or unreadable pipeline state.
pub const CONFIGURATION: i32 = 2;
/// A lookup matched zero or several entities.
pub const RESOLUTION: i32 = 3;

/// Exit code for an error returned by a command.
///
/// Walks the context chain and classifies the first typed error found.
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(relay) = cause.downcast_ref::<RelayError>() {
            return match relay {
                RelayError::Configuration { .. }
                | RelayError::InvalidConfig(_)
                | RelayError::State(_) => CONFIGURATION,
                RelayError::NotFound { .. } | RelayError::Ambiguous { .. } => RESOLUTION,
                RelayError::Backend(_) => FAILURE,
            };
        }
        if cause.downcast_ref::<StateError>().is_some() {
            return CONFIGURATION;
        }
    }
    FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::LookupFilter;
    use crate::error::BackendError;
    use anyhow::Context;

    #[test]
    fn typed_errors_map_through_context() {
        let missing: anyhow::Error = RelayError::Configuration {
            key: "RELAY_BUILD_VPC".to_string(),
        }
        .into();
        assert_eq!(for_error(&missing.context("instantiate failed")), CONFIGURATION);

        let filter = LookupFilter::new("vpc").with_term("tag:Name", "build");
        let ambiguous: anyhow::Result<()> =
            Err(RelayError::ambiguous(&filter, 2)).context("instantiate failed");
        assert_eq!(for_error(&ambiguous.expect_err("err")), RESOLUTION);

        let state: anyhow::Error = StateError::Parse("eof".to_string()).into();
        assert_eq!(for_error(&state), CONFIGURATION);

        let backend: anyhow::Error =
            RelayError::from(BackendError::failed("run-instances", "boom")).into();
        assert_eq!(for_error(&backend), FAILURE);
    }

    #[test]
    fn untyped_errors_are_failures() {
        assert_eq!(for_error(&anyhow::anyhow!("disk full")), FAILURE);
    }
}
