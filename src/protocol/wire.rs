//! Wire constants shared by the job and submit encoders.
//!
//! The pool protocol has no escaping, so a field holding a separator or a
//! line break would shift or inject fields. Such values are refused before
//! anything reaches the socket.

use crate::errors::{RelayError, RelayResult};

pub const FIELD_SEPARATOR: char = ',';

/// Placeholder the pool expects when a submission carries no mining key.
pub const NO_KEY: &str = "None";

pub fn check_field(name: &str, value: &str) -> RelayResult<()> {
    if value.contains([FIELD_SEPARATOR, '\n', '\r']) {
        return Err(RelayError::protocol(format!(
            "field '{name}' must not contain ',' or line breaks"
        )));
    }
    Ok(())
}
