use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::wire::{FIELD_SEPARATOR, check_field};
use crate::config::ProtocolSettings;
use crate::errors::{RelayError, RelayResult};
use crate::transport::Transport;

// -----------------------------------------------------------------------------
// ----- JobRequest ------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRequest {
    pub username: String,
    pub difficulty_tag: String,
    pub key: Option<String>,
}

impl JobRequest {
    /// `JOB,<username>,<difficulty>[,<key>]`
    pub fn encode(&self) -> RelayResult<String> {
        check_field("username", &self.username)?;
        check_field("difficulty", &self.difficulty_tag)?;

        let mut line = format!("JOB,{},{}", self.username, self.difficulty_tag);

        if let Some(key) = &self.key {
            check_field("key", key)?;
            line.push(FIELD_SEPARATOR);
            line.push_str(key);
        }

        Ok(line)
    }
}

// -----------------------------------------------------------------------------
// ----- Job -------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Job {
    pub last_hash: String,
    pub expected_hash: String,
    pub difficulty: u64,
}

impl Job {
    /// Parse a `<lastHash>,<expectedHash>,<difficulty>[,...]` payload.
    pub fn parse(line: &str) -> RelayResult<Job> {
        let fields: Vec<&str> = line.trim().split(FIELD_SEPARATOR).collect();

        let [last_hash, expected_hash, difficulty, ..] = fields.as_slice() else {
            return Err(RelayError::protocol(format!(
                "job has {} field(s), expected at least 3: {line:?}",
                fields.len()
            )));
        };

        let difficulty = difficulty.trim().parse::<u64>().map_err(|_| {
            RelayError::protocol(format!("job difficulty is not an integer: {difficulty:?}"))
        })?;

        Ok(Job {
            last_hash: last_hash.to_string(),
            expected_hash: expected_hash.to_string(),
            difficulty,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Chatter ---------------------------------------------------------------

/// Lines that cannot be a job payload: no field separator, or carrying one of
/// the configured notice markers.
pub fn is_chatter(line: &str, markers: &[String]) -> bool {
    if !line.contains(FIELD_SEPARATOR) {
        return true;
    }

    let lower = line.to_ascii_lowercase();
    markers
        .iter()
        .any(|marker| !marker.is_empty() && lower.contains(&marker.to_ascii_lowercase()))
}

// -----------------------------------------------------------------------------
// ----- Exchange --------------------------------------------------------------

/// Send one job request and read until a payload line shows up, for at most
/// `job_attempts` reads.
pub async fn exchange(
    transport: &mut dyn Transport,
    request: &JobRequest,
    settings: &ProtocolSettings,
    receive_timeout: Duration,
) -> RelayResult<Job> {
    let line = request.encode()?;
    transport.send_line(&line).await?;

    for attempt in 1..=settings.job_attempts {
        let reply = transport.receive_line(receive_timeout).await?;

        if is_chatter(&reply, &settings.chatter_markers) {
            debug!(attempt, line = %reply, "skipping non-job line from pool");
            continue;
        }

        return Job::parse(&reply);
    }

    Err(RelayError::protocol(format!(
        "no job payload from pool after {} read(s)",
        settings.job_attempts
    )))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
