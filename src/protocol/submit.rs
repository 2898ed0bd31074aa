use std::time::Duration;

use serde::Serialize;

use super::wire::{NO_KEY, check_field};
use crate::errors::RelayResult;
use crate::transport::Transport;

// -----------------------------------------------------------------------------
// ----- SubmitRequest ---------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    pub result: String,
    pub hashrate: String,
    pub rig_name: String,
    pub key: Option<String>,
}

impl SubmitRequest {
    /// `<result>,<hashrate>,<rigName>,<key or "None">`
    pub fn encode(&self) -> RelayResult<String> {
        check_field("result", &self.result)?;
        check_field("hashrate", &self.hashrate)?;
        check_field("rig_name", &self.rig_name)?;

        let key = match &self.key {
            Some(key) => {
                check_field("key", key)?;
                key.as_str()
            }
            None => NO_KEY,
        };

        Ok(format!(
            "{},{},{},{}",
            self.result, self.hashrate, self.rig_name, key
        ))
    }
}

// -----------------------------------------------------------------------------
// ----- Verdict ---------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub accepted: bool,
    pub feedback: String,
}

impl Verdict {
    /// Case-sensitive: the pool answers `GOOD`, `BLOCK` or `BAD[,reason]`.
    pub fn classify(feedback: impl Into<String>) -> Verdict {
        let feedback = feedback.into();
        let accepted = feedback.contains("GOOD") || feedback.contains("BLOCK");
        Verdict { accepted, feedback }
    }
}

// -----------------------------------------------------------------------------
// ----- Exchange --------------------------------------------------------------

pub async fn exchange(
    transport: &mut dyn Transport,
    request: &SubmitRequest,
    receive_timeout: Duration,
) -> RelayResult<Verdict> {
    let line = request.encode()?;
    transport.send_line(&line).await?;

    let feedback = transport.receive_line(receive_timeout).await?;
    Ok(Verdict::classify(feedback.trim()))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
