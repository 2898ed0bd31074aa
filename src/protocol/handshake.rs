//! Version handshake.
//!
//! Right after the channel opens the pool announces its protocol version.
//! Some pools stay silent, others send a message of the day first. The policy
//! is to look at a bounded number of leading lines for a short token and
//! fall back to a known version otherwise; the handshake itself never fails.

use tracing::debug;

use crate::config::HandshakeSettings;
use crate::transport::Transport;

// -----------------------------------------------------------------------------
// ----- Pure policy -----------------------------------------------------------

/// `Some(token)` when `line` plausibly is a version announcement.
pub fn version_token(line: &str, max_len: usize) -> Option<&str> {
    let token = line.trim();

    if token.is_empty() || token.len() > max_len || token.contains(',') {
        return None;
    }

    Some(token)
}

/// Pick the negotiated version from the leading lines the pool sent.
pub fn negotiate_version<I, S>(lines: I, settings: &HandshakeSettings) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .take(settings.max_lines)
        .find_map(|line| version_token(line.as_ref(), settings.max_version_len).map(str::to_string))
        .unwrap_or_else(|| settings.default_version.clone())
}

// -----------------------------------------------------------------------------
// ----- Handshake over a transport --------------------------------------------

/// Drain up to `max_lines` leading lines, stopping at the first version token
/// or the first failed read. Read failures here only mean "no version".
///
/// Pools that announce the version without a newline leave it buffered when
/// the read times out. Those bytes are judged like any other leading line and
/// never carried over into the first job reply.
pub async fn read_version(transport: &mut dyn Transport, settings: &HandshakeSettings) -> String {
    let mut seen = Vec::with_capacity(settings.max_lines);

    for _ in 0..settings.max_lines {
        match transport.receive_line(settings.timeout).await {
            Ok(line) => {
                let found = version_token(&line, settings.max_version_len).is_some();
                if !found {
                    debug!(line = %line, "skipping handshake preamble");
                }
                seen.push(line);
                if found {
                    break;
                }
            }
            Err(e) => {
                debug!("handshake read ended: {e}");
                if let Some(partial) = transport.take_partial() {
                    debug!(partial = %partial, "using unterminated handshake bytes");
                    seen.push(partial);
                }
                break;
            }
        }
    }

    negotiate_version(&seen, settings)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
