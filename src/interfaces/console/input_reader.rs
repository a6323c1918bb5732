use crate::domain::workflow::KioskInput;
use crate::error::Result;
use std::borrow::Cow;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Typing this on its own line asks the kiosk to connect the printer.
pub const CONNECT_COMMAND: &str = "connect";

/// Reads kiosk inputs from a line-oriented source such as stdin.
///
/// A card reader in keyboard mode types the whole track followed by Enter, so
/// every non-blank line that is not a command is treated as swipe data.
/// Bytes that are not UTF-8 are replaced rather than rejected; such a line
/// never parses as a card, so a noisy reader cannot stop the kiosk.
pub struct InputReader<R> {
    source: R,
    buffer: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> InputReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            buffer: Vec::new(),
        }
    }

    /// The next input, or `None` at end of input.
    pub async fn next_input(&mut self) -> Result<Option<KioskInput>> {
        loop {
            self.buffer.clear();
            if self.source.read_until(b'\n', &mut self.buffer).await? == 0 {
                return Ok(None);
            }

            let line = String::from_utf8_lossy(&self.buffer);
            if let Cow::Owned(_) = line {
                warn!(bytes = self.buffer.len(), "input line is not valid UTF-8");
            }
            if let Some(input) = parse_line(&line) {
                return Ok(Some(input));
            }
        }
    }
}

pub fn parse_line(line: &str) -> Option<KioskInput> {
    let command = line.trim();
    if command.is_empty() {
        return None;
    }
    if command.eq_ignore_ascii_case(CONNECT_COMMAND) {
        return Some(KioskInput::RequestConnect);
    }
    Some(KioskInput::CardDataReceived(
        line.trim_end_matches(['\r', '\n']).to_string(),
    ))
}
