//! Line-oriented serial console monitor

use std::time::{Duration, Instant};

use regex::{Captures, Regex};
use tracing::info;

use crate::{
    board::ConsolePort,
    core::error::{ConsoleError, ConsoleResult},
};

const READ_CHUNK_SIZE: usize = 256;

/// A console line that matched a wait pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// Full decoded line, without the line terminator
    pub line: String,
    /// Capture groups; index 0 is the whole match
    pub groups: Vec<Option<String>>,
}

impl LineMatch {
    fn from_captures(line: &str, captures: &Captures<'_>) -> Self {
        Self {
            line: line.to_string(),
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// Text of capture group `index`, if it participated in the match
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }
}

/// Reads newline-delimited text from a console port
///
/// Bytes consumed from the port are gone; an incomplete trailing line is
/// kept for the next wait.
#[derive(Debug)]
pub struct SerialMonitor<P: ConsolePort> {
    port: P,
    pending: Vec<u8>,
}

impl<P: ConsolePort> SerialMonitor<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            pending: Vec::new(),
        }
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }

    /// Block until a line matches `pattern`
    ///
    /// The deadline runs from call entry and is not extended by incoming
    /// lines. Invalid UTF-8 is replaced rather than rejected.
    pub fn wait_for_line(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
        log_lines: bool,
    ) -> ConsoleResult<LineMatch> {
        let start = Instant::now();
        let timed_out = || ConsoleError::Timeout {
            pattern: pattern.as_str().to_string(),
            timeout,
        };

        loop {
            while let Some(line) = self.next_line() {
                if log_lines && !line.is_empty() {
                    info!(target: "console", "{}", line);
                }
                if start.elapsed() > timeout {
                    return Err(timed_out());
                }
                if let Some(captures) = pattern.captures(&line) {
                    return Ok(LineMatch::from_captures(&line, &captures));
                }
            }

            let remaining = timeout
                .checked_sub(start.elapsed())
                .filter(|remaining| !remaining.is_zero())
                .ok_or_else(timed_out)?;

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let n = self.port.read_bytes(&mut chunk, remaining)?;
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pop the next complete line from the pending buffer
    fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();

        let text = String::from_utf8_lossy(&raw);
        Some(text.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Release the underlying port
    pub fn into_inner(self) -> P {
        self.port
    }
}
