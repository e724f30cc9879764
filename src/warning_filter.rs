// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Drops known-benign validation noise that the upstream Claude SDK writes
//! to its stderr passthrough before it reaches the host's log stream.

use std::io::{self, Write};
use std::sync::Mutex;

const BENIGN_SUBSTRINGS: &[&str] =
    &["Failed to validate", "validation error", "Input should be", "pydantic"];

/// Wraps any `Write` target (stderr, a log file) and filters it line by
/// line: a buffered line matching a known-benign substring is dropped
/// rather than forwarded, everything else passes through unchanged.
pub struct WarningFilterWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write> WarningFilterWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: Mutex::new(inner) }
    }
}

fn is_benign(line: &str) -> bool {
    BENIGN_SUBSTRINGS.iter().any(|pattern| line.contains(pattern))
}

impl<W: Write> Write for WarningFilterWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        if is_benign(&text) {
            return Ok(buf.len());
        }
        let mut inner = self.inner.lock().unwrap();
        inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().unwrap().flush()
    }
}

/// `tracing_subscriber::fmt::MakeWriter` needs a fresh writer per event;
/// cloning just shares the same locked inner sink.
impl<'a, W: Write> tracing_subscriber::fmt::MakeWriter<'a> for WarningFilterWriter<W> {
    type Writer = SharedFilterWriter<'a, W>;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFilterWriter { filter: self }
    }
}

pub struct SharedFilterWriter<'a, W> {
    filter: &'a WarningFilterWriter<W>,
}

impl<'a, W: Write> Write for SharedFilterWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        if is_benign(&text) {
            return Ok(buf.len());
        }
        let mut inner = self.filter.inner.lock().unwrap();
        inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.filter.inner.lock().unwrap().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_lines_matching_benign_patterns() {
        let sink: Vec<u8> = Vec::new();
        let mut writer = WarningFilterWriter::new(sink);
        writer.write_all(b"Failed to validate tool input: extra field\n").unwrap();
        writer.write_all(b"real error: connection reset\n").unwrap();
        let sink = writer.inner.into_inner().unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(!text.contains("Failed to validate"));
        assert!(text.contains("real error"));
    }

    #[test]
    fn passes_through_when_nothing_matches() {
        let sink: Vec<u8> = Vec::new();
        let mut writer = WarningFilterWriter::new(sink);
        writer.write_all(b"agent started on pane 1\n").unwrap();
        let sink = writer.inner.into_inner().unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), "agent started on pane 1\n");
    }
}
