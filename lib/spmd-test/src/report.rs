// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Console report.
//!
//! Only the coordinator of a test writes report lines. Each line is flushed
//! as soon as it is written so the report interleaves sanely with anything
//! the test bodies print themselves.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

pub fn running_line(name: &str, size: usize) -> String {
    let plural = if size > 1 { "s" } else { "" };
    format!("[ RUNNING ] {name} ({size} proc{plural})")
}

pub fn success_line(name: &str) -> String {
    format!("[ SUCCESS ] {name}")
}

pub fn fail_line(name: &str) -> String {
    format!("[ FAIL    ] {name}")
}

pub fn launch_diagnostic(required: usize) -> String {
    format!("please launch with at least {required} procs!")
}

/// Line-oriented writer for the report.
pub struct Reporter {
    sink: Box<dyn Write + Send>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

impl Reporter {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// A reporter that drops everything; used on ranks that never coordinate.
    pub fn discard() -> Self {
        Self::new(io::sink())
    }

    /// A reporter writing into a shared in-memory buffer.
    pub fn capture() -> (Self, ReportBuffer) {
        let buffer = ReportBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    pub fn running(&mut self, name: &str, size: usize) -> io::Result<()> {
        self.line(&running_line(name, size))
    }

    pub fn success(&mut self, name: &str) -> io::Result<()> {
        self.line(&success_line(name))
    }

    /// A rendered failure message, exactly as received from its sender.
    pub fn failure(&mut self, message: &str) -> io::Result<()> {
        self.line(message)
    }

    pub fn fail(&mut self, name: &str) -> io::Result<()> {
        self.line(&fail_line(name))
    }

    pub fn insufficient_procs(&mut self, required: usize) -> io::Result<()> {
        self.line(&launch_diagnostic(required))
    }

    fn line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.sink, "{line}")?;
        self.sink.flush()
    }
}

/// Cloneable in-memory sink; every clone sees the same bytes.
#[derive(Debug, Clone, Default)]
pub struct ReportBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl ReportBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for ReportBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_line_pluralizes() {
        assert_eq!(running_line("serial_add", 1), "[ RUNNING ] serial_add (1 proc)");
        assert_eq!(running_line("add_test", 2), "[ RUNNING ] add_test (2 procs)");
    }

    #[test]
    fn test_outcome_lines() {
        assert_eq!(success_line("t"), "[ SUCCESS ] t");
        assert_eq!(fail_line("t"), "[ FAIL    ] t");
        assert_eq!(launch_diagnostic(4), "please launch with at least 4 procs!");
    }

    #[test]
    fn test_capture_collects_lines_in_order() {
        let (mut reporter, buffer) = Reporter::capture();
        reporter.running("t", 3).unwrap();
        reporter
            .failure("expect_true!(x) FAILED (on proc 2 line 9 of t.rs)\n    false is falsy")
            .unwrap();
        reporter.fail("t").unwrap();

        assert_eq!(
            buffer.lines(),
            vec![
                "[ RUNNING ] t (3 procs)",
                "expect_true!(x) FAILED (on proc 2 line 9 of t.rs)",
                "    false is falsy",
                "[ FAIL    ] t",
            ]
        );
    }

    #[test]
    fn test_discard_accepts_writes() {
        let mut reporter = Reporter::discard();
        reporter.success("quiet").unwrap();
    }
}
