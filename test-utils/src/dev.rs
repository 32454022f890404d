// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-test logging setup
//!
//! Each test gets its own log file in the temporary directory.  The file is
//! removed when the test declares success via
//! [`LogContext::cleanup_successful()`]; if the test panics first, the file
//! sticks around for debugging.

use camino::Utf8PathBuf;
use slog::Drain;
use slog::Logger;
use slog::o;

/// Log handle for a single test
///
/// Construct one with [`test_setup_log()`] at the top of the test and call
/// [`LogContext::cleanup_successful()`] as the last thing the test does.
pub struct LogContext {
    pub log: Logger,
    log_path: Option<Utf8PathBuf>,
}

impl LogContext {
    /// Removes the log file for this test
    ///
    /// This should be the final step of a successful test.  Tests that fail
    /// before reaching this point leave their log file behind.
    pub fn cleanup_successful(mut self) {
        if let Some(path) = self.log_path.take() {
            std::fs::remove_file(&path)
                .unwrap_or_else(|e| panic!("removing log file {path}: {e}"));
        }
    }
}

/// Set up a [`LogContext`] appropriate for a test named `test_name`
pub fn test_setup_log(test_name: &str) -> LogContext {
    let tempfile = camino_tempfile::Builder::new()
        .prefix(&format!("{test_name}."))
        .suffix(".log")
        .tempfile()
        .expect("creating test log file");
    let (file, path) = tempfile.keep().expect("keeping test log file");
    eprintln!("log file: {path}");

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let log = Logger::root(drain, o!("test" => test_name.to_string()));

    LogContext { log, log_path: Some(path) }
}
