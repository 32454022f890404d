// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use clap::Parser;
use slog::Drain;
use slog_error_chain::InlineErrorChain;

mod config;
mod dispatch;

fn main() {
    let app = dispatch::RatchetApp::parse();
    let log = setup_log();
    if let Err(err) = app.exec(&log) {
        slog::error!(
            log, "command failed";
            "error" => %InlineErrorChain::new(&*err),
        );
        drop(log);
        std::process::exit(1);
    }
}

/// Terminal logger honoring `RUST_LOG`, info level by default
fn setup_log() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let mut builder = slog_envlogger::LogBuilder::new(drain);
    builder = match std::env::var("RUST_LOG") {
        Ok(s) => builder.parse(&s),
        Err(_) => builder.filter(None, slog::FilterLevel::Info),
    };
    let drain = slog_async::Async::new(builder.build()).build().fuse();
    slog::Logger::root(drain, slog::o!())
}
