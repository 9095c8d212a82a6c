//! The main CLI logic.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use anyhow::Result;
use clap::Parser;
use rpm_verify::cli::Opt;
use std::io::Write;
use termcolor::WriteColor;
use tracing_subscriber::EnvFilter;

/// The real main function returns a `Result<>`.
fn inner_main() -> Result<()> {
    let opt = Opt::parse();
    // Log to stderr; RUST_LOG overrides the default level.
    let default_level = if opt.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::trace!("starting");
    opt.run()
}

fn print_error(e: anyhow::Error) {
    let msg = format!("{:#}", e);
    // Print the error: prefix in red if we're on a tty
    let stderr = termcolor::BufferWriter::stderr(termcolor::ColorChoice::Auto);
    let stderrbuf = {
        let mut stderrbuf = stderr.buffer();
        let _ =
            stderrbuf.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Red)));
        let _ = write!(&mut stderrbuf, "error: ");
        let _ = stderrbuf.reset();
        let _ = writeln!(&mut stderrbuf, "{}", msg);
        stderrbuf
    };
    let _ = stderr.print(&stderrbuf);
}

fn main() {
    // NOTE!  Don't add new code here.  Only add new code into `inner_main()`.
    match inner_main() {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            print_error(e);
            std::process::exit(1)
        }
    }
}
