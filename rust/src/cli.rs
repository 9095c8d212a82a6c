// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command line parsing.

use crate::builtins::verify::VerifyOpts;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "rpm-verify", version)]
#[clap(about = "Verify the RPMs pinned in a Bazel WORKSPACE against repository GPG keys")]
pub struct Opt {
    /// Log progress (`RUST_LOG` takes precedence)
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verify the signature and sha256 of every rpm() rule
    Verify(VerifyOpts),
}

impl Opt {
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Verify(opts) => crate::builtins::verify::entrypoint(opts),
        }
    }
}
