// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use spmd_test::{HarnessConfig, logging};

mod arrays;
mod suite;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of ranks in the local world
    #[arg(short = 'n', long, env = "SPMD_DEMO_PROCS", default_value_t = 4)]
    procs: usize,

    /// Exit with status 1 when any test failed
    #[arg(long, default_value = "false")]
    strict: bool,
}

fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();

    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<u8> {
    let mut figment = HarnessConfig::figment();
    if args.strict {
        figment = figment.merge(("strict_exit", true));
    }
    let config = HarnessConfig::extract_from(figment).context("loading harness configuration")?;
    tracing::debug!(procs = args.procs, ?config, "starting demo suite");

    let summaries = spmd_test::run_local(args.procs, suite::register, &config)
        .with_context(|| format!("running demo suite on {} local ranks", args.procs))?;
    let coordinator = summaries
        .first()
        .context("local world produced no summaries")?;
    Ok(coordinator.exit_code(config.strict_exit))
}
