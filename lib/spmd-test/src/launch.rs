// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Entry points.
//!
//! Each process builds its own registry by calling the registration function
//! before the driver starts. The registration function must not communicate
//! and must register the same cases in the same order on every process.

use std::process::ExitCode;

use anyhow::Context;
use spmd_comm::{CommError, Communicator, LocalWorld, Rank};
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::driver::{Driver, RunSummary};
use crate::{HarnessError, Registry, Reporter};

/// Run `registry` on an existing world communicator.
pub fn run_on(
    world: &dyn Communicator,
    registry: Registry,
    config: &HarnessConfig,
    reporter: Reporter,
) -> Result<RunSummary, HarnessError> {
    Driver::new(registry, config, reporter).run(world)
}

/// Run on a fresh local world of `procs` ranks; rank 0 reports to stdout.
///
/// Returns one summary per rank, in rank order.
pub fn run_local<R>(
    procs: usize,
    register: R,
    config: &HarnessConfig,
) -> Result<Vec<RunSummary>, HarnessError>
where
    R: Fn(&mut Registry) + Sync,
{
    run_local_with(procs, register, config, |rank| {
        if rank == 0 {
            Reporter::stdout()
        } else {
            Reporter::discard()
        }
    })
}

/// [`run_local`] with a caller-chosen reporter per rank.
///
/// A rank whose run fails aborts the world so its peers stop waiting on it.
/// The error returned is the first failure that is not such an abort.
pub fn run_local_with<R, P>(
    procs: usize,
    register: R,
    config: &HarnessConfig,
    reporter_for: P,
) -> Result<Vec<RunSummary>, HarnessError>
where
    R: Fn(&mut Registry) + Sync,
    P: Fn(Rank) -> Reporter + Sync,
{
    let results = LocalWorld::run(procs, |world| {
        let registry = Registry::from_fn(&register);
        let reporter = reporter_for(world.rank());
        let result = run_on(world.as_ref(), registry, config, reporter);
        if let Err(error) = &result {
            warn!(rank = world.rank(), %error, "rank failed, aborting world");
            world.abort();
        }
        result
    })?;

    let mut summaries = Vec::with_capacity(results.len());
    let mut failure: Option<HarnessError> = None;
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(error) => {
                let root_cause = failure
                    .as_ref()
                    .is_none_or(|current| is_abort(current) && !is_abort(&error));
                if root_cause {
                    failure = Some(error);
                }
            }
        }
    }
    match failure {
        Some(error) => Err(error),
        None => Ok(summaries),
    }
}

fn is_abort(error: &HarnessError) -> bool {
    matches!(
        error,
        HarnessError::Transport(CommError::WorldAborted { .. })
    )
}

/// Complete `main` for a local-world test binary: logging, configuration,
/// run and exit status.
pub fn main_local<R>(procs: usize, register: R) -> ExitCode
where
    R: Fn(&mut Registry) + Sync,
{
    crate::logging::init();
    match try_main_local(procs, register) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main_local<R>(procs: usize, register: R) -> anyhow::Result<u8>
where
    R: Fn(&mut Registry) + Sync,
{
    let config = HarnessConfig::from_env().context("loading harness configuration")?;
    let summaries = run_local(procs, register, &config)
        .with_context(|| format!("running test suite on {procs} local ranks"))?;
    let coordinator = summaries
        .first()
        .context("local world produced no summaries")?;
    info!(status = ?coordinator.status, "suite finished");
    Ok(coordinator.exit_code(config.strict_exit))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::expect_eq;

    fn suite(registry: &mut Registry) {
        registry.register("sizes", [1, 2], |ctx| {
            expect_eq!(ctx, ctx.size(), 1);
        });
    }

    #[test]
    fn test_exit_status_follows_strict_flag() {
        temp_env::with_vars(
            [
                (crate::config::CONFIG_PATH_ENV, None),
                ("SPMD_TEST_MESSAGE_SIZE", None),
                ("SPMD_TEST_STRICT_EXIT", Some("false")),
            ],
            || assert_eq!(try_main_local(2, suite).unwrap(), 0),
        );
        temp_env::with_vars(
            [
                (crate::config::CONFIG_PATH_ENV, None),
                ("SPMD_TEST_MESSAGE_SIZE", None),
                ("SPMD_TEST_STRICT_EXIT", Some("true")),
            ],
            || assert_eq!(try_main_local(2, suite).unwrap(), 1),
        );
    }

    #[test]
    fn test_small_world_exits_cleanly_even_when_strict() {
        temp_env::with_vars(
            [
                (crate::config::CONFIG_PATH_ENV, None),
                ("SPMD_TEST_MESSAGE_SIZE", None),
                ("SPMD_TEST_STRICT_EXIT", Some("true")),
            ],
            || assert_eq!(try_main_local(1, suite).unwrap(), 0),
        );
    }

    /// Accepts `lines` complete lines, then fails every write.
    struct ClosedAfter {
        lines: usize,
    }

    impl io::Write for ClosedAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.lines == 0 {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            let newlines = buf.iter().filter(|&&b| b == b'\n').count();
            self.lines -= newlines.min(self.lines);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run on a helper thread so a wedged world fails the test instead of
    /// hanging it.
    fn within_deadline<T: Send + 'static>(run: impl FnOnce() -> T + Send + 'static) -> T {
        let (tx, rx) = flume::bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(run());
        });
        rx.recv_timeout(Duration::from_secs(30))
            .expect("local world did not shut down")
    }

    #[rstest]
    #[case::before_any_report(0, 0)]
    #[case::while_collecting_failures(1, 2)]
    fn test_report_error_on_coordinator_aborts_world(
        #[case] lines: usize,
        #[case] peer_failures: usize,
    ) {
        let result = within_deadline(move || {
            let register = move |registry: &mut Registry| {
                registry.register("t", [2], move |ctx| {
                    if ctx.rank() == 1 {
                        for attempt in 0..peer_failures {
                            expect_eq!(ctx, attempt, usize::MAX);
                        }
                    }
                });
            };
            run_local_with(2, register, &HarnessConfig::default(), move |rank| {
                if rank == 0 {
                    Reporter::new(ClosedAfter { lines })
                } else {
                    Reporter::discard()
                }
            })
        });

        match result {
            Err(HarnessError::Report(error)) => assert_eq!(error.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected the coordinator's write error, got {other:?}"),
        }
    }

    #[test]
    fn test_abort_echoes_do_not_mask_root_cause() {
        let echo = HarnessError::Transport(CommError::WorldAborted { origin: 0 });
        let root = HarnessError::Report(io::ErrorKind::BrokenPipe.into());
        assert!(is_abort(&echo));
        assert!(!is_abort(&root));
    }

    #[test]
    fn test_empty_world_is_an_error() {
        let result = run_local(0, suite, &HarnessConfig::default());
        assert!(matches!(
            result,
            Err(HarnessError::Transport(spmd_comm::CommError::EmptyWorld))
        ));
    }
}
