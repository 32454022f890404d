// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Waiting for the stop protocol to play out
//!
//! [`ShutdownCoordinator::wait`] is an explicit wait over exactly three
//! named event sources: a stop-request channel, a drain-progress watch, and
//! the hard-stop deadline.  No signal handlers, no globals; whichever source
//! fires first drives the [`ShutdownFsm`].

use crate::config::NodeConfig;
use crate::shutdown::{ShutdownEvent, ShutdownFsm, StopOutcome};
use slog::{Logger, info, o, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, sleep_until};

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("stop-request channel closed")]
    StopChannelClosed,
    #[error("drain-status channel closed while draining")]
    DrainChannelClosed,
}

pub struct ShutdownCoordinator {
    log: Logger,
    config: NodeConfig,
}

impl ShutdownCoordinator {
    pub fn new(log: &Logger, config: NodeConfig) -> Self {
        let log = log.new(o!(
            "component" => "shutdown-coordinator",
            "node" => config.name.clone(),
        ));
        ShutdownCoordinator { log, config }
    }

    /// Blocks until the node has stopped and reports how it stopped
    ///
    /// `stop_rx` delivers external stop requests; `drain_rx` reports the
    /// number of tasks still draining, where zero means the drain is
    /// complete.  The first stop request begins the drain; a second request
    /// or the configured deadline forces an immediate stop.
    pub async fn wait(
        &self,
        mut stop_rx: mpsc::Receiver<()>,
        mut drain_rx: watch::Receiver<usize>,
    ) -> Result<StopOutcome, ShutdownError> {
        let mut fsm = ShutdownFsm::new();

        if stop_rx.recv().await.is_none() {
            return Err(ShutdownError::StopChannelClosed);
        }
        let transitioned = fsm.on_event(ShutdownEvent::StopRequested);
        assert!(transitioned.is_none(), "first stop request cannot finish");
        info!(self.log, "initiating graceful shutdown");

        let deadline = Instant::now() + self.config.hard_stop_deadline;
        let mut progress = interval_at(
            Instant::now() + self.config.drain_poll_period,
            self.config.drain_poll_period,
        );

        loop {
            let draining = *drain_rx.borrow_and_update();
            if draining == 0 {
                if let Some(outcome) =
                    fsm.on_event(ShutdownEvent::DrainCompleted)
                {
                    return Ok(self.log_outcome(outcome));
                }
            }

            let event = tokio::select! {
                msg = stop_rx.recv() => match msg {
                    Some(()) => Some(ShutdownEvent::StopRequested),
                    None => return Err(ShutdownError::StopChannelClosed),
                },
                changed = drain_rx.changed() => match changed {
                    // Re-examined at the top of the loop.
                    Ok(()) => None,
                    Err(_) => {
                        return Err(ShutdownError::DrainChannelClosed);
                    }
                },
                _ = sleep_until(deadline) => {
                    Some(ShutdownEvent::DeadlineExpired)
                }
                _ = progress.tick() => {
                    info!(
                        self.log, "tasks still draining";
                        "tasks" => draining,
                    );
                    None
                }
            };
            if let Some(event) = event {
                if let Some(outcome) = fsm.on_event(event) {
                    return Ok(self.log_outcome(outcome));
                }
            }
        }
    }

    fn log_outcome(&self, outcome: StopOutcome) -> StopOutcome {
        match outcome {
            StopOutcome::Drained => {
                info!(self.log, "node drained and shutdown completed");
            }
            StopOutcome::SecondSignal => {
                warn!(
                    self.log,
                    "second stop request received, initiating hard shutdown"
                );
            }
            StopOutcome::DeadlineExceeded => {
                warn!(
                    self.log,
                    "drain time limit reached, initiating hard shutdown"
                );
            }
        }
        outcome
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ratchet_test_utils::dev::test_setup_log;
    use std::time::Duration;

    fn setup(
        log: &Logger,
    ) -> (
        ShutdownCoordinator,
        mpsc::Sender<()>,
        mpsc::Receiver<()>,
        watch::Sender<usize>,
        watch::Receiver<usize>,
    ) {
        let coordinator =
            ShutdownCoordinator::new(log, NodeConfig::new("test-node"));
        let (stop_tx, stop_rx) = mpsc::channel(2);
        let (drain_tx, drain_rx) = watch::channel(3usize);
        (coordinator, stop_tx, stop_rx, drain_tx, drain_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_drain() {
        let logctx = test_setup_log("graceful_drain");
        let (coordinator, stop_tx, stop_rx, drain_tx, drain_rx) =
            setup(&logctx.log);
        stop_tx.send(()).await.unwrap();
        drain_tx.send(0).unwrap();
        let outcome = coordinator.wait(stop_rx, drain_rx).await.unwrap();
        assert_eq!(outcome, StopOutcome::Drained);
        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_completes_after_progress() {
        let logctx = test_setup_log("drain_completes_after_progress");
        let (coordinator, stop_tx, stop_rx, drain_tx, drain_rx) =
            setup(&logctx.log);
        stop_tx.send(()).await.unwrap();
        let waiter = tokio::spawn(async move {
            coordinator.wait(stop_rx, drain_rx).await
        });
        // Let a couple of progress reports elapse before finishing the
        // drain.
        tokio::time::sleep(Duration::from_secs(12)).await;
        drain_tx.send(1).unwrap();
        drain_tx.send(0).unwrap();
        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome, StopOutcome::Drained);
        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn second_signal_forces_stop() {
        let logctx = test_setup_log("second_signal_forces_stop");
        let (coordinator, stop_tx, stop_rx, _drain_tx, drain_rx) =
            setup(&logctx.log);
        stop_tx.send(()).await.unwrap();
        stop_tx.send(()).await.unwrap();
        let outcome = coordinator.wait(stop_rx, drain_rx).await.unwrap();
        assert_eq!(outcome, StopOutcome::SecondSignal);
        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_forces_stop() {
        let logctx = test_setup_log("deadline_forces_stop");
        let (coordinator, stop_tx, stop_rx, _drain_tx, drain_rx) =
            setup(&logctx.log);
        stop_tx.send(()).await.unwrap();
        // Nothing ever drains; paused time fast-forwards to the deadline.
        let outcome = coordinator.wait(stop_rx, drain_rx).await.unwrap();
        assert_eq!(outcome, StopOutcome::DeadlineExceeded);
        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stop_channel_is_an_error() {
        let logctx = test_setup_log("closed_stop_channel_is_an_error");
        let (coordinator, stop_tx, stop_rx, _drain_tx, drain_rx) =
            setup(&logctx.log);
        drop(stop_tx);
        let err = coordinator.wait(stop_rx, drain_rx).await.unwrap_err();
        assert!(matches!(err, ShutdownError::StopChannelClosed));
        logctx.cleanup_successful();
    }
}
