//! Drives a tree's root to a terminal outcome.

use crate::{Context, FailureReason, LeafInvoker, Node, NodeError, Outcome, TickContext};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tick the root until the outcome is no longer running.
///
/// Outer ticks are separated by `tick_interval`, which gives remote leaves
/// reported as running a breather instead of a hot loop. Cancellation is
/// observed before every tick and during the sleep; the leaves themselves
/// observe it at their own suspension points, so a cancelled run terminates
/// with a tagged failure either way.
pub async fn run_to_completion(
    root: &mut Box<dyn Node>,
    context: &mut Context,
    invoker: &dyn LeafInvoker,
    cancel: &CancellationToken,
    tick_interval: Duration,
) -> Result<Outcome, NodeError> {
    loop {
        if cancel.is_cancelled() {
            return Ok(Outcome::failure_with(FailureReason::Cancelled));
        }
        let outcome = {
            let mut ctx = TickContext::new(context, invoker, cancel);
            root.tick(&mut ctx).await?
        };
        if !outcome.is_running() {
            return Ok(outcome);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(Outcome::failure_with(FailureReason::Cancelled));
            }
            _ = tokio::time::sleep(tick_interval) => {}
        }
    }
}
