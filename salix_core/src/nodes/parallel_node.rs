use crate::{Node, NodeError, Outcome, Status, TickContext};
use async_trait::async_trait;

/// Ticks every child in listed order within one outer tick and applies a
/// success threshold.
///
/// With `n` children and threshold `k`: success once `k` children succeed,
/// failure once more than `n - k` children fail (success is no longer
/// reachable), running otherwise. Children are evaluated sequentially and a
/// running child does not stop the sweep; across outer ticks each child's
/// own resumption state is preserved.
#[derive(Debug)]
pub struct ParallelNode {
    children: Vec<Box<dyn Node>>,
    success_threshold: usize,
}

impl ParallelNode {
    pub fn new(children: Vec<Box<dyn Node>>, success_threshold: usize) -> Self {
        ParallelNode {
            children,
            success_threshold,
        }
    }
}

#[async_trait]
impl Node for ParallelNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        let n = self.children.len();
        let mut successes = 0usize;
        let mut failures = 0usize;

        for child in &mut self.children {
            match child.tick(ctx).await?.status {
                Status::Success => successes += 1,
                Status::Failure => failures += 1,
                Status::Running => {}
            }
        }

        let failure_threshold = n.saturating_sub(self.success_threshold);
        let outcome = if successes >= self.success_threshold {
            Outcome::success()
        } else if failures > failure_threshold {
            Outcome::failure()
        } else {
            return Ok(Outcome::running());
        };

        // Terminal sweep; drop any half-finished child state.
        for child in &mut self.children {
            child.reset();
        }
        Ok(outcome)
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
    }
}
