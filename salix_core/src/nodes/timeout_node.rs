use crate::{FailureReason, Node, NodeError, Outcome, TickContext};
use async_trait::async_trait;
use std::time::Duration;

/// Races one child tick against a deadline.
///
/// Expiry drops the child's in-flight work (an outstanding leaf invocation
/// becomes an orphaned request whose late reply is discarded), resets the
/// child and yields a tagged failure. There is no retry.
#[derive(Debug)]
pub struct TimeoutNode {
    child: Box<dyn Node>,
    duration: Duration,
}

impl TimeoutNode {
    pub fn new(child: Box<dyn Node>, duration: Duration) -> Self {
        TimeoutNode { child, duration }
    }
}

#[async_trait]
impl Node for TimeoutNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        match tokio::time::timeout(self.duration, self.child.tick(ctx)).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                self.child.reset();
                Ok(Outcome::failure_with(FailureReason::Timeout))
            }
        }
    }

    fn reset(&mut self) {
        self.child.reset();
    }
}
