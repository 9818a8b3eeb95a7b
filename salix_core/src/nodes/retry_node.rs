use crate::{Node, NodeError, Outcome, Status, TickContext};
use async_trait::async_trait;

/// Ticks the child up to `max_retries` times serially; the first success
/// wins, exhaustion fails.
///
/// A running child is passed through with the attempt counter preserved.
#[derive(Debug)]
pub struct RetryNode {
    child: Box<dyn Node>,
    max_retries: u32,
    attempts: u32,
}

impl RetryNode {
    pub fn new(child: Box<dyn Node>, max_retries: u32) -> Self {
        RetryNode {
            child,
            max_retries,
            attempts: 0,
        }
    }
}

#[async_trait]
impl Node for RetryNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        let mut last = Outcome::failure();
        while self.attempts < self.max_retries {
            let outcome = self.child.tick(ctx).await?;
            match outcome.status {
                Status::Running => return Ok(outcome),
                Status::Success => {
                    self.attempts = 0;
                    return Ok(outcome);
                }
                Status::Failure => {
                    self.attempts += 1;
                    last = outcome;
                }
            }
        }
        self.attempts = 0;
        Ok(last)
    }

    fn reset(&mut self) {
        self.attempts = 0;
        self.child.reset();
    }
}
