use crate::{Node, NodeError, Outcome, Status, TickContext};
use async_trait::async_trait;

/// Ticks the child up to `count` times serially within one outer tick.
///
/// Any failure propagates immediately; after `count` successes the node
/// succeeds. A running child is passed through with the completed-iteration
/// counter preserved, so the next outer tick resumes the remaining
/// iterations.
#[derive(Debug)]
pub struct RepeatNode {
    child: Box<dyn Node>,
    count: u32,
    completed: u32,
}

impl RepeatNode {
    pub fn new(child: Box<dyn Node>, count: u32) -> Self {
        RepeatNode {
            child,
            count,
            completed: 0,
        }
    }
}

#[async_trait]
impl Node for RepeatNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        while self.completed < self.count {
            let outcome = self.child.tick(ctx).await?;
            match outcome.status {
                Status::Running => return Ok(outcome),
                Status::Failure => {
                    self.completed = 0;
                    return Ok(outcome);
                }
                Status::Success => self.completed += 1,
            }
        }
        self.completed = 0;
        Ok(Outcome::success())
    }

    fn reset(&mut self) {
        self.completed = 0;
        self.child.reset();
    }
}
