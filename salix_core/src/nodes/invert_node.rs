use crate::{Node, NodeError, Outcome, Status, TickContext};
use async_trait::async_trait;

/// Swaps the child's success and failure; running passes through.
#[derive(Debug)]
pub struct InvertNode {
    child: Box<dyn Node>,
}

impl InvertNode {
    pub fn new(child: Box<dyn Node>) -> Self {
        InvertNode { child }
    }
}

#[async_trait]
impl Node for InvertNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        let outcome = self.child.tick(ctx).await?;
        Ok(match outcome.status {
            Status::Success => Outcome::failure(),
            Status::Failure => Outcome::success(),
            Status::Running => outcome,
        })
    }

    fn reset(&mut self) {
        self.child.reset();
    }
}
