use crate::{Node, NodeError, Outcome, Status, TickContext};
use async_trait::async_trait;

/// Ticks children left to right until one does not succeed.
///
/// A running child preserves the index, so the next outer tick resumes at
/// the same child. The first failure resets the index to 0 and propagates;
/// once every child has succeeded the index resets and the node succeeds.
#[derive(Debug)]
pub struct SequenceNode {
    children: Vec<Box<dyn Node>>,
    current_index: usize,
}

impl SequenceNode {
    pub fn new(children: Vec<Box<dyn Node>>) -> Self {
        SequenceNode {
            children,
            current_index: 0,
        }
    }
}

#[async_trait]
impl Node for SequenceNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        while self.current_index < self.children.len() {
            let outcome = self.children[self.current_index].tick(ctx).await?;
            match outcome.status {
                Status::Running => return Ok(outcome),
                Status::Failure => {
                    self.current_index = 0;
                    return Ok(outcome);
                }
                Status::Success => self.current_index += 1,
            }
        }
        self.current_index = 0;
        Ok(Outcome::success())
    }

    fn reset(&mut self) {
        self.current_index = 0;
        for child in &mut self.children {
            child.reset();
        }
    }
}
