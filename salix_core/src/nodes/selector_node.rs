use crate::{Node, NodeError, Outcome, Status, TickContext};
use async_trait::async_trait;

/// Ticks children left to right until one succeeds.
///
/// The mirror image of [`crate::nodes::SequenceNode`]: success
/// short-circuits and resets the index, failure advances, running preserves
/// the index, exhaustion fails.
#[derive(Debug)]
pub struct SelectorNode {
    children: Vec<Box<dyn Node>>,
    current_index: usize,
}

impl SelectorNode {
    pub fn new(children: Vec<Box<dyn Node>>) -> Self {
        SelectorNode {
            children,
            current_index: 0,
        }
    }
}

#[async_trait]
impl Node for SelectorNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        while self.current_index < self.children.len() {
            let outcome = self.children[self.current_index].tick(ctx).await?;
            match outcome.status {
                Status::Running => return Ok(outcome),
                Status::Success => {
                    self.current_index = 0;
                    return Ok(outcome);
                }
                Status::Failure => self.current_index += 1,
            }
        }
        self.current_index = 0;
        Ok(Outcome::failure())
    }

    fn reset(&mut self) {
        self.current_index = 0;
        for child in &mut self.children {
            child.reset();
        }
    }
}
