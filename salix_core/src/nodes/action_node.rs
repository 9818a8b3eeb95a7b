use crate::{ContextEntry, Node, NodeError, Outcome, TickContext};
use async_trait::async_trait;

/// Leaf that evaluates a remotely registered action.
///
/// Every completed invocation updates the run context in place, timestamped
/// at completion. With `execute_once` set, a leaf that already terminated
/// with success is never invoked again; the node answers success without a
/// wire call.
#[derive(Debug)]
pub struct ActionNode {
    leaf: String,
    repeat: bool,
    repeat_count: u32,
    execute_once: bool,
}

impl ActionNode {
    pub fn new(leaf: impl Into<String>) -> Self {
        ActionNode {
            leaf: leaf.into(),
            repeat: false,
            repeat_count: 1,
            execute_once: false,
        }
    }

    /// Invoke up to `count` times per tick, failing fast.
    pub fn with_repeat(mut self, count: u32) -> Self {
        self.repeat = true;
        self.repeat_count = count;
        self
    }

    pub fn with_execute_once(mut self) -> Self {
        self.execute_once = true;
        self
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    async fn invoke_recorded(&self, ctx: &mut TickContext<'_>) -> Outcome {
        let outcome = match ctx.invoke(&self.leaf).await {
            Ok(v) => Outcome::from_bool(v),
            Err(e) => Outcome::failure_with(e.reason()),
        };
        ctx.context
            .update(ContextEntry::new(self.leaf.as_str(), outcome.status));
        outcome
    }
}

#[async_trait]
impl Node for ActionNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        if self.execute_once && ctx.context.has_completed(&self.leaf) {
            return Ok(Outcome::success());
        }
        if !self.repeat {
            return Ok(self.invoke_recorded(ctx).await);
        }
        for _ in 0..self.repeat_count.max(1) {
            let outcome = self.invoke_recorded(ctx).await;
            if outcome.is_failure() {
                return Ok(outcome);
            }
        }
        Ok(Outcome::success())
    }
}
