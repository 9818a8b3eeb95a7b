use crate::{ContextEntry, Node, NodeError, Outcome, TickContext};
use async_trait::async_trait;

/// Leaf that evaluates a remotely registered predicate.
#[derive(Debug)]
pub struct ConditionNode {
    leaf: String,
}

impl ConditionNode {
    pub fn new(leaf: impl Into<String>) -> Self {
        ConditionNode { leaf: leaf.into() }
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }
}

#[async_trait]
impl Node for ConditionNode {
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError> {
        let outcome = match ctx.invoke(&self.leaf).await {
            Ok(v) => Outcome::from_bool(v),
            Err(e) => Outcome::failure_with(e.reason()),
        };
        ctx.context
            .update(ContextEntry::new(self.leaf.as_str(), outcome.status));
        Ok(outcome)
    }
}
