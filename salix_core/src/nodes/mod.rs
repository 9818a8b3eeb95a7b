// Leaves
mod action_node;
pub use action_node::ActionNode;

mod condition_node;
pub use condition_node::ConditionNode;

// Composites
mod sequence_node;
pub use sequence_node::SequenceNode;

mod selector_node;
pub use selector_node::SelectorNode;

mod parallel_node;
pub use parallel_node::ParallelNode;

// Decorators
mod invert_node;
pub use invert_node::InvertNode;

mod repeat_node;
pub use repeat_node::RepeatNode;

mod timeout_node;
pub use timeout_node::TimeoutNode;

mod retry_node;
pub use retry_node::RetryNode;
