//! Turns declarative structures into executable node graphs.
//!
//! Leaf names are resolved against the registry at build time, so a tree
//! referencing an unregistered callable is rejected before it is stored.
//! The build is atomic: the caller only ever stores a fully built root.

use crate::protocol::{ApiError, NodeSpec};
use crate::registry::{LeafKind, LeafRegistry};
use salix_core::nodes::{
    ActionNode, ConditionNode, InvertNode, ParallelNode, RepeatNode, RetryNode, SelectorNode,
    SequenceNode, TimeoutNode,
};
use salix_core::Node;
use std::time::Duration;

pub fn build_node(spec: &NodeSpec, registry: &LeafRegistry) -> Result<Box<dyn Node>, ApiError> {
    match spec {
        NodeSpec::Action {
            action,
            repeat,
            repeat_count,
            execute_once,
        } => {
            if !registry.contains(action, LeafKind::Action) {
                return Err(ApiError::UnknownLeaf(action.clone()));
            }
            if *repeat && *repeat_count < 1 {
                return Err(ApiError::Schema(format!(
                    "repeat_count for '{action}' must be at least 1"
                )));
            }
            let mut node = ActionNode::new(action);
            if *repeat {
                node = node.with_repeat(*repeat_count);
            }
            if *execute_once {
                node = node.with_execute_once();
            }
            Ok(Box::new(node))
        }
        NodeSpec::Condition { condition } => {
            if !registry.contains(condition, LeafKind::Condition) {
                return Err(ApiError::UnknownLeaf(condition.clone()));
            }
            Ok(Box::new(ConditionNode::new(condition)))
        }
        NodeSpec::Sequence { children } => Ok(Box::new(SequenceNode::new(build_children(
            "SequenceNode",
            children,
            registry,
        )?))),
        NodeSpec::Selector { children } => Ok(Box::new(SelectorNode::new(build_children(
            "SelectorNode",
            children,
            registry,
        )?))),
        NodeSpec::Parallel {
            children,
            success_threshold,
        } => {
            let built = build_children("ParallelNode", children, registry)?;
            if *success_threshold < 1 || *success_threshold > built.len() {
                return Err(ApiError::Schema(format!(
                    "success_threshold {success_threshold} out of range 1..={}",
                    built.len()
                )));
            }
            Ok(Box::new(ParallelNode::new(built, *success_threshold)))
        }
        NodeSpec::Invert { child } => Ok(Box::new(InvertNode::new(build_node(child, registry)?))),
        NodeSpec::Repeat { child, count } => {
            if *count < 1 {
                return Err(ApiError::Schema(
                    "repeat count must be at least 1".to_string(),
                ));
            }
            Ok(Box::new(RepeatNode::new(build_node(child, registry)?, *count)))
        }
        NodeSpec::Timeout { child, timeout_ms } => {
            if *timeout_ms == 0 {
                return Err(ApiError::Schema(
                    "timeout_ms must be positive".to_string(),
                ));
            }
            Ok(Box::new(TimeoutNode::new(
                build_node(child, registry)?,
                Duration::from_millis(*timeout_ms),
            )))
        }
        NodeSpec::RepeatUntilSuccess { child, max_retries } => {
            if *max_retries < 1 {
                return Err(ApiError::Schema(
                    "max_retries must be at least 1".to_string(),
                ));
            }
            Ok(Box::new(RetryNode::new(
                build_node(child, registry)?,
                *max_retries,
            )))
        }
    }
}

fn build_children(
    what: &str,
    children: &[NodeSpec],
    registry: &LeafRegistry,
) -> Result<Vec<Box<dyn Node>>, ApiError> {
    if children.is_empty() {
        return Err(ApiError::Schema(format!("{what} requires children")));
    }
    children
        .iter()
        .map(|child| build_node(child, registry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;
    use crate::SessionId;

    fn registry() -> LeafRegistry {
        let registry = LeafRegistry::new();
        let s = SessionId::new();
        registry.register("greet", LeafKind::Action, s).unwrap();
        registry.register("ready", LeafKind::Condition, s).unwrap();
        registry
    }

    fn action(name: &str) -> NodeSpec {
        NodeSpec::Action {
            action: name.to_string(),
            repeat: false,
            repeat_count: 1,
            execute_once: false,
        }
    }

    #[test]
    fn resolves_registered_leaves() {
        let registry = registry();
        let spec = NodeSpec::Sequence {
            children: vec![
                action("greet"),
                NodeSpec::Condition {
                    condition: "ready".to_string(),
                },
            ],
        };
        assert!(build_node(&spec, &registry).is_ok());
    }

    #[test]
    fn unknown_leaf_is_rejected() {
        let registry = registry();
        let err = build_node(&action("ghost"), &registry).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownLeaf);
    }

    #[test]
    fn kind_mismatch_is_unknown_leaf() {
        let registry = registry();
        // "ready" exists, but not as an action.
        let err = build_node(&action("ready"), &registry).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownLeaf);
    }

    #[test]
    fn empty_composite_is_schema_error() {
        let registry = registry();
        let err = build_node(&NodeSpec::Sequence { children: vec![] }, &registry).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemaError);
    }

    #[test]
    fn parallel_threshold_bounds() {
        let registry = registry();
        for threshold in [0usize, 3] {
            let spec = NodeSpec::Parallel {
                children: vec![action("greet"), action("greet")],
                success_threshold: threshold,
            };
            let err = build_node(&spec, &registry).unwrap_err();
            assert_eq!(err.code(), ErrorCode::SchemaError);
        }
        let spec = NodeSpec::Parallel {
            children: vec![action("greet"), action("greet")],
            success_threshold: 2,
        };
        assert!(build_node(&spec, &registry).is_ok());
    }

    #[test]
    fn decorator_bounds() {
        let registry = registry();
        let err = build_node(
            &NodeSpec::Timeout {
                child: Box::new(action("greet")),
                timeout_ms: 0,
            },
            &registry,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemaError);

        let err = build_node(
            &NodeSpec::Repeat {
                child: Box::new(action("greet")),
                count: 0,
            },
            &registry,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemaError);

        let err = build_node(
            &NodeSpec::RepeatUntilSuccess {
                child: Box::new(action("greet")),
                max_retries: 0,
            },
            &registry,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemaError);
    }
}
