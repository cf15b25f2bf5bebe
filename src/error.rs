use thiserror::Error;

use crate::{graph::Node, host::HostError};

/// Engine errors.
///
/// The engine validates almost nothing itself. Apart from host rejections,
/// the only failures are asking a node for something it cannot do and using
/// a handle that no longer points at a live node.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("{0:?} does not exist (it may have been collected)")]
    UnknownNode(Node),
    #[error("{node:?} does not support `{operation}`")]
    Unsupported {
        node: Node,
        operation: &'static str,
    },
    #[error("{node:?} has no parameter `{name}`")]
    UnknownParam { node: Node, name: String },
    #[error("parameter `{0}` has no drive node and cannot be connected")]
    ParamNotConnectable(String),
    #[error("the host has no factory `{0}`")]
    UnknownFactory(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
