//! The reply tree: an arena of nodes mirroring the nested structure of wire replies.
//!
//! Nodes are addressed by [`NodeId`]. Every node exclusively owns its children through the arena;
//! the parent link is a plain index and is never used for ownership.

use std::fmt;

use bytes::Bytes;

use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The value carried by one node.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyValue {
    Null,
    Error(String),
    Status(String),
    Bulk(Bytes),
    Integer(i64),
    /// A container: nested array replies and command nodes.
    Array,
}

/// Discriminant of a wire reply, remembered as the "last reply type" of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Null,
    Error,
    Status,
    Bulk,
    Integer,
    Array,
    Unknown,
}

impl ReplyKind {
    pub fn of(frame: &Frame) -> Self {
        match frame {
            Frame::Null => ReplyKind::Null,
            Frame::Error(_) => ReplyKind::Error,
            Frame::Simple(_) => ReplyKind::Status,
            Frame::Bulk(_) => ReplyKind::Bulk,
            Frame::Integer(_) => ReplyKind::Integer,
            Frame::Array(_) => ReplyKind::Array,
            Frame::Unknown(_) => ReplyKind::Unknown,
        }
    }
}

/// Who issued a command, used to classify it in the command log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Typed by the user.
    User,
    /// Issued by the driver itself.
    Inner,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandInfo {
    pub text: String,
    pub kind: CommandKind,
}

#[derive(Debug, Clone)]
pub struct ReplyNode {
    pub value: ReplyValue,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Present only on nodes that stand for a command invocation.
    pub command: Option<CommandInfo>,
}

#[derive(Debug, Clone)]
pub struct ReplyTree {
    nodes: Vec<ReplyNode>,
}

impl ReplyTree {
    /// Creates a tree whose root is a command node for `root_text`.
    pub fn new(root_text: impl Into<String>) -> Self {
        let root = ReplyNode {
            value: ReplyValue::Array,
            parent: None,
            children: Vec::new(),
            command: Some(CommandInfo {
                text: root_text.into(),
                kind: CommandKind::Inner,
            }),
        };

        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Adds a command node under `parent`. Replies to the command are appended below it.
    pub fn add_command(
        &mut self,
        parent: NodeId,
        text: impl Into<String>,
        kind: CommandKind,
    ) -> NodeId {
        let command = CommandInfo {
            text: text.into(),
            kind,
        };
        self.push(parent, ReplyValue::Array, Some(command))
    }

    pub fn append(&mut self, parent: NodeId, value: ReplyValue) -> NodeId {
        self.push(parent, value, None)
    }

    pub fn set_value(&mut self, id: NodeId, value: ReplyValue) {
        self.nodes[id.0].value = value;
    }

    pub fn node(&self, id: NodeId) -> &ReplyNode {
        &self.nodes[id.0]
    }

    pub fn value(&self, id: NodeId) -> &ReplyValue {
        &self.nodes[id.0].value
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn command(&self, id: NodeId) -> Option<&CommandInfo> {
        self.nodes[id.0].command.as_ref()
    }

    /// The first child of `id`, which for a command node is its (first) reply.
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].children.first().copied()
    }

    /// Scalar nodes below `id`, depth first, left to right.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            if !matches!(node.value, ReplyValue::Array) {
                leaves.push(current);
            }
            stack.extend(node.children.iter().rev());
        }

        leaves
    }

    pub fn leaf_count(&self, id: NodeId) -> usize {
        self.leaves(id).len()
    }

    /// Text of `id` and everything below it, siblings separated by `delimiter`.
    pub fn render(&self, id: NodeId, delimiter: &str) -> String {
        let node = &self.nodes[id.0];
        match node.value {
            ReplyValue::Array => node
                .children
                .iter()
                .map(|child| self.render(*child, delimiter))
                .collect::<Vec<_>>()
                .join(delimiter),
            ref value => value.to_string(),
        }
    }

    fn push(&mut self, parent: NodeId, value: ReplyValue, command: Option<CommandInfo>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ReplyNode {
            value,
            parent: Some(parent),
            children: Vec::new(),
            command,
        });
        self.nodes[parent.0].children.push(id);
        id
    }
}

impl ReplyValue {
    pub fn as_text(&self) -> Option<String> {
        match self {
            ReplyValue::Status(s) | ReplyValue::Error(s) => Some(s.clone()),
            ReplyValue::Bulk(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            ReplyValue::Integer(i) => Some(i.to_string()),
            ReplyValue::Null | ReplyValue::Array => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ReplyValue::Integer(i) => Some(*i),
            ReplyValue::Status(s) => s.parse().ok(),
            ReplyValue::Bulk(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ReplyValue::Error(_))
    }
}

impl fmt::Display for ReplyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyValue::Null => write!(f, "(nil)"),
            ReplyValue::Error(s) => write!(f, "(error) {}", s),
            ReplyValue::Status(s) => write!(f, "{}", s),
            ReplyValue::Bulk(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            ReplyValue::Integer(i) => write!(f, "{}", i),
            ReplyValue::Array => write!(f, "(array)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_and_children_links() {
        let mut tree = ReplyTree::new("root");
        let cmd = tree.add_command(tree.root(), "LRANGE l 0 -1", CommandKind::User);
        let array = tree.append(cmd, ReplyValue::Array);
        let a = tree.append(array, ReplyValue::Bulk(Bytes::from("a")));

        assert_eq!(tree.parent(a), Some(array));
        assert_eq!(tree.parent(array), Some(cmd));
        assert_eq!(tree.children(cmd), &[array]);
        assert_eq!(tree.command(cmd).unwrap().text, "LRANGE l 0 -1");
        assert!(tree.command(array).is_none());
    }

    #[test]
    fn leaves_are_depth_first_left_to_right() {
        let mut tree = ReplyTree::new("root");
        let cmd = tree.add_command(tree.root(), "X", CommandKind::Inner);
        let outer = tree.append(cmd, ReplyValue::Array);
        tree.append(outer, ReplyValue::Integer(1));
        let inner = tree.append(outer, ReplyValue::Array);
        tree.append(inner, ReplyValue::Integer(2));
        tree.append(inner, ReplyValue::Integer(3));
        tree.append(outer, ReplyValue::Integer(4));

        let values: Vec<_> = tree
            .leaves(cmd)
            .into_iter()
            .map(|id| tree.value(id).as_integer().unwrap())
            .collect();

        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn empty_array_has_no_leaves() {
        let mut tree = ReplyTree::new("root");
        let array = tree.append(tree.root(), ReplyValue::Array);

        assert_eq!(tree.leaf_count(array), 0);
    }

    #[test]
    fn render_with_delimiter() {
        let mut tree = ReplyTree::new("root");
        let cmd = tree.add_command(tree.root(), "MGET a b c", CommandKind::User);
        let array = tree.append(cmd, ReplyValue::Array);
        tree.append(array, ReplyValue::Bulk(Bytes::from("1")));
        tree.append(array, ReplyValue::Null);
        tree.append(array, ReplyValue::Error("ERR x".to_string()));

        assert_eq!(tree.render(cmd, "|"), "1|(nil)|(error) ERR x");
    }
}
