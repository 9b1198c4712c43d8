use bytes::Bytes;

use crate::commands::{as_string, Command};
use crate::frame::Frame;
use crate::Result;

/// Returns the cluster configuration as seen by the connected node.
///
/// Ref: <https://redis.io/docs/latest/commands/cluster-nodes>
#[derive(Debug, PartialEq)]
pub struct ClusterNodes;

impl Command for ClusterNodes {
    type Output = String;

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"CLUSTER"), Bytes::from_static(b"NODES")]
    }

    fn parse_reply(frame: Frame) -> Result<String> {
        Ok(as_string(frame)?)
    }
}
