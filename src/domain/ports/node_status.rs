/// Health/discovery status of the local node.
pub trait NodeStatusProvider: Send + Sync {
    fn is_node_enabled(&self) -> bool;
}
