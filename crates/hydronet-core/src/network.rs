//! The network context: one node registry and one element registry.

use log::debug;

use crate::devices::{Elements, Member, Nodes};
use crate::element::{Element, ElementSpec};
use crate::error::Result;
use crate::node::{Node, NodeSpec};
use crate::registry::Registry;

/// A network of nodes and elements.
///
/// Every device name is unique per kind within one network. Separate
/// networks never share devices.
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: Registry<Node>,
    elements: Registry<Element>,
}

impl Network {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the node named `name`.
    pub fn node(&self, name: &str) -> Result<Node> {
        self.nodes.get_or_create(name)
    }

    /// Get or create a node with an explicit variable and keywords.
    pub fn build_node(&self, spec: NodeSpec) -> Result<Node> {
        self.nodes.build_node(spec)
    }

    /// Get or create the element named `name`, without connections.
    pub fn element(&self, name: &str) -> Result<Element> {
        self.elements.get_or_create(name)
    }

    /// Get or create an element and connect it to the nodes of `spec`.
    pub fn build_element(&self, spec: ElementSpec) -> Result<Element> {
        self.elements.build_element(&self.nodes, spec)
    }

    /// A `Nodes` container built from names, nodes and other containers.
    pub fn nodes<I, M>(&self, members: I) -> Result<Nodes>
    where
        I: IntoIterator<Item = M>,
        M: Into<Member<Node>>,
    {
        Nodes::from_members(&self.nodes, members)
    }

    /// An `Elements` container built from names, elements and other
    /// containers.
    pub fn elements<I, M>(&self, members: I) -> Result<Elements>
    where
        I: IntoIterator<Item = M>,
        M: Into<Member<Element>>,
    {
        Elements::from_members(&self.elements, members)
    }

    /// All registered nodes.
    pub fn registered_nodes(&self) -> Nodes {
        self.nodes.snapshot()
    }

    /// All registered elements.
    pub fn registered_elements(&self) -> Elements {
        self.elements.snapshot()
    }

    /// Nodes requested since the last call.
    pub fn gather_new_nodes(&self) -> Nodes {
        self.nodes.gather_new()
    }

    /// Elements requested since the last call.
    pub fn gather_new_elements(&self) -> Elements {
        self.elements.gather_new()
    }

    pub fn node_registry(&self) -> &Registry<Node> {
        &self.nodes
    }

    pub fn element_registry(&self) -> &Registry<Element> {
        &self.elements
    }

    /// Forget every device. Existing handles stay usable but are no longer
    /// returned for their names.
    pub fn clear(&self) {
        self.elements.clear();
        self.nodes.clear();
        debug!("cleared network");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    #[test]
    fn test_identity_and_clear() {
        let network = Network::new();
        let n1 = network.node("n1").unwrap();
        assert!(n1.ptr_eq(&network.node("n1").unwrap()));

        network.clear();
        let n2 = network.node("n1").unwrap();
        assert!(!n1.ptr_eq(&n2));
        assert_eq!(n1, n2);
    }

    #[test]
    fn test_networks_are_independent() {
        let first = Network::new();
        let second = Network::new();
        first.node("n").unwrap();
        assert!(second.node_registry().is_empty());
        assert!(!first.node("n").unwrap().ptr_eq(&second.node("n").unwrap()));
    }

    #[test]
    fn test_gather_new() {
        let network = Network::new();
        network.node("a").unwrap();
        network
            .build_element(ElementSpec::new("e").inlets("b"))
            .unwrap();

        let new_nodes = network.gather_new_nodes();
        assert_eq!(new_nodes.names(), vec!["a", "b"]);
        assert!(network.gather_new_nodes().is_empty());
        assert_eq!(network.gather_new_elements().names(), vec!["e"]);

        // Touching an existing node marks it as new again.
        network.node("a").unwrap();
        assert_eq!(network.gather_new_nodes().names(), vec!["a"]);
        assert_eq!(network.registered_nodes().len(), 2);
    }

    #[test]
    fn test_containers_share_devices() {
        let network = Network::new();
        let nodes = network.nodes(["a", "b"]).unwrap();
        let elements = network.elements(["e1", "e2"]).unwrap();
        assert!(nodes.get("a").unwrap().ptr_eq(&network.node("a").unwrap()));
        assert_eq!(elements.to_string(), r#"Elements("e1", "e2")"#);
        assert_eq!(network.registered_elements(), elements);
    }
}
