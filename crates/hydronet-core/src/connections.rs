//! Directional connections between nodes and elements.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::device::{AsDeviceName, Device};
use crate::element::ElementInner;
use crate::error::{Error, Result};
use crate::node::NodeInner;

/// The role a connection plays for its owning device.
///
/// Elements own the first four roles; nodes own `Entries` and `Exits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Nodes an element takes its input from.
    Inlets,
    /// Nodes an element passes its output to.
    Outlets,
    /// Nodes an element reads auxiliary information from.
    Receivers,
    /// Nodes an element sends auxiliary information to.
    Senders,
    /// Elements delivering values into a node.
    Entries,
    /// Elements taking values out of a node.
    Exits,
}

impl Role {
    /// The four roles of an element, in canonical order.
    pub const ELEMENT_ROLES: [Role; 4] = [Role::Inlets, Role::Outlets, Role::Receivers, Role::Senders];

    /// Lower-case role name, e.g. `inlets`.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Inlets => "inlets",
            Role::Outlets => "outlets",
            Role::Receivers => "receivers",
            Role::Senders => "senders",
            Role::Entries => "entries",
            Role::Exits => "exits",
        }
    }

    /// Singular noun with article, e.g. "an inlet".
    pub fn noun(self) -> &'static str {
        match self {
            Role::Inlets => "an inlet",
            Role::Outlets => "an outlet",
            Role::Receivers => "a receiver",
            Role::Senders => "a sender",
            Role::Entries => "an entry",
            Role::Exits => "an exit",
        }
    }

    /// The mutually exclusive counterpart of this role.
    pub fn opposite(self) -> Role {
        match self {
            Role::Inlets => Role::Outlets,
            Role::Outlets => Role::Inlets,
            Role::Receivers => Role::Senders,
            Role::Senders => Role::Receivers,
            Role::Entries => Role::Exits,
            Role::Exits => Role::Entries,
        }
    }

    /// The node-side role mirroring an element role.
    ///
    /// Inlets and receivers take values out of a node, so the element is one
    /// of the node's exits; outlets and senders feed the node's entries.
    pub fn mirror(self) -> Role {
        match self {
            Role::Inlets | Role::Receivers => Role::Exits,
            Role::Outlets | Role::Senders => Role::Entries,
            Role::Entries => Role::Outlets,
            Role::Exits => Role::Inlets,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Back reference from a connection set to its owning device.
pub(crate) enum Master {
    Node(Weak<NodeInner>),
    Element(Weak<ElementInner>),
}

impl Master {
    fn name(&self) -> String {
        let name = match self {
            Master::Node(node) => node.upgrade().map(|n| n.core.name()),
            Master::Element(element) => element.upgrade().map(|e| e.core.name()),
        };
        name.unwrap_or_else(|| "?".to_owned())
    }

    fn variable(&self) -> Option<String> {
        match self {
            Master::Node(node) => node.upgrade().map(|n| n.variable.clone()),
            Master::Element(_) => None,
        }
    }
}

/// The slave devices of one role of one owning device.
///
/// Slaves are unique by name and held weakly: the registry owns them.
/// Iteration is always sorted by name.
pub struct Connections<D: Device> {
    role: Role,
    master: Master,
    slaves: RefCell<Vec<Weak<D::Inner>>>,
}

impl<D: Device> Connections<D> {
    pub(crate) fn new(role: Role, master: Master) -> Self {
        Self {
            role,
            master,
            slaves: RefCell::new(Vec::new()),
        }
    }

    /// The role of these connections for their owning device.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Add a slave. Appending a device whose name is already present is a
    /// no-op.
    pub fn append(&self, slave: &D) {
        if self.contains(slave) {
            return;
        }
        let mut slaves = self.slaves.borrow_mut();
        slaves.retain(|s| s.strong_count() > 0);
        slaves.push(Rc::downgrade(slave.inner()));
    }

    /// The live slaves, sorted by name.
    pub fn slaves(&self) -> Vec<D> {
        let mut slaves: Vec<D> = self
            .slaves
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(D::from_inner)
            .collect();
        slaves.sort();
        slaves
    }

    /// Slave names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.slaves().iter().map(|s| s.name()).collect()
    }

    /// The slave named `name`.
    pub fn slave(&self, name: &str) -> Result<D> {
        self.slaves()
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::SlaveNotFound {
                owner: self.master.name(),
                role: self.role,
                name: name.to_owned(),
            })
    }

    /// Variables relevant to this connection.
    ///
    /// For a node-owned connection this is the node's own variable; for an
    /// element-owned connection the sorted, distinct variables of its slaves.
    pub fn variables(&self) -> Vec<String> {
        if let Some(variable) = self.master.variable() {
            return vec![variable];
        }
        self.slaves()
            .iter()
            .filter_map(|s| s.variable().map(str::to_owned))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Check membership by device or by name.
    pub fn contains(&self, key: impl AsDeviceName) -> bool {
        let key = key.device_name();
        self.slaves
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|s| D::from_inner(s).name() == *key)
    }

    /// Number of live slaves.
    pub fn len(&self) -> usize {
        self.slaves
            .borrow()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Device> IntoIterator for &Connections<D> {
    type Item = D;
    type IntoIter = std::vec::IntoIter<D>;

    fn into_iter(self) -> Self::IntoIter {
        self.slaves().into_iter()
    }
}

impl<D: Device> fmt::Debug for Connections<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connections")
            .field("role", &self.role)
            .field("slaves", &self.names())
            .finish()
    }
}
