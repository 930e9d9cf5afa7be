//! Elements: devices handling a model and four directional node roles.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use log::debug;

use crate::connections::{Connections, Master, Role};
use crate::device::{Device, DeviceCore, check_name, impl_name_identity};
use crate::devices::Member;
use crate::error::{Error, Result};
use crate::keywords::Keywords;
use crate::model::{Model, ModelError};
use crate::node::Node;
use crate::registry::Registry;
use crate::series::{SeriesGroup, SeriesOptions};

#[doc(hidden)]
pub struct ElementInner {
    pub(crate) core: DeviceCore<Element>,
    inlets: Connections<Node>,
    outlets: Connections<Node>,
    receivers: Connections<Node>,
    senders: Connections<Node>,
    model: RefCell<Option<Box<dyn Model>>>,
}

/// An element of the network.
///
/// Inlets and outlets are disjoint, as are receivers and senders.
#[derive(Clone)]
pub struct Element(Rc<ElementInner>);

/// A non-owning reference to an [`Element`], handed to its model.
#[derive(Clone)]
pub struct WeakElement(Weak<ElementInner>);

impl WeakElement {
    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(Element)
    }
}

impl fmt::Debug for WeakElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(element) => write!(f, "WeakElement(\"{}\")", element.name()),
            None => f.write_str("WeakElement(<dropped>)"),
        }
    }
}

impl Element {
    fn new(name: &str, registry: &Registry<Element>) -> Self {
        Element(Rc::new_cyclic(|weak: &Weak<ElementInner>| {
            let master = || Master::Element(weak.clone());
            ElementInner {
                core: DeviceCore::new(name, registry),
                inlets: Connections::new(Role::Inlets, master()),
                outlets: Connections::new(Role::Outlets, master()),
                receivers: Connections::new(Role::Receivers, master()),
                senders: Connections::new(Role::Senders, master()),
                model: RefCell::new(None),
            }
        }))
    }

    /// Nodes this element takes its input from.
    pub fn inlets(&self) -> &Connections<Node> {
        &self.0.inlets
    }

    /// Nodes this element passes its output to.
    pub fn outlets(&self) -> &Connections<Node> {
        &self.0.outlets
    }

    /// Nodes this element reads auxiliary values from.
    pub fn receivers(&self) -> &Connections<Node> {
        &self.0.receivers
    }

    /// Nodes this element sends auxiliary values to.
    pub fn senders(&self) -> &Connections<Node> {
        &self.0.senders
    }

    /// The connections of `role`, or `None` for the node-side roles.
    pub fn connections(&self, role: Role) -> Option<&Connections<Node>> {
        match role {
            Role::Inlets => Some(&self.0.inlets),
            Role::Outlets => Some(&self.0.outlets),
            Role::Receivers => Some(&self.0.receivers),
            Role::Senders => Some(&self.0.senders),
            Role::Entries | Role::Exits => None,
        }
    }

    /// Distinct variables of all connected nodes.
    pub fn variables(&self) -> BTreeSet<String> {
        Role::ELEMENT_ROLES
            .iter()
            .filter_map(|role| self.connections(*role))
            .flat_map(Connections::variables)
            .collect()
    }

    /// A weak handle, as handed to models.
    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Rc::downgrade(&self.0))
    }

    /// Whether a model is currently attached.
    pub fn has_model(&self) -> bool {
        self.0.model.borrow().is_some()
    }

    /// Name of the attached model.
    pub fn model_name(&self) -> Option<String> {
        self.0.model.borrow().as_ref().map(|m| m.name().to_owned())
    }

    /// Hand `model` to this element, returning the previous one.
    pub fn set_model(&self, mut model: Box<dyn Model>) -> Option<Box<dyn Model>> {
        model.bind(self.downgrade());
        self.0.model.borrow_mut().replace(model)
    }

    /// Detach and return the model.
    pub fn take_model(&self) -> Option<Box<dyn Model>> {
        self.0.model.borrow_mut().take()
    }

    /// Wire the model to the buffers of the connected nodes.
    ///
    /// A given `model` replaces the current one first. Fails if the element
    /// ends up without a model.
    pub fn connect(&self, model: Option<Box<dyn Model>>) -> Result<()> {
        if let Some(model) = model {
            self.set_model(model);
        }
        self.with_model(|model, element| model.connect(element))?;
        debug!("connected model of element `{}`", self.name());
        Ok(())
    }

    /// Let the model allocate its input series.
    pub fn prepare_inputseries(&self, options: &SeriesOptions) -> Result<()> {
        self.prepare_series(SeriesGroup::Inputs, options)
    }

    /// Let the model allocate its flux series.
    pub fn prepare_fluxseries(&self, options: &SeriesOptions) -> Result<()> {
        self.prepare_series(SeriesGroup::Fluxes, options)
    }

    /// Let the model allocate its state series.
    pub fn prepare_stateseries(&self, options: &SeriesOptions) -> Result<()> {
        self.prepare_series(SeriesGroup::States, options)
    }

    /// Input, flux and state series, in that order.
    pub fn prepare_allseries(&self, options: &SeriesOptions) -> Result<()> {
        for group in SeriesGroup::ALL {
            self.prepare_series(group, options)?;
        }
        Ok(())
    }

    fn prepare_series(&self, group: SeriesGroup, options: &SeriesOptions) -> Result<()> {
        self.with_model(|model, _| model.prepare_series(group, options))?;
        debug!(
            "element `{}`: prepared {:?} series of {} steps",
            self.name(),
            group,
            options.steps
        );
        Ok(())
    }

    /// Run `f` on the model while it is taken out of its slot, so that the
    /// model may freely inspect this element.
    fn with_model(
        &self,
        f: impl FnOnce(&mut dyn Model, &Element) -> std::result::Result<(), ModelError>,
    ) -> Result<()> {
        let mut model = self
            .take_model()
            .ok_or_else(|| Error::ModelNotFound(self.name()))?;
        let outcome = f(&mut *model, self);
        *self.0.model.borrow_mut() = Some(model);
        outcome.map_err(|source| Error::Model {
            element: self.name(),
            source,
        })
    }
}

impl Device for Element {
    type Inner = ElementInner;

    const KIND: &'static str = "Element";
    const GROUP: &'static str = "Elements";

    fn create(name: &str, registry: &Registry<Self>) -> Self {
        Element::new(name, registry)
    }

    fn core(&self) -> &DeviceCore<Self> {
        &self.0.core
    }

    fn inner(&self) -> &Rc<ElementInner> {
        &self.0
    }

    fn from_inner(inner: Rc<ElementInner>) -> Self {
        Element(inner)
    }

    fn variable(&self) -> Option<&str> {
        None
    }
}

impl_name_identity!(Element);

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element(\"{}\"", self.name())?;
        for role in Role::ELEMENT_ROLES {
            if let Some(connections) = self.connections(role) {
                if !connections.is_empty() {
                    write!(f, ", {}={:?}", role, connections.names())?;
                }
            }
        }
        let keywords = self.keywords();
        if !keywords.is_empty() {
            write!(f, ", keywords={:?}", keywords.iter().collect::<Vec<_>>())?;
        }
        write!(f, ")")
    }
}

/// Arguments for creating or extending an element.
///
/// Role members may be node names, nodes or `Nodes` containers.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    name: String,
    roles: [Vec<Member<Node>>; 4],
    keywords: Vec<String>,
}

impl ElementSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Default::default(),
            keywords: Vec::new(),
        }
    }

    pub fn inlets(self, members: impl Into<Member<Node>>) -> Self {
        self.role(Role::Inlets, members)
    }

    pub fn outlets(self, members: impl Into<Member<Node>>) -> Self {
        self.role(Role::Outlets, members)
    }

    pub fn receivers(self, members: impl Into<Member<Node>>) -> Self {
        self.role(Role::Receivers, members)
    }

    pub fn senders(self, members: impl Into<Member<Node>>) -> Self {
        self.role(Role::Senders, members)
    }

    /// Add members to one element role. Node-side roles are ignored.
    pub fn role(mut self, role: Role, members: impl Into<Member<Node>>) -> Self {
        if let Some(idx) = role_index(role) {
            self.roles[idx].push(members.into());
        }
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }
}

fn role_index(role: Role) -> Option<usize> {
    Role::ELEMENT_ROLES.iter().position(|r| *r == role)
}

/// A node requested for a role, before anything has been created.
enum Candidate {
    Name(String),
    Node(Node),
}

impl Candidate {
    fn name(&self) -> String {
        match self {
            Candidate::Name(name) => name.clone(),
            Candidate::Node(node) => node.name(),
        }
    }
}

fn candidates(members: &[Member<Node>]) -> Result<Vec<Candidate>> {
    let mut out = Vec::new();
    for member in members {
        match member {
            Member::Name(name) => {
                check_name::<Node>(name)?;
                out.push(Candidate::Name(name.clone()));
            }
            Member::Device(node) => out.push(Candidate::Node(node.clone())),
            Member::Group(group) => out.extend(group.devices().into_iter().map(Candidate::Node)),
        }
    }
    Ok(out)
}

impl Registry<Element> {
    /// Get or create the element described by `spec` and connect its nodes.
    ///
    /// All names, keywords and role combinations are checked before anything
    /// is created or connected: on error, neither the element nor any node or
    /// connection is added.
    pub fn build_element(&self, nodes: &Registry<Node>, spec: ElementSpec) -> Result<Element> {
        check_name::<Element>(&spec.name)?;
        for keyword in &spec.keywords {
            Keywords::validate(&spec.name, keyword)?;
        }

        let existing = self.get(&spec.name);
        let mut resolved: Vec<(Role, Vec<Candidate>)> = Vec::with_capacity(4);
        for (role, members) in Role::ELEMENT_ROLES.into_iter().zip(&spec.roles) {
            let opposite = role.opposite();
            let requested = candidates(members)?;
            for candidate in &requested {
                let name = candidate.name();
                let in_existing = existing
                    .as_ref()
                    .and_then(|e| e.connections(opposite))
                    .is_some_and(|c| c.contains(name.as_str()));
                let in_requested = resolved
                    .iter()
                    .filter(|(r, _)| *r == opposite)
                    .any(|(_, cs)| cs.iter().any(|c| c.name() == name));
                if in_existing || in_requested {
                    return Err(Error::RoleConflict {
                        element: spec.name,
                        node: name,
                        role,
                        opposite,
                    });
                }
            }
            resolved.push((role, requested));
        }

        let element = self.get_or_create(&spec.name)?;
        element.add_keywords(&spec.keywords)?;
        for (role, requested) in resolved {
            let Some(connections) = element.connections(role) else {
                continue;
            };
            for candidate in requested {
                let node = match candidate {
                    Candidate::Name(name) => nodes.get_or_create(&name)?,
                    Candidate::Node(node) => node,
                };
                connections.append(&node);
                if let Some(mirror) = node.connections(role.mirror()) {
                    mirror.append(&element);
                }
                debug!(
                    "element `{}`: node `{}` added to {}",
                    spec.name,
                    node.name(),
                    role
                );
            }
        }
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn registries() -> (Registry<Node>, Registry<Element>) {
        (Registry::new(), Registry::new())
    }

    /// Copies the value of its inlet into its outlet when connected.
    #[derive(Debug, Default)]
    struct Relay {
        element: Option<WeakElement>,
    }

    impl Model for Relay {
        fn name(&self) -> &str {
            "relay"
        }

        fn bind(&mut self, element: WeakElement) {
            self.element = Some(element);
        }

        fn connect(&mut self, element: &Element) -> std::result::Result<(), ModelError> {
            let bound = self.element.as_ref().and_then(WeakElement::upgrade);
            if !bound.is_some_and(|bound| bound.ptr_eq(element)) {
                return Err(ModelError::new("relay is not bound to this element"));
            }
            let inlet = element
                .inlets()
                .slaves()
                .into_iter()
                .next()
                .ok_or_else(|| ModelError::new("relay needs one inlet"))?;
            let outlet = element
                .outlets()
                .slaves()
                .into_iter()
                .next()
                .ok_or_else(|| ModelError::new("relay needs one outlet"))?;
            outlet.entries_buffer().set(inlet.exits_buffer().get());
            Ok(())
        }
    }

    /// Records every series request it receives.
    #[derive(Debug)]
    struct Recorder {
        calls: Rc<RefCell<Vec<(SeriesGroup, usize)>>>,
    }

    impl Model for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn connect(&mut self, _element: &Element) -> std::result::Result<(), ModelError> {
            Ok(())
        }

        fn prepare_series(
            &mut self,
            group: SeriesGroup,
            options: &SeriesOptions,
        ) -> std::result::Result<(), ModelError> {
            self.calls.borrow_mut().push((group, options.steps));
            Ok(())
        }
    }

    #[test]
    fn test_prepare_series_forwards_group() {
        let (nodes, elements) = registries();
        let e = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("a"))
            .unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        e.set_model(Box::new(Recorder {
            calls: Rc::clone(&calls),
        }));

        e.prepare_inputseries(&SeriesOptions::new(1)).unwrap();
        e.prepare_fluxseries(&SeriesOptions::new(2)).unwrap();
        e.prepare_stateseries(&SeriesOptions::new(3)).unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![
                (SeriesGroup::Inputs, 1),
                (SeriesGroup::Fluxes, 2),
                (SeriesGroup::States, 3),
            ]
        );

        calls.borrow_mut().clear();
        e.prepare_allseries(&SeriesOptions::new(4)).unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![
                (SeriesGroup::Inputs, 4),
                (SeriesGroup::Fluxes, 4),
                (SeriesGroup::States, 4),
            ]
        );
        assert!(e.has_model());
    }

    #[test]
    fn test_symmetric_connections() {
        let (nodes, elements) = registries();
        let e = elements
            .build_element(
                &nodes,
                ElementSpec::new("e").inlets("a").outlets("b").receivers("r"),
            )
            .unwrap();
        let a = nodes.get("a").unwrap();
        let b = nodes.get("b").unwrap();
        let r = nodes.get("r").unwrap();

        assert_eq!(e.inlets().names(), vec!["a"]);
        assert_eq!(e.outlets().names(), vec!["b"]);
        assert!(a.exits().contains(&e));
        assert!(b.entries().contains("e"));
        assert!(r.exits().contains("e"));
        assert!(e.senders().is_empty());
        assert_eq!(
            format!("{:?}", e),
            r#"Element("e", inlets=["a"], outlets=["b"], receivers=["r"])"#
        );
    }

    #[test]
    fn test_role_conflict_commits_nothing() {
        let (nodes, elements) = registries();
        let err = elements
            .build_element(
                &nodes,
                ElementSpec::new("e").inlets("w").inlets("x").outlets("x"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.to_string(),
            "element `e`: node `x` cannot be an outlet because it is already an inlet"
        );
        assert!(elements.is_empty());
        assert!(nodes.is_empty());

        let err = elements
            .build_element(&nodes, ElementSpec::new("e").receivers("y").senders("y"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RoleConflict {
                role: Role::Senders,
                opposite: Role::Receivers,
                ..
            }
        ));
    }

    #[test]
    fn test_role_conflict_with_existing_connection() {
        let (nodes, elements) = registries();
        let e = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("x"))
            .unwrap();
        let err = elements
            .build_element(&nodes, ElementSpec::new("e").senders("s").outlets("x"))
            .unwrap_err();
        assert!(matches!(err, Error::RoleConflict { role: Role::Outlets, .. }));
        assert!(e.senders().is_empty());
        assert!(!nodes.contains("s"));
    }

    #[test]
    fn test_repeated_build_extends() {
        let (nodes, elements) = registries();
        let e1 = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("a").keyword("k1"))
            .unwrap();
        let e2 = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("b").keyword("k2"))
            .unwrap();
        assert!(e1.ptr_eq(&e2));
        assert_eq!(e1.inlets().names(), vec!["a", "b"]);
        assert!(e1.has_keyword("k1") && e1.has_keyword("k2"));
    }

    #[test]
    fn test_variables_across_roles() {
        let (nodes, elements) = registries();
        nodes
            .build_node(crate::node::NodeSpec::new("a").variable("X"))
            .unwrap();
        nodes
            .build_node(crate::node::NodeSpec::new("b").variable("Y"))
            .unwrap();
        let e = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("a").outlets("b").senders("c"))
            .unwrap();
        let variables: Vec<String> = e.variables().into_iter().collect();
        assert_eq!(variables, vec!["Q", "X", "Y"]);
        assert_eq!(e.outlets().variables(), vec!["Y"]);
    }

    #[test]
    fn test_connect_requires_model() {
        let (nodes, elements) = registries();
        let e = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("a").outlets("b"))
            .unwrap();
        let err = e.connect(None).unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(ref name) if name == "e"));
        assert_eq!(
            err.to_string(),
            "no model has been assigned to element `e`"
        );
        assert!(e.prepare_inputseries(&SeriesOptions::new(3)).is_err());
    }

    #[test]
    fn test_connect_binds_and_wires() {
        let (nodes, elements) = registries();
        let e = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("a").outlets("b"))
            .unwrap();
        let a = nodes.get("a").unwrap();
        let b = nodes.get("b").unwrap();
        a.sim().set_value(2.5);
        e.connect(Some(Box::new(Relay::default()))).unwrap();
        assert!(e.has_model());
        assert_eq!(e.model_name().as_deref(), Some("relay"));
        assert_eq!(b.sim().value(), 2.5);

        // Reconnecting keeps the same model.
        a.sim().set_value(4.0);
        e.connect(None).unwrap();
        assert_eq!(b.sim().value(), 4.0);
        e.prepare_allseries(&SeriesOptions::new(2)).unwrap();
        assert!(e.take_model().is_some());
        assert!(!e.has_model());
    }

    #[test]
    fn test_model_error_is_wrapped() {
        let (nodes, elements) = registries();
        let e = elements
            .build_element(&nodes, ElementSpec::new("e").inlets("a"))
            .unwrap();
        let err = e.connect(Some(Box::new(Relay::default()))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
        assert_eq!(
            err.to_string(),
            "model of element `e` failed: relay needs one outlet"
        );
        // The model stays assigned after a failed wiring.
        assert!(e.has_model());
    }

    #[test]
    fn test_weak_element() {
        let (nodes, elements) = registries();
        let e = elements
            .build_element(&nodes, ElementSpec::new("e"))
            .unwrap();
        let weak = e.downgrade();
        assert!(weak.upgrade().unwrap().ptr_eq(&e));
        drop(e);
        elements.clear();
        assert!(weak.upgrade().is_none());
    }
}
