//! Nodes: network points carrying one scalar variable between elements.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use log::debug;

use crate::connections::{Connections, Master, Role};
use crate::device::{Device, DeviceCore, check_name, impl_name_identity};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::keywords::Keywords;
use crate::registry::Registry;
use crate::series::{NodeSequence, SequenceKind, SeriesOptions, SharedScalar, shared_scalar};

/// Variable handled by nodes created without an explicit one.
pub const DEFAULT_VARIABLE: &str = "Q";

/// Which data source a node reports to its downstream elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeployMode {
    /// Report the value simulated in the current run.
    #[default]
    NewSim,
    /// Receive simulated values but report externally supplied ones.
    Obs,
    /// Report a previously archived simulation; upstream writes go to a sink.
    OldSim,
}

impl DeployMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployMode::NewSim => "newsim",
            DeployMode::Obs => "obs",
            DeployMode::OldSim => "oldsim",
        }
    }
}

impl FromStr for DeployMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "newsim" => Ok(DeployMode::NewSim),
            "obs" => Ok(DeployMode::Obs),
            "oldsim" => Ok(DeployMode::OldSim),
            _ => Err(Error::InvalidDeployMode(s.to_owned())),
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[doc(hidden)]
pub struct NodeInner {
    pub(crate) core: DeviceCore<Node>,
    pub(crate) variable: String,
    entries: Connections<Element>,
    exits: Connections<Element>,
    sim: NodeSequence,
    obs: NodeSequence,
    deploy_mode: Cell<DeployMode>,
    /// Disposable target for upstream writes in `oldsim` mode.
    sink: RefCell<Option<SharedScalar>>,
}

/// A node of the network.
///
/// Nodes are created through a [`Registry`]; all handles with the same name
/// obtained from one registry refer to the same node.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    fn new(name: &str, variable: &str, registry: &Registry<Node>) -> Self {
        Node(Rc::new_cyclic(|weak| NodeInner {
            core: DeviceCore::new(name, registry),
            variable: variable.to_owned(),
            entries: Connections::new(Role::Entries, Master::Node(weak.clone())),
            exits: Connections::new(Role::Exits, Master::Node(weak.clone())),
            sim: NodeSequence::new(SequenceKind::Sim),
            obs: NodeSequence::new(SequenceKind::Obs),
            deploy_mode: Cell::new(DeployMode::default()),
            sink: RefCell::new(None),
        }))
    }

    /// The variable handled by this node, e.g. `Q`.
    pub fn variable(&self) -> &str {
        &self.0.variable
    }

    /// Elements delivering values into this node.
    pub fn entries(&self) -> &Connections<Element> {
        &self.0.entries
    }

    /// Elements taking values out of this node.
    pub fn exits(&self) -> &Connections<Element> {
        &self.0.exits
    }

    /// The connections of `role`, or `None` for the element-side roles.
    pub fn connections(&self, role: Role) -> Option<&Connections<Element>> {
        match role {
            Role::Entries => Some(&self.0.entries),
            Role::Exits => Some(&self.0.exits),
            Role::Inlets | Role::Outlets | Role::Receivers | Role::Senders => None,
        }
    }

    /// The simulated sequence.
    pub fn sim(&self) -> &NodeSequence {
        &self.0.sim
    }

    /// The observed sequence.
    pub fn obs(&self) -> &NodeSequence {
        &self.0.obs
    }

    /// The current deploy mode.
    pub fn deploy_mode(&self) -> DeployMode {
        self.0.deploy_mode.get()
    }

    /// Switch the deploy mode.
    ///
    /// This only changes which buffers [`Node::exits_buffer`] and
    /// [`Node::entries_buffer`] return; values already computed are kept.
    /// Entering `oldsim` always starts with a fresh sink.
    pub fn set_deploy_mode(&self, mode: DeployMode) {
        if mode == DeployMode::OldSim {
            *self.0.sink.borrow_mut() = Some(shared_scalar(0.0));
        }
        self.0.deploy_mode.set(mode);
        debug!("node `{}` deploys `{}`", self.name(), mode);
    }

    /// The buffer downstream elements read from.
    pub fn exits_buffer(&self) -> SharedScalar {
        match self.deploy_mode() {
            DeployMode::Obs => self.0.obs.shared(),
            DeployMode::NewSim | DeployMode::OldSim => self.0.sim.shared(),
        }
    }

    /// The buffer upstream elements write into.
    pub fn entries_buffer(&self) -> SharedScalar {
        match self.deploy_mode() {
            DeployMode::OldSim => Rc::clone(
                self.0
                    .sink
                    .borrow_mut()
                    .get_or_insert_with(|| shared_scalar(0.0)),
            ),
            DeployMode::NewSim | DeployMode::Obs => self.0.sim.shared(),
        }
    }

    /// The disposable sink, once `oldsim` mode has been entered.
    pub fn sink(&self) -> Option<SharedScalar> {
        self.0.sink.borrow().clone()
    }

    /// Reset the current simulated value to zero.
    pub fn reset(&self) {
        self.0.sim.set_value(0.0);
    }

    /// Load step `idx` of the simulated series.
    pub fn load_sim(&self, idx: usize) -> Result<()> {
        self.0.sim.load(idx)
    }

    /// Store the current simulated value as step `idx`.
    pub fn save_sim(&self, idx: usize) -> Result<()> {
        self.0.sim.save(idx)
    }

    /// Load step `idx` of the observed series.
    pub fn load_obs(&self, idx: usize) -> Result<()> {
        self.0.obs.load(idx)
    }

    /// The whole simulated series; empty if none was prepared.
    pub fn sim_series(&self) -> Result<Vec<f64>> {
        self.0.sim.series()
    }

    /// The whole observed series; empty if none was prepared.
    pub fn obs_series(&self) -> Result<Vec<f64>> {
        self.0.obs.series()
    }

    /// Allocate the simulated series.
    pub fn prepare_simseries(&self, options: &SeriesOptions) -> Result<()> {
        self.prepare_series(&self.0.sim, options)
    }

    /// Allocate the observed series.
    pub fn prepare_obsseries(&self, options: &SeriesOptions) -> Result<()> {
        self.prepare_series(&self.0.obs, options)
    }

    /// Prepare both the `sim` and the `obs` series.
    pub fn prepare_allseries(&self, options: &SeriesOptions) -> Result<()> {
        self.prepare_simseries(options)?;
        self.prepare_obsseries(options)
    }

    fn prepare_series(&self, sequence: &NodeSequence, options: &SeriesOptions) -> Result<()> {
        let name = self.name();
        sequence.activate(options, &name)?;
        debug!(
            "node `{}`: {} series of {} steps in {}",
            name,
            sequence.kind(),
            options.steps,
            if options.ram { "RAM" } else { "file" }
        );
        Ok(())
    }
}

impl Device for Node {
    type Inner = NodeInner;

    const KIND: &'static str = "Node";
    const GROUP: &'static str = "Nodes";

    fn create(name: &str, registry: &Registry<Self>) -> Self {
        Node::new(name, DEFAULT_VARIABLE, registry)
    }

    fn core(&self) -> &DeviceCore<Self> {
        &self.0.core
    }

    fn inner(&self) -> &Rc<NodeInner> {
        &self.0
    }

    fn from_inner(inner: Rc<NodeInner>) -> Self {
        Node(inner)
    }

    fn variable(&self) -> Option<&str> {
        Some(&self.0.variable)
    }
}

impl_name_identity!(Node);

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(\"{}\", variable=\"{}\"", self.name(), self.0.variable)?;
        let keywords = self.keywords();
        if !keywords.is_empty() {
            write!(f, ", keywords=[")?;
            for (i, keyword) in keywords.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "\"{}\"", keyword)?;
            }
            write!(f, "]")?;
        }
        write!(f, ")")
    }
}

/// Arguments for creating or extending a node.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    name: String,
    variable: Option<String>,
    keywords: Vec<String>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable: None,
            keywords: Vec::new(),
        }
    }

    /// Variable the node must handle. Defaults to [`DEFAULT_VARIABLE`] for
    /// new nodes; for existing nodes it must match.
    pub fn variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
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

impl Registry<Node> {
    /// Get or create the node described by `spec`.
    ///
    /// Keywords are merged into those of an existing node. Nothing changes
    /// if the name or any keyword is invalid, or if `spec` requests a
    /// variable different from the one of an existing node.
    pub fn build_node(&self, spec: NodeSpec) -> Result<Node> {
        check_name::<Node>(&spec.name)?;
        for keyword in &spec.keywords {
            Keywords::validate(&spec.name, keyword)?;
        }
        if let (Some(existing), Some(requested)) = (self.get(&spec.name), spec.variable.as_deref()) {
            if existing.variable() != requested {
                return Err(Error::VariableConflict {
                    node: spec.name,
                    current: existing.variable().to_owned(),
                    requested: requested.to_owned(),
                });
            }
        }
        let variable = spec.variable.as_deref().unwrap_or(DEFAULT_VARIABLE);
        let node = self.get_or_create_with(&spec.name, |registry| {
            Node::new(&spec.name, variable, registry)
        })?;
        node.add_keywords(&spec.keywords)?;
        Ok(node)
    }
}
