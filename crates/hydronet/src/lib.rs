//! # Hydronet
//!
//! Networks of name-unique nodes and elements for time-stepped simulation.
//!
//! Hydronet provides the topology layer a simulation runs on:
//! - nodes carrying one scalar variable, with switchable data sources
//! - elements handling a model and connected to nodes in four roles
//! - containers for grouping devices and selecting them by keyword
//! - per-node time series kept in RAM or on disk
//!
//! ## Quick Start
//!
//! ```rust
//! use hydronet::prelude::*;
//!
//! let network = Network::new();
//! let nodes = network.nodes(["a", "b"]).unwrap();
//! let e = network
//!     .build_element(ElementSpec::new("e").inlets("a").outlets("b"))
//!     .unwrap();
//!
//! assert_eq!(e.inlets().names(), vec!["a"]);
//! assert!(nodes.get("b").unwrap().entries().contains(&e));
//! assert_eq!(nodes.to_string(), r#"Nodes("a", "b")"#);
//! ```
//!
//! ## Models
//!
//! Numeric models are plugged into elements through the [`Model`] trait and
//! wire themselves to node buffers in [`Model::connect`]:
//!
//! ```rust,ignore
//! element.connect(Some(Box::new(MyModel::default())))?;
//! network.registered_nodes().prepare_allseries(&SeriesOptions::new(365))?;
//! ```

// Re-export core crate
pub use hydronet_core as core;

// ============================================================================
// Convenient re-exports from hydronet_core
// ============================================================================

pub use hydronet_core::{
    AsDeviceName,
    // Connections
    Connections,
    DEFAULT_VARIABLE,
    DeployMode,
    // Devices
    Device,
    Devices,
    Element,
    ElementSpec,
    Elements,
    // Errors
    Error,
    ErrorKind,
    Keywords,
    Member,
    // Models
    Model,
    ModelError,
    // Network context
    Network,
    Node,
    NodeSequence,
    NodeSpec,
    Nodes,
    Registry,
    Result,
    Role,
    Selection,
    SequenceKind,
    SeriesGroup,
    // Series
    SeriesOptions,
    SharedScalar,
    StorageMode,
    WeakElement,
    is_identifier,
    shared_scalar,
};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module containing commonly used types and traits.
///
/// ```rust
/// use hydronet::prelude::*;
/// ```
pub mod prelude {
    // Network and devices
    pub use crate::{Device, Element, ElementSpec, Network, Node, NodeSpec};

    // Containers
    pub use crate::{Elements, Member, Nodes, Selection};

    // Models and series
    pub use crate::{DeployMode, Model, ModelError, SeriesOptions, SharedScalar};

    // Errors
    pub use crate::{Error, ErrorKind};
}
