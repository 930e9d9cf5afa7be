//! Core device registry and connection graph for Hydronet.
//!
//! This crate provides the fundamental data structures for describing a
//! network: name-unique nodes and elements, the directional connections
//! between them, and name-indexed containers for grouping and selecting
//! devices by keyword.

pub mod connections;
pub mod device;
pub mod devices;
pub mod element;
pub mod error;
pub mod keywords;
pub mod model;
pub mod network;
pub mod node;
pub mod registry;
pub mod series;

pub use connections::{Connections, Role};
pub use device::{AsDeviceName, Device, is_identifier};
pub use devices::{Devices, Elements, Member, Nodes, Selection};
pub use element::{Element, ElementSpec, WeakElement};
pub use error::{Error, ErrorKind, Result};
pub use keywords::Keywords;
pub use model::{Model, ModelError};
pub use network::Network;
pub use node::{DEFAULT_VARIABLE, DeployMode, Node, NodeSpec};
pub use registry::Registry;
pub use series::{
    NodeSequence, SequenceKind, SeriesGroup, SeriesOptions, SharedScalar, StorageMode,
    shared_scalar,
};
