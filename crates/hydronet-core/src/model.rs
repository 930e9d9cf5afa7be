//! The model capability plugged into elements.

use thiserror::Error;

use crate::element::{Element, WeakElement};
use crate::series::{SeriesGroup, SeriesOptions};

/// Failure reported by a [`Model`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ModelError(String);

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A numeric model handled by an [`Element`].
///
/// The network core never looks inside a model. It only binds the model to
/// its element and asks it to wire its internal pointers to the node
/// buffers reachable through the element's connections.
pub trait Model: std::fmt::Debug {
    /// Model name (e.g., "branch").
    fn name(&self) -> &str;

    /// Remember the element handling this model.
    fn bind(&mut self, element: WeakElement) {
        let _ = element;
    }

    /// Wire the model to the node buffers of `element`.
    ///
    /// Typically reads `exits_buffer()` of each inlet node and
    /// `entries_buffer()` of each outlet node.
    fn connect(&mut self, element: &Element) -> Result<(), ModelError>;

    /// Allocate the series of one sequence group.
    fn prepare_series(
        &mut self,
        group: SeriesGroup,
        options: &SeriesOptions,
    ) -> Result<(), ModelError> {
        let _ = (group, options);
        Ok(())
    }
}
