//! Per-kind device repositories providing get-or-create identity.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use log::debug;

use crate::device::{Device, check_name};
use crate::devices::Devices;
use crate::error::Result;

pub(crate) struct RegistryState<D: Device> {
    /// Canonical instances, in creation order.
    devices: IndexMap<String, D>,
    /// Devices requested since the last call to [`Registry::gather_new`].
    selection: IndexMap<String, D>,
}

impl<D: Device> RegistryState<D> {
    pub(crate) fn is_taken_by_other(&self, name: &str, device: &D) -> bool {
        self.devices
            .get(name)
            .is_some_and(|existing| !existing.ptr_eq(device))
    }

    /// Move `device` from `old` to `new`, if it is the canonical instance.
    pub(crate) fn rekey(&mut self, old: &str, new: &str, device: &D) {
        for map in [&mut self.devices, &mut self.selection] {
            if map.get(old).is_some_and(|d| d.ptr_eq(device)) {
                map.shift_remove(old);
                map.insert(new.to_owned(), device.clone());
            }
        }
    }
}

/// Name-indexed repository holding strong ownership of every device of one
/// kind.
///
/// `Registry` is a handle: clones share the same underlying repository.
/// Devices created through one registry are never visible in another, so
/// independent networks (or tests) do not leak into each other.
pub struct Registry<D: Device> {
    state: Rc<RefCell<RegistryState<D>>>,
}

impl<D: Device> Registry<D> {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                devices: IndexMap::new(),
                selection: IndexMap::new(),
            })),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<RegistryState<D>>> {
        Rc::downgrade(&self.state)
    }

    /// Return the device named `name`, creating it if necessary.
    ///
    /// Either way the device is recorded as "new" for [`Registry::gather_new`].
    pub fn get_or_create(&self, name: &str) -> Result<D> {
        self.get_or_create_with(name, |registry| D::create(name, registry))
    }

    pub(crate) fn get_or_create_with(
        &self,
        name: &str,
        create: impl FnOnce(&Self) -> D,
    ) -> Result<D> {
        check_name::<D>(name)?;
        let existing = self.get(name);
        let device = match existing {
            Some(device) => device,
            None => {
                let device = create(self);
                debug!("created {} `{}`", D::KIND, name);
                self.state
                    .borrow_mut()
                    .devices
                    .insert(name.to_owned(), device.clone());
                device
            }
        };
        self.state
            .borrow_mut()
            .selection
            .insert(name.to_owned(), device.clone());
        Ok(device)
    }

    /// Look up a registered device without creating it.
    pub fn get(&self, name: &str) -> Option<D> {
        self.state.borrow().devices.get(name).cloned()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.state.borrow().devices.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.borrow().devices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.state.borrow().devices.len()
    }

    /// Whether no device is registered.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().devices.is_empty()
    }

    /// All registered devices, as a container.
    pub fn snapshot(&self) -> Devices<D> {
        let devices: Vec<D> = self.state.borrow().devices.values().cloned().collect();
        Devices::from_devices(self, devices)
    }

    /// Return every device requested since the last call and forget them.
    ///
    /// The permanent registry is not affected.
    pub fn gather_new(&self) -> Devices<D> {
        let selection = std::mem::take(&mut self.state.borrow_mut().selection);
        debug!("gathered {} new {} device(s)", selection.len(), D::KIND);
        Devices::from_devices(self, selection.into_values())
    }

    /// Remove a single name from the registry, returning its device.
    ///
    /// A later get-or-create call with the same name builds a new, distinct
    /// device. Existing handles to the old device stay valid.
    pub fn forget(&self, name: &str) -> Option<D> {
        let removed = {
            let mut state = self.state.borrow_mut();
            state.selection.shift_remove(name);
            state.devices.shift_remove(name)
        };
        if removed.is_some() {
            debug!("forgot {} `{}`", D::KIND, name);
        }
        removed
    }

    /// Remove every device from the registry and the new-device selection.
    pub fn clear(&self) {
        let (devices, selection) = {
            let mut state = self.state.borrow_mut();
            (
                std::mem::take(&mut state.devices),
                std::mem::take(&mut state.selection),
            )
        };
        debug!("cleared {} {} device(s)", devices.len(), D::KIND);
        // Dropped outside the borrow: device teardown may touch other state.
        drop(selection);
        drop(devices);
    }
}

impl<D: Device> Clone for Registry<D> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<D: Device> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Device> fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &D::KIND)
            .field("names", &self.names())
            .finish()
    }
}
