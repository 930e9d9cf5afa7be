//! Shared identity capability of nodes and elements.
//!
//! Every device is created through a [`Registry`] and identified by its name.
//! Equality, ordering and hashing are all defined on the name. Object
//! identity is available separately through [`Device::ptr_eq`].

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, trace, warn};

use crate::devices::{DevicesState, Handler, HandlerId};
use crate::error::{Error, Result};
use crate::keywords::Keywords;
use crate::registry::{Registry, RegistryState};

/// Check whether `name` is an ASCII identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

pub(crate) fn check_name<D: Device>(name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            kind: D::KIND,
            name: name.to_owned(),
        })
    }
}

/// Anything that can be matched against a device name: a device or a string.
pub trait AsDeviceName {
    fn device_name(&self) -> Cow<'_, str>;
}

impl AsDeviceName for str {
    fn device_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl AsDeviceName for String {
    fn device_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl<T: AsDeviceName + ?Sized> AsDeviceName for &T {
    fn device_name(&self) -> Cow<'_, str> {
        (**self).device_name()
    }
}

/// A named, registry-backed network device.
///
/// Handles are cheap to clone; clones refer to the same device.
pub trait Device:
    AsDeviceName + Clone + Ord + std::hash::Hash + fmt::Debug + fmt::Display + 'static
{
    #[doc(hidden)]
    type Inner;

    /// Name of the device kind, e.g. `Node`.
    const KIND: &'static str;
    /// Name of the matching container kind, e.g. `Nodes`.
    const GROUP: &'static str;

    /// Allocate a fresh device bound to `registry`, without registering it.
    fn create(name: &str, registry: &Registry<Self>) -> Self;

    #[doc(hidden)]
    fn core(&self) -> &DeviceCore<Self>;

    #[doc(hidden)]
    fn inner(&self) -> &Rc<Self::Inner>;

    #[doc(hidden)]
    fn from_inner(inner: Rc<Self::Inner>) -> Self;

    /// The scalar variable this device carries, if any.
    fn variable(&self) -> Option<&str>;

    fn name(&self) -> String {
        self.core().name()
    }

    /// Rename the device.
    ///
    /// The registry key and the key of every container currently holding the
    /// device follow the new name.
    fn set_name(&self, name: &str) -> Result<()> {
        rename(self, name)
    }

    /// Whether both handles refer to the very same device object.
    fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self.inner(), other.inner())
    }

    /// A snapshot of the device keywords.
    fn keywords(&self) -> Keywords {
        self.core().keywords.borrow().clone()
    }

    fn has_keyword(&self, keyword: &str) -> bool {
        self.core().keywords.borrow().has(keyword)
    }

    fn add_keyword(&self, keyword: &str) -> Result<()> {
        self.core().keywords.borrow_mut().add(keyword)
    }

    /// Add several keywords; nothing is added if any of them is invalid.
    fn add_keywords<I, S>(&self, keywords: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.core().keywords.borrow_mut().update(keywords)
    }

    fn remove_keyword(&self, keyword: &str) -> bool {
        self.core().keywords.borrow_mut().remove(keyword)
    }

    fn clear_keywords(&self) {
        self.core().keywords.borrow_mut().clear();
    }

    /// Number of live containers currently holding this device.
    fn handler_count(&self) -> usize {
        self.core().live_handlers().len()
    }
}

/// State shared by every device kind.
#[doc(hidden)]
pub struct DeviceCore<D: Device> {
    name: RefCell<String>,
    keywords: RefCell<Keywords>,
    handlers: RefCell<Vec<Handler<D>>>,
    registry: Weak<RefCell<RegistryState<D>>>,
}

impl<D: Device> DeviceCore<D> {
    pub(crate) fn new(name: &str, registry: &Registry<D>) -> Self {
        Self {
            name: RefCell::new(name.to_owned()),
            keywords: RefCell::new(Keywords::for_device(name)),
            handlers: RefCell::new(Vec::new()),
            registry: registry.downgrade(),
        }
    }

    pub(crate) fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub(crate) fn add_handler(&self, handler: Handler<D>) {
        let mut handlers = self.handlers.borrow_mut();
        if !handlers.iter().any(|h| h.id == handler.id) {
            trace!("device `{}` gained handler {:?}", self.name.borrow(), handler.id);
            handlers.push(handler);
        }
    }

    pub(crate) fn remove_handler(&self, id: HandlerId) {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|h| h.id != id);
        if handlers.len() != before {
            trace!("device `{}` lost handler {:?}", self.name.borrow(), id);
        }
    }

    /// Upgrade every handler, pruning those whose container is gone.
    pub(crate) fn live_handlers(&self) -> Vec<Rc<RefCell<DevicesState<D>>>> {
        let mut handlers = self.handlers.borrow_mut();
        let live: Vec<_> = handlers.iter().filter_map(|h| h.state.upgrade()).collect();
        if live.len() != handlers.len() {
            warn!(
                "pruning {} stale handler(s) of {} `{}`",
                handlers.len() - live.len(),
                D::KIND,
                self.name.borrow()
            );
            handlers.retain(|h| h.state.strong_count() > 0);
        }
        live
    }
}

fn rename<D: Device>(device: &D, name: &str) -> Result<()> {
    check_name::<D>(name)?;
    let core = device.core();
    let old = core.name();
    if old == name {
        return Ok(());
    }

    // A clash in the registry or in any holding container leaves everything
    // untouched.
    let registry = core.registry.upgrade();
    let handlers = core.live_handlers();
    let taken = registry
        .as_ref()
        .is_some_and(|r| r.borrow().is_taken_by_other(name, device))
        || handlers
            .iter()
            .any(|state| state.borrow().holds_other(name, device));
    if taken {
        return Err(Error::NameConflict {
            kind: D::KIND,
            from: old,
            to: name.to_owned(),
        });
    }

    for state in &handlers {
        state.borrow_mut().detach(&old);
    }
    if let Some(registry) = &registry {
        registry.borrow_mut().rekey(&old, name, device);
    }
    *core.name.borrow_mut() = name.to_owned();
    core.keywords.borrow_mut().set_device(name);
    for state in &handlers {
        state.borrow_mut().attach(device.clone());
    }

    debug!(
        "renamed {} `{}` to `{}` in {} container(s)",
        D::KIND,
        old,
        name,
        handlers.len()
    );
    Ok(())
}

/// Implement equality, ordering and hashing on the device name.
macro_rules! impl_name_identity {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::device::Device::name(self) == $crate::device::Device::name(other)
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                $crate::device::Device::name(self).cmp(&$crate::device::Device::name(other))
            }
        }

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                $crate::device::Device::name(self).hash(state);
            }
        }

        impl $crate::device::AsDeviceName for $ty {
            fn device_name(&self) -> std::borrow::Cow<'_, str> {
                std::borrow::Cow::Owned($crate::device::Device::name(self))
            }
        }
    };
}

pub(crate) use impl_name_identity;
