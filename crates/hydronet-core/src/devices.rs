//! Name-indexed device containers with keyword selection and set algebra.
//!
//! A container registers itself as a handler on every device it holds, so a
//! renamed device stays reachable under its new name. Dropping the last
//! handle of a container detaches it from all of its devices.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use log::{debug, trace};

use crate::device::{AsDeviceName, Device, check_name};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::registry::Registry;
use crate::series::SeriesOptions;

static NEXT_HANDLER: AtomicU64 = AtomicU64::new(0);

/// Identity of one container, as remembered by its devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        HandlerId(NEXT_HANDLER.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// A device's weak link to a container holding it.
pub(crate) struct Handler<D: Device> {
    pub(crate) id: HandlerId,
    pub(crate) state: Weak<RefCell<DevicesState<D>>>,
}

pub(crate) struct DevicesState<D: Device> {
    id: HandlerId,
    devices: BTreeMap<String, D>,
}

impl<D: Device> DevicesState<D> {
    /// Drop the entry stored under `name` (first half of a rename).
    pub(crate) fn detach(&mut self, name: &str) {
        if self.devices.remove(name).is_some() {
            trace!("handler {:?} detached {} `{}`", self.id, D::KIND, name);
        }
    }

    /// Whether a device other than `device` is stored under `name`.
    pub(crate) fn holds_other(&self, name: &str, device: &D) -> bool {
        self.devices
            .get(name)
            .is_some_and(|held| !held.ptr_eq(device))
    }

    /// Store `device` under its current name.
    ///
    /// A different device previously stored under that name is released.
    pub(crate) fn attach(&mut self, device: D) {
        let name = device.name();
        trace!("handler {:?} attached {} `{}`", self.id, D::KIND, name);
        if let Some(displaced) = self.devices.insert(name, device.clone()) {
            if !displaced.ptr_eq(&device) {
                displaced.core().remove_handler(self.id);
            }
        }
    }
}

impl<D: Device> Drop for DevicesState<D> {
    fn drop(&mut self) {
        for device in self.devices.values() {
            device.core().remove_handler(self.id);
        }
    }
}

/// One input item for building or extending a container.
#[derive(Debug, Clone)]
pub enum Member<D: Device> {
    /// A name, resolved through the registry (get-or-create).
    Name(String),
    /// A device, used as it is.
    Device(D),
    /// Every device of another container.
    Group(Devices<D>),
}

impl<D: Device> From<&str> for Member<D> {
    fn from(name: &str) -> Self {
        Member::Name(name.to_owned())
    }
}

impl<D: Device> From<String> for Member<D> {
    fn from(name: String) -> Self {
        Member::Name(name)
    }
}

impl<D: Device> From<Devices<D>> for Member<D> {
    fn from(group: Devices<D>) -> Self {
        Member::Group(group)
    }
}

impl<D: Device> From<&Devices<D>> for Member<D> {
    fn from(group: &Devices<D>) -> Self {
        Member::Group(group.copy())
    }
}

impl From<Node> for Member<Node> {
    fn from(node: Node) -> Self {
        Member::Device(node)
    }
}

impl From<&Node> for Member<Node> {
    fn from(node: &Node) -> Self {
        Member::Device(node.clone())
    }
}

impl From<Element> for Member<Element> {
    fn from(element: Element) -> Self {
        Member::Device(element)
    }
}

impl From<&Element> for Member<Element> {
    fn from(element: &Element) -> Self {
        Member::Device(element.clone())
    }
}

/// Result of a merged name-or-keyword lookup.
#[derive(Debug, Clone)]
pub enum Selection<D: Device> {
    /// The device with the requested name.
    Device(D),
    /// All devices carrying the requested keyword.
    Group(Devices<D>),
}

impl<D: Device> Selection<D> {
    /// The single device, if the name matched.
    pub fn into_device(self) -> Option<D> {
        match self {
            Selection::Device(device) => Some(device),
            Selection::Group(_) => None,
        }
    }

    /// The keyword group, if the keyword matched.
    pub fn into_group(self) -> Option<Devices<D>> {
        match self {
            Selection::Device(_) => None,
            Selection::Group(group) => Some(group),
        }
    }
}

/// A container of devices of one kind, keyed and sorted by name.
///
/// Membership is shared: devices are never copied, and one device may sit
/// in any number of containers. Equality and ordering compare the sets of
/// names only.
pub struct Devices<D: Device> {
    state: Rc<RefCell<DevicesState<D>>>,
    /// Keywords used to narrow down to this container, hidden from
    /// [`Devices::keywords`].
    shadowed: BTreeSet<String>,
    registry: Registry<D>,
}

/// A container of nodes.
pub type Nodes = Devices<Node>;
/// A container of elements.
pub type Elements = Devices<Element>;

impl<D: Device> Devices<D> {
    /// Create an empty container resolving names through `registry`.
    pub fn new(registry: &Registry<D>) -> Self {
        Self::with_shadowed(registry, BTreeSet::new())
    }

    fn with_shadowed(registry: &Registry<D>, shadowed: BTreeSet<String>) -> Self {
        Self {
            state: Rc::new(RefCell::new(DevicesState {
                id: HandlerId::next(),
                devices: BTreeMap::new(),
            })),
            shadowed,
            registry: registry.clone(),
        }
    }

    /// Create a container from names, devices and other containers.
    ///
    /// Names are checked before any device is created.
    pub fn from_members<I, M>(registry: &Registry<D>, members: I) -> Result<Self>
    where
        I: IntoIterator<Item = M>,
        M: Into<Member<D>>,
    {
        let mut devices = Self::new(registry);
        devices.extend(members)?;
        Ok(devices)
    }

    pub(crate) fn from_devices(registry: &Registry<D>, devices: impl IntoIterator<Item = D>) -> Self {
        let container = Self::new(registry);
        for device in devices {
            container.insert(device);
        }
        container
    }

    fn handler(&self) -> Handler<D> {
        Handler {
            id: self.state.borrow().id,
            state: Rc::downgrade(&self.state),
        }
    }

    fn insert(&self, device: D) {
        device.core().add_handler(self.handler());
        self.state.borrow_mut().attach(device);
    }

    fn resolve(&self, members: Vec<Member<D>>) -> Result<Vec<D>> {
        for member in &members {
            if let Member::Name(name) = member {
                check_name::<D>(name)?;
            }
        }
        let mut devices = Vec::new();
        for member in members {
            match member {
                Member::Name(name) => devices.push(self.registry.get_or_create(&name)?),
                Member::Device(device) => devices.push(device),
                Member::Group(group) => devices.extend(group.devices()),
            }
        }
        Ok(devices)
    }

    /// Add a device, a named device or all devices of another container.
    pub fn add_device(&mut self, member: impl Into<Member<D>>) -> Result<()> {
        self.extend([member])
    }

    /// Remove the device with the given name.
    pub fn remove_device(&mut self, key: impl AsDeviceName) -> Result<D> {
        let name = key.device_name().into_owned();
        let removed = self.state.borrow_mut().devices.remove(&name);
        match removed {
            Some(device) => {
                device.core().remove_handler(self.state.borrow().id);
                Ok(device)
            }
            None => Err(Error::DeviceNotFound {
                container: D::GROUP,
                content: D::KIND,
                name,
            }),
        }
    }

    /// Add several members; nothing is added if any name is invalid.
    pub fn extend<I, M>(&mut self, members: I) -> Result<()>
    where
        I: IntoIterator<Item = M>,
        M: Into<Member<D>>,
    {
        let members: Vec<Member<D>> = members.into_iter().map(Into::into).collect();
        for device in self.resolve(members)? {
            self.insert(device);
        }
        Ok(())
    }

    /// Remove several members, ignoring those not held. Names are never
    /// resolved through the registry.
    pub fn subtract<I, M>(&mut self, members: I)
    where
        I: IntoIterator<Item = M>,
        M: Into<Member<D>>,
    {
        for member in members {
            match member.into() {
                Member::Name(name) => {
                    let _ = self.remove_device(name);
                }
                Member::Device(device) => {
                    let _ = self.remove_device(&device);
                }
                Member::Group(group) => {
                    for name in group.names() {
                        let _ = self.remove_device(name);
                    }
                }
            }
        }
    }

    /// The device named `name`.
    pub fn get(&self, name: &str) -> Option<D> {
        self.state.borrow().devices.get(name).cloned()
    }

    /// A new container with all devices carrying `keyword`, or `None` if no
    /// device does.
    ///
    /// The keyword, together with all keywords shadowed here, is shadowed
    /// in the result.
    pub fn select_by_keyword(&self, keyword: &str) -> Option<Self> {
        let selected: Vec<D> = self
            .devices()
            .into_iter()
            .filter(|device| device.has_keyword(keyword))
            .collect();
        if selected.is_empty() {
            return None;
        }
        let mut shadowed = self.shadowed.clone();
        shadowed.insert(keyword.to_owned());
        let devices = Self::with_shadowed(&self.registry, shadowed);
        for device in selected {
            devices.insert(device);
        }
        Some(devices)
    }

    /// Look up a device by name, falling back to a keyword selection.
    pub fn lookup(&self, name: &str) -> Result<Selection<D>> {
        if let Some(device) = self.get(name) {
            return Ok(Selection::Device(device));
        }
        self.select_by_keyword(name)
            .map(Selection::Group)
            .ok_or_else(|| Error::SelectionNotFound {
                container: D::GROUP,
                content: D::KIND,
                name: name.to_owned(),
            })
    }

    /// Keywords of all held devices, without the shadowed ones.
    pub fn keywords(&self) -> BTreeSet<String> {
        self.state
            .borrow()
            .devices
            .values()
            .flat_map(|device| {
                device
                    .keywords()
                    .iter()
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .filter(|keyword| !self.shadowed.contains(keyword))
            .collect()
    }

    pub fn shadowed(&self) -> &BTreeSet<String> {
        &self.shadowed
    }

    /// Device names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.state.borrow().devices.keys().cloned().collect()
    }

    /// Devices, sorted by name.
    pub fn devices(&self) -> Vec<D> {
        self.state.borrow().devices.values().cloned().collect()
    }

    /// Iterate over a snapshot of the devices, sorted by name.
    pub fn iter(&self) -> std::vec::IntoIter<D> {
        self.devices().into_iter()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().devices.is_empty()
    }

    /// Check membership by device or by name.
    pub fn contains(&self, key: impl AsDeviceName) -> bool {
        self.state.borrow().devices.contains_key(&*key.device_name())
    }

    /// A shallow copy: same devices, own membership, no shadowed keywords.
    pub fn copy(&self) -> Self {
        Self::from_devices(&self.registry, self.devices())
    }

    /// Always fails: devices are unique per name and cannot be duplicated.
    pub fn deep_copy(&self) -> Result<Self> {
        Err(Error::Unsupported(format!(
            "deep copying of {} objects is not supported, as it would require to make \
             deep copies of the {} objects themselves, which is in conflict with using \
             their names as identifiers",
            D::GROUP,
            D::KIND
        )))
    }

    /// Always fails: containers only hold devices, added via
    /// [`Devices::add_device`].
    pub fn set_attr(&mut self, name: &str, value: impl Into<Member<D>>) -> Result<()> {
        drop(value);
        Err(Error::Unsupported(format!(
            "setting attribute `{}` of a {} object is ambiguous between adding a {} \
             and storing a plain value",
            name,
            D::GROUP,
            D::KIND
        )))
    }

    /// Remove the device named `name`.
    pub fn del_attr(&mut self, name: &str) -> Result<D> {
        self.remove_device(name)
    }

    /// The registry names are resolved through.
    pub fn registry(&self) -> &Registry<D> {
        &self.registry
    }

    fn name_set(&self) -> BTreeSet<String> {
        self.state.borrow().devices.keys().cloned().collect()
    }
}

impl<D: Device> Clone for Devices<D> {
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl<D: Device> IntoIterator for &Devices<D> {
    type Item = D;
    type IntoIter = std::vec::IntoIter<D>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<D: Device> Add for &Devices<D> {
    type Output = Devices<D>;

    fn add(self, other: &Devices<D>) -> Devices<D> {
        let mut sum = self.copy();
        sum += other;
        sum
    }
}

impl<D: Device> Sub for &Devices<D> {
    type Output = Devices<D>;

    fn sub(self, other: &Devices<D>) -> Devices<D> {
        let mut difference = self.copy();
        difference -= other;
        difference
    }
}

impl<D: Device> AddAssign<&Devices<D>> for Devices<D> {
    fn add_assign(&mut self, other: &Devices<D>) {
        for device in other.devices() {
            self.insert(device);
        }
    }
}

impl<D: Device> SubAssign<&Devices<D>> for Devices<D> {
    fn sub_assign(&mut self, other: &Devices<D>) {
        for name in other.names() {
            let _ = self.remove_device(name);
        }
    }
}

impl<D: Device> PartialEq for Devices<D> {
    fn eq(&self, other: &Self) -> bool {
        self.name_set() == other.name_set()
    }
}

impl<D: Device> Eq for Devices<D> {}

/// Subset order: `a < b` iff the names of `a` are a proper subset of those
/// of `b`. Unrelated containers are incomparable.
impl<D: Device> PartialOrd for Devices<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (mine, theirs) = (self.name_set(), other.name_set());
        if mine == theirs {
            Some(Ordering::Equal)
        } else if mine.is_subset(&theirs) {
            Some(Ordering::Less)
        } else if mine.is_superset(&theirs) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl<D: Device> fmt::Display for Devices<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", D::GROUP)?;
        for (i, name) in self.names().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\"", name)?;
        }
        write!(f, ")")
    }
}

impl<D: Device> fmt::Debug for Devices<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Devices<Node> {
    pub fn prepare_simseries(&self, options: &SeriesOptions) -> Result<()> {
        for node in self {
            node.prepare_simseries(options)?;
        }
        Ok(())
    }

    pub fn prepare_obsseries(&self, options: &SeriesOptions) -> Result<()> {
        for node in self {
            node.prepare_obsseries(options)?;
        }
        Ok(())
    }

    pub fn prepare_allseries(&self, options: &SeriesOptions) -> Result<()> {
        self.prepare_simseries(options)?;
        self.prepare_obsseries(options)
    }

    pub fn load_sim(&self, idx: usize) -> Result<()> {
        for node in self {
            node.load_sim(idx)?;
        }
        Ok(())
    }

    pub fn save_sim(&self, idx: usize) -> Result<()> {
        for node in self {
            node.save_sim(idx)?;
        }
        Ok(())
    }

    pub fn load_obs(&self, idx: usize) -> Result<()> {
        for node in self {
            node.load_obs(idx)?;
        }
        Ok(())
    }

    /// Reset the simulated value of every node.
    pub fn reset(&self) {
        for node in self {
            node.reset();
        }
    }
}

impl Devices<Element> {
    /// Let every model allocate its input series.
    pub fn prepare_inputseries(&self, options: &SeriesOptions) -> Result<()> {
        for element in self {
            element.prepare_inputseries(options)?;
        }
        Ok(())
    }

    pub fn prepare_fluxseries(&self, options: &SeriesOptions) -> Result<()> {
        for element in self {
            element.prepare_fluxseries(options)?;
        }
        Ok(())
    }

    pub fn prepare_stateseries(&self, options: &SeriesOptions) -> Result<()> {
        for element in self {
            element.prepare_stateseries(options)?;
        }
        Ok(())
    }

    /// All three groups, element by element in name order.
    pub fn prepare_allseries(&self, options: &SeriesOptions) -> Result<()> {
        for element in self {
            element.prepare_allseries(options)?;
        }
        Ok(())
    }

    /// Re-wire the model of every element.
    pub fn connect(&self) -> Result<()> {
        for element in self {
            element.connect(None)?;
        }
        debug!("connected {} element model(s)", self.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementSpec;
    use crate::error::ErrorKind;
    use crate::model::{Model, ModelError};
    use crate::node::NodeSpec;
    use crate::series::SeriesGroup;

    fn nodes(registry: &Registry<Node>, names: &[&str]) -> Nodes {
        Nodes::from_members(registry, names.iter().copied()).unwrap()
    }

    /// Nodes `na`, `nb` without keywords plus three grouped ones.
    fn grouped() -> (Registry<Node>, Nodes) {
        let registry = Registry::new();
        for (name, keywords) in [
            ("nc", ["group_a", "group_1"]),
            ("nd", ["group_a", "group_2"]),
            ("ne", ["group_b", "group_1"]),
        ] {
            registry
                .build_node(NodeSpec::new(name).keywords(keywords))
                .unwrap();
        }
        let all = nodes(&registry, &["na", "nb", "nc", "nd", "ne"]);
        (registry, all)
    }

    #[test]
    fn test_display_sorted() {
        let registry = Registry::new();
        let n = nodes(&registry, &["nb", "na"]);
        assert_eq!(n.to_string(), r#"Nodes("na", "nb")"#);
        assert_eq!(n.names(), vec!["na", "nb"]);
        assert_eq!(Nodes::new(&registry).to_string(), "Nodes()");
    }

    #[test]
    fn test_mixed_members() {
        let registry = Registry::<Node>::new();
        let group = nodes(&registry, &["a", "b"]);
        let c = registry.get_or_create("c").unwrap();
        let all = Nodes::from_members(
            &registry,
            [Member::from("d"), Member::from(&c), Member::from(&group)],
        )
        .unwrap();
        assert_eq!(all.names(), vec!["a", "b", "c", "d"]);
        assert!(all.get("a").unwrap().ptr_eq(&registry.get("a").unwrap()));
    }

    #[test]
    fn test_invalid_member_adds_nothing() {
        let registry = Registry::<Node>::new();
        let err = Nodes::from_members(&registry, ["ok", "not ok"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_and_remove() {
        let registry = Registry::<Node>::new();
        let mut n = nodes(&registry, &["old_node"]);
        n.add_device("new_node").unwrap();
        assert_eq!(n.to_string(), r#"Nodes("new_node", "old_node")"#);
        let new_node = n.get("new_node").unwrap();
        assert_eq!(new_node.handler_count(), 1);

        let removed = n.remove_device("new_node").unwrap();
        assert!(removed.ptr_eq(&new_node));
        assert_eq!(new_node.handler_count(), 0);

        let err = n.remove_device("new_node").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Nodes object does not handle a Node named `new_node`"
        );
    }

    #[test]
    fn test_algebra() {
        let registry = Registry::<Node>::new();
        let a = nodes(&registry, &["n1", "n2"]);
        let b = nodes(&registry, &["n2", "n3"]);

        assert!((&a - &a).is_empty());
        assert_eq!(&a + &a, a);
        let sum = &a + &b;
        assert!(a <= sum && b <= sum);
        assert!(a < sum);
        assert!(!(sum < sum));
        assert_eq!(sum.names(), vec!["n1", "n2", "n3"]);
        assert_eq!((&sum - &b).names(), vec!["n1"]);
        assert_eq!(a.partial_cmp(&b), None);
        assert!(a != b);

        // Operands stay untouched.
        assert_eq!(a.names(), vec!["n1", "n2"]);

        let mut c = a.copy();
        c += &b;
        assert_eq!(c, sum);
        c -= &a;
        assert_eq!(c.names(), vec!["n3"]);
        c -= &a;
        assert_eq!(c.names(), vec!["n3"]);
    }

    #[test]
    fn test_subtract_ignores_missing() {
        let registry = Registry::<Node>::new();
        let mut n = nodes(&registry, &["a", "b"]);
        n.subtract(["b", "zz"]);
        assert_eq!(n.names(), vec!["a"]);
        assert!(!registry.contains("zz"));
    }

    #[test]
    fn test_keyword_drill_down() {
        let (_registry, all) = grouped();
        assert_eq!(
            all.keywords().into_iter().collect::<Vec<_>>(),
            vec!["group_1", "group_2", "group_a", "group_b"]
        );

        let group_a = all.select_by_keyword("group_a").unwrap();
        assert_eq!(group_a.names(), vec!["nc", "nd"]);

        let sub = group_a.select_by_keyword("group_1").unwrap();
        assert_eq!(sub.names(), vec!["nc"]);
        assert!(sub.keywords().is_empty());
        assert_eq!(
            sub.shadowed().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["group_1", "group_a"]
        );

        let copy = sub.copy();
        assert!(copy.shadowed().is_empty());
        assert_eq!(
            copy.keywords().into_iter().collect::<Vec<_>>(),
            vec!["group_1", "group_a"]
        );
        assert!(all.select_by_keyword("group_x").is_none());
    }

    #[test]
    fn test_lookup() {
        let (_registry, all) = grouped();
        let device = all.lookup("nc").unwrap().into_device().unwrap();
        assert_eq!(device.name(), "nc");
        let group = all.lookup("group_1").unwrap().into_group().unwrap();
        assert_eq!(group.to_string(), r#"Nodes("nc", "ne")"#);
        let err = all.lookup("missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Nodes object handles no Node with name or keyword `missing`"
        );
    }

    #[test]
    fn test_copy_is_shallow() {
        let registry = Registry::<Node>::new();
        let old = nodes(&registry, &["na", "nb"]);
        let mut new = old.clone();
        assert_eq!(new, old);
        assert!(new.get("na").unwrap().ptr_eq(&old.get("na").unwrap()));
        assert_eq!(old.get("na").unwrap().handler_count(), 2);

        new.remove_device("na").unwrap();
        assert!(old.contains("na"));
        assert!(old.deep_copy().is_err());
    }

    #[test]
    fn test_attributes() {
        let registry = Registry::<Node>::new();
        let mut n = nodes(&registry, &["na"]);
        let err = n.set_attr("nb", "nb").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(n.del_attr("na").is_ok());
        assert_eq!(n.del_attr("na").unwrap_err().kind(), ErrorKind::NotFound);
        let err = n.deep_copy().unwrap_err();
        assert!(err.to_string().contains("deep copying of Nodes objects"));
    }

    #[test]
    fn test_rename_follows_all_containers() {
        let registry = Registry::<Node>::new();
        let c1 = nodes(&registry, &["n1", "x"]);
        let c2 = nodes(&registry, &["n1"]);
        let node = registry.get("n1").unwrap();

        node.set_name("n2").unwrap();
        for container in [&c1, &c2] {
            assert!(!container.contains("n1"));
            assert!(container.contains("n2"));
            assert!(container.get("n2").unwrap().ptr_eq(&node));
        }
        assert!(registry.get("n1").is_none());
        assert!(registry.get("n2").unwrap().ptr_eq(&node));
        assert_eq!(c1.names(), vec!["n2", "x"]);
    }

    #[test]
    fn test_rename_onto_registered_name_fails() {
        let registry = Registry::<Node>::new();
        let c = nodes(&registry, &["a", "b"]);
        let a = registry.get("a").unwrap();
        let err = a.set_name("b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(c.names(), vec!["a", "b"]);
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn test_drop_detaches_handlers() {
        let registry = Registry::<Node>::new();
        let node = registry.get_or_create("n").unwrap();
        {
            let _c1 = nodes(&registry, &["n"]);
            let _c2 = _c1.copy();
            assert_eq!(node.handler_count(), 2);
        }
        assert_eq!(node.handler_count(), 0);
        node.set_name("m").unwrap();
    }

    #[test]
    fn test_equality_ignores_identity() {
        let r1 = Registry::<Node>::new();
        let r2 = Registry::<Node>::new();
        let a = nodes(&r1, &["x", "y"]);
        let b = nodes(&r2, &["y", "x"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bulk_series() {
        let registry = Registry::<Node>::new();
        let n = nodes(&registry, &["a", "b"]);
        n.prepare_allseries(&SeriesOptions::new(2)).unwrap();
        for node in &n {
            node.sim().set_value(1.0);
        }
        n.save_sim(1).unwrap();
        n.reset();
        assert!(n.iter().all(|node| node.sim().value() == 0.0));
        n.load_sim(1).unwrap();
        assert!(n.iter().all(|node| node.sim().value() == 1.0));
        assert!(n.load_obs(2).is_err());
    }

    #[test]
    fn test_rename_onto_foreign_member_fails() {
        let registry = Registry::<Node>::new();
        let foreign = Registry::<Node>::new().get_or_create("b").unwrap();
        let mut c = nodes(&registry, &["a"]);
        c.add_device(&foreign).unwrap();
        assert!(c.registry().get("b").is_none());

        let a = registry.get("a").unwrap();
        let err = a.set_name("b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(c.names(), vec!["a", "b"]);
        assert!(c.get("b").unwrap().ptr_eq(&foreign));
        assert_eq!(a.handler_count(), 1);
    }

    #[test]
    fn test_registry_resolves_names() {
        let registry = Registry::<Node>::new();
        let mut c = Nodes::new(&registry);
        c.add_device("fresh").unwrap();
        assert!(c.registry().get("fresh").unwrap().ptr_eq(&c.get("fresh").unwrap()));
        assert_eq!(c.registry().len(), 1);
    }

    #[derive(Debug)]
    struct Recorder {
        element: String,
        calls: Rc<RefCell<Vec<(String, SeriesGroup, usize)>>>,
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
            self.calls
                .borrow_mut()
                .push((self.element.clone(), group, options.steps));
            Ok(())
        }
    }

    #[test]
    fn test_bulk_element_series() {
        let nodes = Registry::<Node>::new();
        let elements = Registry::<Element>::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        for name in ["e2", "e1"] {
            let element = elements
                .build_element(&nodes, ElementSpec::new(name).inlets("a"))
                .unwrap();
            element.set_model(Box::new(Recorder {
                element: name.to_owned(),
                calls: Rc::clone(&calls),
            }));
        }
        let all = elements.snapshot();
        let recorded = |group: SeriesGroup| {
            calls
                .borrow()
                .iter()
                .filter(|(_, g, _)| *g == group)
                .map(|(name, _, steps)| (name.clone(), *steps))
                .collect::<Vec<_>>()
        };

        all.prepare_inputseries(&SeriesOptions::new(1)).unwrap();
        all.prepare_fluxseries(&SeriesOptions::new(2)).unwrap();
        all.prepare_stateseries(&SeriesOptions::new(3)).unwrap();
        assert_eq!(calls.borrow().len(), 6);
        let expect = |steps: usize| vec![("e1".to_owned(), steps), ("e2".to_owned(), steps)];
        assert_eq!(recorded(SeriesGroup::Inputs), expect(1));
        assert_eq!(recorded(SeriesGroup::Fluxes), expect(2));
        assert_eq!(recorded(SeriesGroup::States), expect(3));

        calls.borrow_mut().clear();
        all.prepare_allseries(&SeriesOptions::new(5)).unwrap();
        let order: Vec<_> = calls
            .borrow()
            .iter()
            .map(|(name, group, _)| (name.clone(), *group))
            .collect();
        assert_eq!(
            order,
            vec![
                ("e1".to_owned(), SeriesGroup::Inputs),
                ("e1".to_owned(), SeriesGroup::Fluxes),
                ("e1".to_owned(), SeriesGroup::States),
                ("e2".to_owned(), SeriesGroup::Inputs),
                ("e2".to_owned(), SeriesGroup::Fluxes),
                ("e2".to_owned(), SeriesGroup::States),
            ]
        );
    }
}
