//! Component class descriptors and interface-set discovery.
//!
//! A [`ComponentClass`] describes a concrete component type: its name, an
//! optional superclass and the interfaces it declares directly. The
//! [`InterfaceSet`] is the transitive closure of those interfaces, which is
//! what a proxy for the class is allowed to answer for.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Administrative interfaces excluded from proxies by default.
pub const ADMINISTRATIVE_INTERFACES: &[&str] = &["Disposable", "Initializable", "Recyclable"];

/// A named interface, possibly extending other interfaces.
///
/// Interfaces are identified by name.
#[derive(Clone)]
pub struct Interface(Arc<InterfaceDef>);

struct InterfaceDef {
    name: String,
    extends: Vec<Interface>,
}

impl Interface {
    /// Creates a root interface.
    pub fn new(name: impl Into<String>) -> Self {
        Self::extending(name, [])
    }

    /// Creates an interface extending `parents`.
    pub fn extending(
        name: impl Into<String>,
        parents: impl IntoIterator<Item = Interface>,
    ) -> Self {
        Self(Arc::new(InterfaceDef {
            name: name.into(),
            extends: parents.into_iter().collect(),
        }))
    }

    /// Returns the interface name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the directly extended interfaces.
    pub fn extends(&self) -> &[Interface] {
        &self.0.extends
    }

    /// Returns true if this interface is `name` or transitively extends it.
    pub fn is_subtype_of(&self, name: &str) -> bool {
        let mut stack = vec![self];
        let mut seen = HashSet::new();
        while let Some(iface) = stack.pop() {
            if iface.name() == name {
                return true;
            }
            if seen.insert(iface.name()) {
                stack.extend(iface.extends());
            }
        }
        false
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Interface {}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Interface").field(&self.name()).finish()
    }
}

/// Descriptor of a concrete component type.
#[derive(Clone)]
pub struct ComponentClass(Arc<ClassDef>);

#[derive(Clone)]
struct ClassDef {
    name: String,
    superclass: Option<ComponentClass>,
    interfaces: Vec<Interface>,
}

impl ComponentClass {
    /// Creates a class with no superclass and no interfaces.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(ClassDef {
            name: name.into(),
            superclass: None,
            interfaces: Vec::new(),
        }))
    }

    /// Adds a directly implemented interface.
    pub fn implements(self, interface: Interface) -> Self {
        let mut def = self.into_def();
        def.interfaces.push(interface);
        Self(Arc::new(def))
    }

    /// Sets the superclass.
    pub fn extends(self, superclass: ComponentClass) -> Self {
        let mut def = self.into_def();
        def.superclass = Some(superclass);
        Self(Arc::new(def))
    }

    fn into_def(self) -> ClassDef {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Returns the class name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the superclass, if any.
    pub fn superclass(&self) -> Option<&ComponentClass> {
        self.0.superclass.as_ref()
    }

    /// Returns the interfaces declared directly on this class.
    pub fn declared_interfaces(&self) -> &[Interface] {
        &self.0.interfaces
    }

    /// Iterates over this class and its superclasses, nearest first.
    pub fn ancestry(&self) -> impl Iterator<Item = &ComponentClass> {
        std::iter::successors(Some(self), |class| class.superclass())
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name())
            .field("superclass", &self.superclass().map(|s| s.name()))
            .field("interfaces", &self.0.interfaces)
            .finish()
    }
}

/// The interfaces a proxy for a component class implements.
#[derive(Clone, Default)]
pub struct InterfaceSet {
    members: BTreeMap<String, Interface>,
}

impl InterfaceSet {
    /// Discovers the interface set of `class`, excluding [`ADMINISTRATIVE_INTERFACES`].
    pub fn discover(class: &ComponentClass) -> Self {
        Self::discover_excluding(class, ADMINISTRATIVE_INTERFACES)
    }

    /// Discovers the interface set of `class`, excluding the named interfaces.
    ///
    /// Excluded interfaces are skipped but the interfaces they extend are
    /// still collected.
    pub fn discover_excluding(class: &ComponentClass, denylist: &[&str]) -> Self {
        let mut members = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut pending: Vec<&Interface> = class
            .ancestry()
            .flat_map(|c| c.declared_interfaces())
            .collect();

        while let Some(iface) = pending.pop() {
            if !visited.insert(iface.name()) {
                continue;
            }
            if !denylist.contains(&iface.name()) {
                members.insert(iface.name().to_string(), iface.clone());
            }
            pending.extend(iface.extends());
        }

        Self { members }
    }

    /// Returns true if the set contains the named interface.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Returns the named interface.
    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.members.get(name)
    }

    /// Returns the number of interfaces.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over the interfaces.
    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.members.values()
    }

    /// Iterates over the interface names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

impl fmt::Debug for InterfaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
