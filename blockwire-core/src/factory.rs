//! Factories create extensions in groups; groups share a start/stop lifecycle.
//!
//! The core never owns a running transport. Anything a factory creates is a
//! [`GroupMember`]: the daemon's HTTP service implements it, tests use mocks.
//! Callers own the members; factories and groups only hold weak handles.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::registry::{Registries, RegistryError};

const ANONYMOUS: &str = "anonymous";

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("cannot start {name}: {reason}")]
    Start { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("group {0:?} already exists")]
    GroupExists(String),
    #[error("a group needs at least one extension")]
    EmptyGroup,
    #[error("{member} already belongs to another {what}")]
    AlreadyOwned { member: String, what: &'static str },
    #[error("factory {factory} failed: {reason}")]
    Create { factory: String, reason: String },
    #[error("factory {0} created no extensions")]
    NothingCreated(String),
}

/// A startable extension as seen by its factory and group.
pub trait GroupMember: Send + Sync {
    fn name(&self) -> &str;
    fn start(&self) -> Result<(), ServiceError>;
    fn stop(&self);
    fn running(&self) -> bool;
    fn membership(&self) -> &Membership;
}

/// Which factory and group a member belongs to. Each can be set once.
#[derive(Debug, Default)]
pub struct Membership {
    factory: OnceLock<u64>,
    group: OnceLock<(u64, String)>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Option<u64> {
        self.factory.get().copied()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.get().map(|(_, name)| name.as_str())
    }

    pub(crate) fn define_factory(&self, member: &str, factory: u64) -> Result<(), FactoryError> {
        if *self.factory.get_or_init(|| factory) != factory {
            return Err(FactoryError::AlreadyOwned {
                member: member.to_string(),
                what: "factory",
            });
        }
        Ok(())
    }

    pub(crate) fn define_group(
        &self,
        member: &str,
        factory: u64,
        group: &str,
    ) -> Result<(), FactoryError> {
        let (f, g) = self.group.get_or_init(|| (factory, group.to_string()));
        if *f != factory || g != group {
            return Err(FactoryError::AlreadyOwned {
                member: member.to_string(),
                what: "group",
            });
        }
        Ok(())
    }
}

/// The concrete half of a factory: build the members of group `group_name`.
pub trait CreateExtensions: Send + Sync {
    fn do_create(&self, group_name: &str) -> Result<Vec<Arc<dyn GroupMember>>, FactoryError>;
}

impl<F> CreateExtensions for F
where
    F: Fn(&str) -> Result<Vec<Arc<dyn GroupMember>>, FactoryError> + Send + Sync,
{
    fn do_create(&self, group_name: &str) -> Result<Vec<Arc<dyn GroupMember>>, FactoryError> {
        self(group_name)
    }
}

/// What one [`ExtensionFactory::create`] produced. `group` is set when more than one
/// member was created.
pub struct Created {
    pub name: String,
    pub members: Vec<Arc<dyn GroupMember>>,
    pub group: Option<Arc<ExtensionGroup>>,
}

impl Created {
    /// Start every member; stops at the first failure.
    pub fn start(&self) -> Result<(), ServiceError> {
        self.members.iter().try_for_each(|m| m.start())
    }

    pub fn stop(&self) {
        for m in &self.members {
            m.stop();
        }
    }

    pub fn running(&self) -> bool {
        self.members.iter().all(|m| m.running())
    }
}

#[derive(Default)]
struct FactoryState {
    extensions: Vec<Weak<dyn GroupMember>>,
    groups: BTreeMap<String, Arc<ExtensionGroup>>,
    next_index: u64,
}

pub struct ExtensionFactory {
    id: u64,
    name: Option<String>,
    creator: Box<dyn CreateExtensions>,
    state: Mutex<FactoryState>,
}

impl ExtensionFactory {
    /// A factory that is not registered anywhere.
    pub fn anonymous(creator: impl CreateExtensions + 'static) -> Arc<Self> {
        Arc::new(Self::with_name(None, Box::new(creator)))
    }

    /// A factory registered under `name`.
    pub fn named(
        registries: &Registries,
        name: &str,
        creator: impl CreateExtensions + 'static,
    ) -> Result<Arc<Self>, RegistryError> {
        let factory = Arc::new(Self::with_name(Some(name.to_string()), Box::new(creator)));
        registries.factories.register(name, Arc::clone(&factory))?;
        Ok(factory)
    }

    fn with_name(name: Option<String>, creator: Box<dyn CreateExtensions>) -> Self {
        Self {
            id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
            name,
            creator,
            state: Mutex::new(FactoryState {
                next_index: 1,
                ..Default::default()
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS)
    }

    /// Create the members of one group. Without `group_name` the next free number is
    /// used. The creator runs under the factory lock and must not call back into it.
    pub fn create(&self, group_name: Option<&str>) -> Result<Created, FactoryError> {
        let mut state = self.state.lock();
        let (name, generated) = match group_name {
            Some(n) if state.groups.contains_key(n) => {
                return Err(FactoryError::GroupExists(n.to_string()))
            }
            Some(n) => (n.to_string(), false),
            None => {
                while state.groups.contains_key(&state.next_index.to_string()) {
                    state.next_index += 1;
                }
                (state.next_index.to_string(), true)
            }
        };

        let members = self.creator.do_create(&name)?;
        if members.is_empty() {
            return Err(FactoryError::NothingCreated(self.name().to_string()));
        }
        for m in &members {
            m.membership().define_factory(m.name(), self.id)?;
        }
        state.extensions.retain(|w| w.strong_count() > 0);
        state.extensions.extend(members.iter().map(Arc::downgrade));

        let group = if members.len() > 1 {
            let group = ExtensionGroup::new(self.id, &name, &members)?;
            state.groups.insert(name.clone(), Arc::clone(&group));
            if generated {
                state.next_index += 1;
            }
            Some(group)
        } else {
            None
        };
        info!(factory = %self.name(), group = %name, members = members.len(), "created extensions");
        Ok(Created {
            name,
            members,
            group,
        })
    }

    /// Names of the groups created so far.
    pub fn groups(&self) -> Vec<String> {
        self.state.lock().groups.keys().cloned().collect()
    }

    pub fn group(&self, name: &str) -> Result<Arc<ExtensionGroup>, RegistryError> {
        self.state
            .lock()
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "group",
                name: name.to_string(),
            })
    }

    /// Created members that are still alive.
    pub fn extensions(&self) -> Vec<Arc<dyn GroupMember>> {
        self.state
            .lock()
            .extensions
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

/// A fixed, non-empty set of co-created members.
pub struct ExtensionGroup {
    factory: u64,
    name: String,
    members: Vec<Weak<dyn GroupMember>>,
}

impl ExtensionGroup {
    pub fn new(
        factory: u64,
        name: &str,
        members: &[Arc<dyn GroupMember>],
    ) -> Result<Arc<Self>, FactoryError> {
        if members.is_empty() {
            return Err(FactoryError::EmptyGroup);
        }
        for m in members {
            m.membership().define_group(m.name(), factory, name)?;
        }
        Ok(Arc::new(Self {
            factory,
            name: name.to_string(),
            members: members.iter().map(Arc::downgrade).collect(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> u64 {
        self.factory
    }

    /// Members that are still alive.
    pub fn extensions(&self) -> Vec<Arc<dyn GroupMember>> {
        self.members.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn start(&self) -> Result<(), ServiceError> {
        for m in self.extensions() {
            debug!(group = %self.name, member = m.name(), "start");
            m.start()?;
        }
        Ok(())
    }

    pub fn stop(&self) {
        for m in self.extensions() {
            m.stop();
        }
    }

    /// True when every live member is running.
    pub fn running(&self) -> bool {
        self.extensions().iter().all(|m| m.running())
    }
}

/// Where a port generator draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSeed {
    /// Ascend from this port. `0` ("any port") repeats forever.
    Fixed(u16),
    /// Exactly these ports, then stop.
    List(Vec<u16>),
}

impl From<u16> for PortSeed {
    fn from(port: u16) -> Self {
        PortSeed::Fixed(port)
    }
}

impl From<Vec<u16>> for PortSeed {
    fn from(ports: Vec<u16>) -> Self {
        PortSeed::List(ports)
    }
}

impl From<&[u16]> for PortSeed {
    fn from(ports: &[u16]) -> Self {
        PortSeed::List(ports.to_vec())
    }
}

pub struct PortGenerator {
    inner: Ports,
}

enum Ports {
    Any,
    Ascending(Option<u16>),
    List(std::vec::IntoIter<u16>),
}

impl Iterator for PortGenerator {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        match &mut self.inner {
            Ports::Any => Some(0),
            Ports::Ascending(next) => {
                let port = (*next)?;
                *next = port.checked_add(1);
                Some(port)
            }
            Ports::List(ports) => ports.next(),
        }
    }
}

/// Ports for the members of a group, one per member.
pub fn port_generator(seed: impl Into<PortSeed>) -> PortGenerator {
    let inner = match seed.into() {
        PortSeed::Fixed(0) => Ports::Any,
        PortSeed::Fixed(p) => Ports::Ascending(Some(p)),
        PortSeed::List(ports) => Ports::List(ports.into_iter()),
    };
    PortGenerator { inner }
}
