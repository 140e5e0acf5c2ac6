//! The host environment.

use crate::error::ResolveError;
use crate::lookup::{AddrSource, SystemAddrSource};
use crate::resolver::{Resolver, TxtRecords};
use crate::teardown::Teardown;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

//------------ Env -----------------------------------------------------------

/// The environment resolvers and lookups live in.
///
/// The environment provides the teardown coordination for everything
/// created within it, the source for address lookups, and a global
/// resolver shared by everyone who doesn’t need their own.
///
/// An environment is bound to the thread it was created on. Values of this
/// type are cheap handles that can be cloned freely.
#[derive(Clone)]
pub struct Env {
    inner: Rc<EnvInner>,
}

struct EnvInner {
    /// The teardown coordinator.
    teardown: Rc<Teardown>,

    /// Where address lookups go.
    source: Arc<dyn AddrSource>,

    /// The global resolver once it has been created.
    global: RefCell<Option<Resolver>>,
}

impl Env {
    /// Creates a new environment using the system resolver for lookups.
    pub fn new() -> Self {
        Self::with_addr_source(SystemAddrSource)
    }

    /// Creates a new environment using the given source for lookups.
    pub fn with_addr_source(source: impl AddrSource) -> Self {
        Env {
            inner: Rc::new(EnvInner {
                teardown: Teardown::new(),
                source: Arc::new(source),
                global: RefCell::new(None),
            }),
        }
    }

    /// Tears down the environment.
    ///
    /// Shuts down all resolvers and cancels all lookups created within the
    /// environment and resolves once they have all released their
    /// resources. Creating new resolvers or starting new lookups fails
    /// once teardown has started.
    pub async fn teardown(&self) {
        self.inner.teardown.run().await
    }

    /// Returns whether teardown has started.
    pub fn is_tearing_down(&self) -> bool {
        self.inner.teardown.is_started()
    }

    /// Returns the number of resources teardown is waiting for.
    pub fn outstanding(&self) -> usize {
        self.inner.teardown.outstanding()
    }

    /// Returns the global resolver.
    ///
    /// The resolver is created with the system configuration on first use.
    pub fn global_resolver(&self) -> Result<Resolver, ResolveError> {
        let mut global = self.inner.global.borrow_mut();
        if let Some(resolver) = global.as_ref() {
            return Ok(resolver.clone());
        }
        let resolver = Resolver::new(self)?;
        *global = Some(resolver.clone());
        Ok(resolver)
    }

    /// Resolves the TXT records for `name` using the global resolver.
    pub async fn resolve_txt(
        &self,
        name: &str,
    ) -> Result<TxtRecords, ResolveError> {
        self.global_resolver()?.resolve_txt(name).await
    }

    pub(crate) fn coordinator(&self) -> &Rc<Teardown> {
        &self.inner.teardown
    }

    pub(crate) fn addr_source(&self) -> Arc<dyn AddrSource> {
        self.inner.source.clone()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Env")
            .field("tearing_down", &self.is_tearing_down())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
