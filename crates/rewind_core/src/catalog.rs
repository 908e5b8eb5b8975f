//! Catalog handles.
//!
//! A catalog is a named, independently keyed table inside an environment.
//! Handles are cheap to clone. Releasing one with
//! [`crate::Environment::close_catalog`] invalidates every clone; later use
//! fails with [`RewindError::CatalogClosed`]. A handle is also refused by
//! any environment other than the open it came from, including a later
//! reopen of the same path.

use crate::error::{RewindError, RewindResult};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Display name used for the engine's unnamed root catalog.
const ROOT_NAME: &str = "<root>";

/// Handle to an open catalog of an environment.
#[derive(Clone)]
pub struct Catalog<C> {
    id: u32,
    name: Option<Arc<str>>,
    handle: C,
    owner: Arc<RegistryToken>,
}

impl<C: Copy> Catalog<C> {
    /// Returns the catalog name, or `None` for the root catalog.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the registry id of this handle.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn handle(&self) -> C {
        self.handle
    }

    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(ROOT_NAME)
    }
}

impl<C: fmt::Debug> fmt::Debug for Catalog<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("id", &self.id)
            .field("name", &self.name.as_deref().unwrap_or(ROOT_NAME))
            .field("handle", &self.handle)
            .finish()
    }
}

/// Identity of one registry. Compared by address only.
#[derive(Debug, Default)]
struct RegistryToken;

/// Tracks which catalog handles of an environment are still open.
#[derive(Debug, Default)]
pub(crate) struct CatalogRegistry {
    token: Arc<RegistryToken>,
    next_id: AtomicU32,
    open: RwLock<HashSet<u32>>,
}

impl CatalogRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers an engine handle and returns the public catalog.
    pub(crate) fn register<C>(&self, name: Option<&str>, handle: C) -> Catalog<C> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.open.write().insert(id);
        Catalog {
            id,
            name: name.map(Arc::from),
            handle,
            owner: Arc::clone(&self.token),
        }
    }

    fn owns<C>(&self, catalog: &Catalog<C>) -> bool {
        Arc::ptr_eq(&catalog.owner, &self.token)
    }

    /// Releases `catalog`. Returns false if it was already released or
    /// belongs to another registry.
    pub(crate) fn release<C>(&self, catalog: &Catalog<C>) -> bool {
        self.owns(catalog) && self.open.write().remove(&catalog.id)
    }

    /// Releases every handle.
    pub(crate) fn release_all(&self) -> usize {
        let mut open = self.open.write();
        let count = open.len();
        open.clear();
        count
    }

    /// Fails if `catalog` has been released or was issued by another registry.
    pub(crate) fn ensure_open<C: Copy>(&self, catalog: &Catalog<C>) -> RewindResult<()> {
        if self.owns(catalog) && self.open.read().contains(&catalog.id) {
            Ok(())
        } else {
            Err(RewindError::CatalogClosed {
                name: catalog.display_name().to_string(),
            })
        }
    }
}
