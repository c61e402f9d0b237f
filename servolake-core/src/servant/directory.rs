use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::debug;

use super::{Cookie, Located, Servant, ServantLocator};
use crate::{fault::DispatchFault, identity::Identity, request::RequestDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("servant `{id}` facet `{facet}` is already registered")]
    AlreadyRegistered { id: Identity, facet: String },
    #[error("servant `{id}` facet `{facet}` is not registered")]
    NotRegistered { id: Identity, facet: String },
    #[error("a locator for category `{0}` is already registered")]
    LocatorAlreadyRegistered(String),
    #[error("no locator is registered for category `{0}`")]
    LocatorNotRegistered(String),
}

/// A servant chosen for a request. `locator` is set when a locator produced it; the
/// locator must then be told when the dispatch is finished.
pub struct Resolved {
    pub servant: Arc<dyn Servant>,
    pub locator: Option<(Arc<dyn ServantLocator>, Cookie)>,
}

#[derive(Default)]
struct Registry {
    servants: HashMap<Identity, HashMap<String, Arc<dyn Servant>>>,
    locators: HashMap<String, Arc<dyn ServantLocator>>,
}

/// Maps `(identity, facet)` to servants and categories to locators.
///
/// Readers share the lock; registration takes it exclusively. Locator callbacks always
/// run after the lock is released.
#[derive(Default)]
pub struct ServantDirectory {
    inner: RwLock<Registry>,
}

impl ServantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, servant: Arc<dyn Servant>, id: Identity) -> Result<(), DirectoryError> {
        self.add_facet(servant, id, "")
    }

    pub fn add_facet(
        &self,
        servant: Arc<dyn Servant>,
        id: Identity,
        facet: &str,
    ) -> Result<(), DirectoryError> {
        let mut registry = self.write();
        let facets = registry.servants.entry(id.clone()).or_default();
        if facets.contains_key(facet) {
            return Err(DirectoryError::AlreadyRegistered {
                id,
                facet: facet.to_owned(),
            });
        }
        facets.insert(facet.to_owned(), servant);
        Ok(())
    }

    pub fn remove(&self, id: &Identity) -> Result<Arc<dyn Servant>, DirectoryError> {
        self.remove_facet(id, "")
    }

    pub fn remove_facet(
        &self,
        id: &Identity,
        facet: &str,
    ) -> Result<Arc<dyn Servant>, DirectoryError> {
        let mut registry = self.write();
        let not_registered = || DirectoryError::NotRegistered {
            id: id.clone(),
            facet: facet.to_owned(),
        };
        let facets = registry.servants.get_mut(id).ok_or_else(not_registered)?;
        let servant = facets.remove(facet).ok_or_else(not_registered)?;
        if facets.is_empty() {
            registry.servants.remove(id);
        }
        Ok(servant)
    }

    /// Remove every facet registered under `id`.
    pub fn remove_all_facets(
        &self,
        id: &Identity,
    ) -> Result<HashMap<String, Arc<dyn Servant>>, DirectoryError> {
        self.write()
            .servants
            .remove(id)
            .ok_or_else(|| DirectoryError::NotRegistered {
                id: id.clone(),
                facet: String::new(),
            })
    }

    /// True when any facet is registered under `id`.
    pub fn has_servant(&self, id: &Identity) -> bool {
        self.read().servants.contains_key(id)
    }

    pub fn find_servant(&self, id: &Identity, facet: &str) -> Option<Arc<dyn Servant>> {
        self.read()
            .servants
            .get(id)
            .and_then(|facets| facets.get(facet))
            .cloned()
    }

    pub fn add_servant_locator(
        &self,
        locator: Arc<dyn ServantLocator>,
        category: &str,
    ) -> Result<(), DirectoryError> {
        let mut registry = self.write();
        if registry.locators.contains_key(category) {
            return Err(DirectoryError::LocatorAlreadyRegistered(category.to_owned()));
        }
        registry.locators.insert(category.to_owned(), locator);
        Ok(())
    }

    pub fn remove_servant_locator(
        &self,
        category: &str,
    ) -> Result<Arc<dyn ServantLocator>, DirectoryError> {
        let locator = self
            .write()
            .locators
            .remove(category)
            .ok_or_else(|| DirectoryError::LocatorNotRegistered(category.to_owned()))?;
        locator.deactivate(category);
        Ok(locator)
    }

    pub fn find_servant_locator(&self, category: &str) -> Option<Arc<dyn ServantLocator>> {
        self.read().locators.get(category).cloned()
    }

    /// Deactivate every locator and forget all registrations.
    pub fn destroy(&self) {
        let locators = {
            let mut registry = self.write();
            registry.servants.clear();
            std::mem::take(&mut registry.locators)
        };
        for (category, locator) in locators {
            debug!("deactivating servant locator for category `{category}`");
            locator.deactivate(&category);
        }
    }

    /// Find the servant for `current`: direct registration, then the category locator,
    /// then the default locator.
    pub fn resolve(&self, current: &RequestDescriptor) -> Result<Resolved, DispatchFault> {
        let (category_locator, default_locator) = {
            let registry = self.read();
            if let Some(servant) = registry
                .servants
                .get(&current.id)
                .and_then(|facets| facets.get(&current.facet))
            {
                return Ok(Resolved {
                    servant: servant.clone(),
                    locator: None,
                });
            }
            let category_locator = if current.id.category.is_empty() {
                None
            } else {
                registry.locators.get(&current.id.category).cloned()
            };
            (category_locator, registry.locators.get("").cloned())
        };

        for locator in category_locator.into_iter().chain(default_locator) {
            if let Some(Located { servant, cookie }) = locator.locate(current)? {
                return Ok(Resolved {
                    servant,
                    locator: Some((locator, cookie)),
                });
            }
        }

        if self.has_servant(&current.id) {
            Err(DispatchFault::facet_not_exist())
        } else {
            Err(DispatchFault::object_not_exist())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;
    use crate::{
        dispatch::DispatchContext,
        servant::Dispatched,
        status::DispatchStatus,
    };

    struct Echo;

    impl Servant for Echo {
        fn dispatch(
            &self,
            _current: &RequestDescriptor,
            _ctx: &mut DispatchContext,
        ) -> Result<Dispatched, DispatchFault> {
            Ok(Dispatched::Completed(DispatchStatus::Ok))
        }
    }

    #[derive(Default)]
    struct CountingLocator {
        hit: bool,
        located: AtomicUsize,
        deactivated: Mutex<Vec<String>>,
    }

    impl ServantLocator for CountingLocator {
        fn locate(&self, _current: &RequestDescriptor) -> Result<Option<Located>, DispatchFault> {
            self.located.fetch_add(1, Ordering::SeqCst);
            Ok(self.hit.then(|| Located::with_cookie(Arc::new(Echo), 7u32)))
        }

        fn finished(&self, _: &RequestDescriptor, _: &Arc<dyn Servant>, _: Cookie) {}

        fn deactivate(&self, category: &str) {
            self.deactivated.lock().unwrap().push(category.to_owned());
        }
    }

    fn request(id: Identity, facet: &str) -> RequestDescriptor {
        RequestDescriptor::new(id, "op").with_facet(facet)
    }

    #[test]
    fn test_registration_errors() {
        let dir = ServantDirectory::new();
        let id = Identity::named("a");
        dir.add(Arc::new(Echo), id.clone()).unwrap();
        assert!(matches!(
            dir.add(Arc::new(Echo), id.clone()),
            Err(DirectoryError::AlreadyRegistered { .. })
        ));
        dir.add_facet(Arc::new(Echo), id.clone(), "admin").unwrap();
        assert!(dir.find_servant(&id, "admin").is_some());

        dir.remove(&id).unwrap();
        assert!(dir.has_servant(&id));
        assert!(matches!(
            dir.remove(&id),
            Err(DirectoryError::NotRegistered { .. })
        ));
        dir.remove_facet(&id, "admin").unwrap();
        assert!(!dir.has_servant(&id));
    }

    #[test]
    fn test_direct_registration_wins_over_locators() {
        let dir = ServantDirectory::new();
        let locator = Arc::new(CountingLocator {
            hit: true,
            ..Default::default()
        });
        dir.add_servant_locator(locator.clone(), "c").unwrap();
        dir.add_servant_locator(locator.clone(), "").unwrap();
        let id = Identity::new("a", "c");
        dir.add(Arc::new(Echo), id.clone()).unwrap();

        let resolved = dir.resolve(&request(id, "")).unwrap();
        assert!(resolved.locator.is_none());
        assert_eq!(locator.located.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_category_locator_then_default() {
        let dir = ServantDirectory::new();
        let category = Arc::new(CountingLocator::default());
        let fallback = Arc::new(CountingLocator {
            hit: true,
            ..Default::default()
        });
        dir.add_servant_locator(category.clone(), "c").unwrap();
        dir.add_servant_locator(fallback.clone(), "").unwrap();

        let resolved = dir.resolve(&request(Identity::new("a", "c"), "")).unwrap();
        let (_, cookie) = resolved.locator.unwrap();
        assert_eq!(cookie.unwrap().downcast_ref::<u32>(), Some(&7));
        assert_eq!(category.located.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.located.load(Ordering::SeqCst), 1);

        // empty category skips straight to the default locator
        dir.resolve(&request(Identity::named("b"), "")).unwrap();
        assert_eq!(category.located.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.located.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolution_failures() {
        let dir = ServantDirectory::new();
        let id = Identity::named("a");
        dir.add_facet(Arc::new(Echo), id.clone(), "admin").unwrap();

        assert!(matches!(
            dir.resolve(&request(id, "other")),
            Err(DispatchFault::RequestFailed(rf)) if rf.kind == crate::fault::RequestFailedKind::FacetNotExist
        ));
        assert!(matches!(
            dir.resolve(&request(Identity::named("missing"), "")),
            Err(DispatchFault::RequestFailed(rf)) if rf.kind == crate::fault::RequestFailedKind::ObjectNotExist
        ));
    }

    #[test]
    fn test_destroy_deactivates_locators() {
        let dir = ServantDirectory::new();
        let locator = Arc::new(CountingLocator::default());
        dir.add_servant_locator(locator.clone(), "c").unwrap();
        assert!(matches!(
            dir.add_servant_locator(locator.clone(), "c"),
            Err(DirectoryError::LocatorAlreadyRegistered(_))
        ));
        dir.add(Arc::new(Echo), Identity::named("a")).unwrap();

        dir.destroy();
        assert_eq!(*locator.deactivated.lock().unwrap(), vec!["c".to_owned()]);
        assert!(dir.find_servant_locator("c").is_none());
        assert!(!dir.has_servant(&Identity::named("a")));
        assert!(matches!(
            dir.remove_servant_locator("c"),
            Err(DirectoryError::LocatorNotRegistered(_))
        ));
    }
}
