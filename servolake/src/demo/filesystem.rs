//! In-memory directory tree with lazy removal.
//!
//! Destroying a directory deregisters its servant and queues `(parent, name)` for reaping
//! instead of touching the parent, so a destroy never needs the parent's lock. Every
//! access to the tree goes through [`Filesystem::tree`], which reaps the queue before
//! handing out the contents; queued names are therefore never visible.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use servolake_core::{
    servant::{skeleton::dispatch_builtin, DirectoryError},
    wire::WireStream,
    DispatchContext, DispatchFault, DispatchStatus, Dispatched, Identity, RequestDescriptor,
    Servant, ServantDirectory,
};
use tracing::debug;

pub const ROOT_DIR: &str = "RootDir";

const TYPE_ID: &str = "::Filesystem::Directory";
const TYPE_IDS: &[&str] = &["::Filesystem::Node"];
const NAME_IN_USE: &str = "::Filesystem::NameInUse";
const PERMISSION_DENIED: &str = "::Filesystem::PermissionDenied";

#[derive(Default)]
struct Tree {
    contents: HashMap<Identity, BTreeMap<String, Identity>>,
    reap: Vec<(Identity, String)>,
}

impl Tree {
    fn reap(&mut self) {
        for (parent, name) in self.reap.drain(..) {
            if let Some(children) = self.contents.get_mut(&parent) {
                children.remove(&name);
            }
        }
    }
}

/// State shared by every directory of one tree.
pub struct Filesystem {
    tree: Mutex<Tree>,
    directory: Weak<ServantDirectory>,
    next_id: AtomicU64,
}

impl Filesystem {
    /// Lock the tree with every pending removal applied.
    fn tree(&self) -> MutexGuard<'_, Tree> {
        let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
        tree.reap();
        tree
    }

    fn servants(&self) -> Result<Arc<ServantDirectory>, DispatchFault> {
        self.directory
            .upgrade()
            .ok_or_else(|| DispatchFault::local("servant directory is gone"))
    }
}

pub struct DirectoryServant {
    name: String,
    id: Identity,
    parent: Option<Identity>,
    destroyed: Mutex<bool>,
    fs: Arc<Filesystem>,
}

/// Declared exceptions travel in the reply encapsulation: type id, then members.
fn user_exception(os: &mut WireStream, type_id: &str, member: &str) -> Dispatched {
    os.write_string(type_id);
    os.write_string(member);
    Dispatched::Completed(DispatchStatus::UserException)
}

impl DirectoryServant {
    /// Register a fresh tree's root under [`ROOT_DIR`].
    pub fn activate_root(directory: &Arc<ServantDirectory>) -> Result<Arc<Self>, DirectoryError> {
        let fs = Arc::new(Filesystem {
            tree: Mutex::default(),
            directory: Arc::downgrade(directory),
            next_id: AtomicU64::new(0),
        });
        let root = Arc::new(DirectoryServant {
            name: "/".to_owned(),
            id: Identity::named(ROOT_DIR),
            parent: None,
            destroyed: Mutex::new(false),
            fs,
        });
        directory.add(root.clone(), root.id.clone())?;
        Ok(root)
    }

    fn check_alive(&self) -> Result<(), DispatchFault> {
        if *self.destroyed.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(DispatchFault::object_not_exist());
        }
        Ok(())
    }

    fn list(&self) -> Vec<String> {
        let tree = self.fs.tree();
        tree.contents
            .get(&self.id)
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn create_directory(&self, ctx: &mut DispatchContext) -> Result<Dispatched, DispatchFault> {
        let name = ctx.istr().read_string()?;
        let mut tree = self.fs.tree();
        let children = tree.contents.entry(self.id.clone()).or_default();
        if children.contains_key(&name) {
            return Ok(user_exception(ctx.ostr(), NAME_IN_USE, &name));
        }

        let n = self.fs.next_id.fetch_add(1, Ordering::Relaxed);
        let child = Arc::new(DirectoryServant {
            name: name.clone(),
            id: Identity::named(format!("dir-{n}")),
            parent: Some(self.id.clone()),
            destroyed: Mutex::new(false),
            fs: self.fs.clone(),
        });
        self.fs
            .servants()?
            .add(child.clone(), child.id.clone())
            .map_err(DispatchFault::local)?;
        children.insert(name, child.id.clone());
        debug!("created directory `{}` as `{}`", child.name, child.id);
        child.id.write(ctx.ostr());
        Ok(Dispatched::Completed(DispatchStatus::Ok))
    }

    fn destroy(&self, ctx: &mut DispatchContext) -> Result<Dispatched, DispatchFault> {
        let Some(parent) = &self.parent else {
            return Ok(user_exception(
                ctx.ostr(),
                PERMISSION_DENIED,
                "Cannot destroy root directory",
            ));
        };

        let mut destroyed = self.destroyed.lock().unwrap_or_else(PoisonError::into_inner);
        if *destroyed {
            return Err(DispatchFault::object_not_exist());
        }
        let mut tree = self.fs.tree();
        if tree.contents.get(&self.id).is_some_and(|c| !c.is_empty()) {
            return Ok(user_exception(
                ctx.ostr(),
                PERMISSION_DENIED,
                "Cannot destroy non-empty directory",
            ));
        }

        self.fs
            .servants()?
            .remove(&self.id)
            .map_err(DispatchFault::local)?;
        tree.contents.remove(&self.id);
        tree.reap.push((parent.clone(), self.name.clone()));
        *destroyed = true;
        debug!("destroyed directory `{}`", self.name);
        Ok(Dispatched::Completed(DispatchStatus::Ok))
    }
}

impl Servant for DirectoryServant {
    fn dispatch(
        &self,
        current: &RequestDescriptor,
        ctx: &mut DispatchContext,
    ) -> Result<Dispatched, DispatchFault> {
        match current.operation.as_str() {
            "name" => {
                self.check_alive()?;
                ctx.ostr().write_string(&self.name);
            }
            "list" => {
                self.check_alive()?;
                let names = self.list();
                ctx.ostr().write_string_seq(&names);
            }
            "createDirectory" => {
                self.check_alive()?;
                return self.create_directory(ctx);
            }
            "destroy" => return self.destroy(ctx),
            _ => return dispatch_builtin(TYPE_ID, TYPE_IDS, current, ctx),
        }
        Ok(Dispatched::Completed(DispatchStatus::Ok))
    }
}
