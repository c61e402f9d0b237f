//! Servants served by the binary out of the box.
//!
//! - `hello`: `::Demo::Hello`, answering `sayHello` with an optional delay.
//! - `RootDir`: root of an in-memory `::Filesystem::Directory` tree.
use std::sync::Arc;

use servolake_core::{servant::DirectoryError, Identity, ServantDirectory};

mod filesystem;
mod hello;

pub use filesystem::{DirectoryServant, ROOT_DIR};
pub use hello::HelloServant;

pub const HELLO: &str = "hello";

pub fn register(directory: &Arc<ServantDirectory>) -> Result<(), DirectoryError> {
    directory.add(Arc::new(HelloServant), Identity::named(HELLO))?;
    DirectoryServant::activate_root(directory)?;
    Ok(())
}
