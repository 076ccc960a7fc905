//! Durable storage of captured stills.

mod naming;
mod persister;

pub use naming::PhotoNaming;
pub use persister::{ImagePersister, PersistError, JPEG_MIME_TYPE};
