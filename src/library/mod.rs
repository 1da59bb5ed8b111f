mod models;
mod schema;
mod store;

pub use models::{LibraryTrack, NewLibraryTrack};
pub use store::{LibraryStore, SqliteLibraryStore};
