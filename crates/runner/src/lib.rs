pub mod api;
pub mod boot;
pub mod flusher;

pub use api::TrackerApi;
pub use boot::{hydrate_tracker, open_store};
pub use flusher::spawn_flusher;
