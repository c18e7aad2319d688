pub mod controller;
pub mod error;
pub mod files;
pub mod interaction;
pub mod poller;

pub use controller::{ConfirmedDelete, DeleteRequest, FeedController};
pub use error::FeedError;
pub use interaction::{menu_actions, Interaction, MenuAction};
pub use poller::{resume_poller, spawn_poller, PollHandle, DEFAULT_POLL_INTERVAL};
