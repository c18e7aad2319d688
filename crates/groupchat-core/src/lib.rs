pub mod attachment;
pub mod error;
pub mod group;
pub mod message;
pub mod role;
pub mod session;

pub use attachment::{Attachment, OutgoingFile};
pub use error::ChatError;
pub use group::Group;
pub use message::{Message, MessageKind, NewMessage};
pub use role::Role;
pub use session::{Session, SessionHandle, SessionUser};
