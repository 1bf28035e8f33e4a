/// The single debug session of this process and its lifecycle
mod error;
mod lifecycle;
#[allow(clippy::module_inception)]
mod session;
mod slot;

pub use error::{AttachError, TransportError};
pub use lifecycle::{
    AcceptedMessage, AttachOptions, HelloMessage, SessionHandle, connect_and_start, connect_and_start_in,
    default_accepted_message, default_hello_message, start_from_connection, start_from_connection_in,
};
pub use session::{DEFAULT_PROMPT, Session};
pub use slot::{Acquired, SessionSlot, SlotGuard, global_slot};
