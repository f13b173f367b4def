pub mod errors;
pub mod id;

pub use errors::{CodepairError, ConfigError, PairingError, PairingErrorKind, StoreError};
pub use id::{new_id, ConnectionId, SessionId};

pub type Result<T> = std::result::Result<T, CodepairError>;
