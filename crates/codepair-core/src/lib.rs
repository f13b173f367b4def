//! Pairing lifecycle and relay session management.
//!
//! A code is issued, shared out of band and redeemed exactly once (or
//! `max_members - 1` times in group mode). Redeeming binds the connection to
//! a session; events are then relayed to the other members of that session
//! until they leave.

pub mod clock;
pub mod code;
pub mod lifecycle;
pub mod metrics;
pub mod pairing;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod relay;
pub mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{Code, CodeGenerator};
pub use lifecycle::{Connection, ConnectionState, LifecycleHandler, RetryPolicy};
pub use metrics::{MetricsSnapshot, PairingMetrics};
pub use pairing::{CodeStatus, IssuedCode, PairingManager};
pub use protocol::{ClientMessage, ServerMessage};
pub use record::{PairingRecord, PairingState, Transition};
pub use registry::{JoinOutcome, LeaveOutcome, RegistryError, Session, SessionRegistry};
pub use relay::{Outbox, RelayChannel};
pub use store::{CodeStore, MemoryCodeStore, RestCodeStore};
pub use sweeper::spawn_expiry_sweeper;
