//! zkv-auth: the verifier side of the zero-knowledge passphrase login
//!
//! - `store`: TTL-bounded key/value maps for pending challenges and sessions
//! - `service`: registration, login moves, session checks, passphrase change

pub mod service;
pub mod store;

pub use service::{AuthService, LoginChallenge, PendingChallenge, Session, SweepStats};
pub use store::{ExpiringStore, MemoryStore};
