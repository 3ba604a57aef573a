//! Authenticated sessions against the bank.
//!
//! - [`machine`]: the challenge handshake, one transition per step
//! - [`scheduler`]: single-flight token renewal on top of the handshake
//! - [`transport`]: the boundary to the bank, with [`retry`] layered on top
//! - [`platforms`]: concrete bank adapters

pub mod error;
pub mod events;
pub mod machine;
pub mod platforms;
pub mod retry;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use error::{AuthError, AuthErrorKind};
pub use events::{InvalidationReason, SessionEvent, SessionObserver};
pub use machine::{EstablishedSession, HandshakeConfig, SessionStateMachine};
pub use retry::{RetryPolicy, RetryingTransport};
pub use scheduler::{RenewalConfig, TokenScheduler};
pub use transport::{BankingTransport, CallContext, ChallengeTransport, TransportError};
pub use types::{
    ChallengeDescriptor, ChallengeKind, ChallengeStatus, Session, SessionId, SessionPhase,
    SessionSnapshot, SessionToken, TokenGrant, TokenPair, TokenScope,
};
