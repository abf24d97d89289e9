//! Shared value types for berth.
//!
//! A pure leaf crate: identifiers, the session record, its observational
//! status machine, and the runtime profile a session's agent runs under.
//! Nothing here performs I/O. The container engine and the registry live in
//! `berth-kernel`.
//!
//! # Key Types
//!
//! |----------------------|------------------------------------------------|
//! | Type                 | Purpose                                        |
//! |----------------------|------------------------------------------------|
//! | [`SessionId`]        | Opaque, never-reused session identity          |
//! | [`Session`]          | One workspace bound 1:1 to one container       |
//! | [`SessionStatus`]    | `running` / `stopped` / `error`                |
//! | [`StatusProbe`]      | Outcome of one engine status query             |
//! | [`RuntimeProfile`]   | Direct API key vs. cloud-hosted model profile  |
//! | [`CredentialSet`]    | Resolved credential values (memory only)       |
//! | [`Resolved`]         | Tagged resolution outcome for one credential   |
//! | [`TransferDirection`]| Which side of a copy the source lives on       |
//! |----------------------|------------------------------------------------|

pub mod ids;
pub mod runtime;
pub mod session;

pub use ids::SessionId;
pub use runtime::{CredentialSet, Resolved, RuntimeProfile, TransferDirection};
pub use session::{Session, SessionStatus, StatusProbe};

/// Current time as Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
