//! Shared vocabulary for the sshdo gatekeeper.
//!
//! Everything the policy engine, the log miners, and the binary agree on
//! lives here: principals and labels, match styles, syslog facilities, the
//! five-way decision outcome, the audit record with its escaping rules, and
//! the `UserDb` / `AuditSink` trait seams with their test doubles.

pub mod audit_sink;
pub mod error;
pub mod record;
pub mod types;
pub mod users;

pub use audit_sink::{AuditSink, InMemoryAuditSink};
pub use error::{CoreError, CoreResult};
pub use record::{
    decode_command, encode_command, escape_value, unescape_value, AuditRecord, Priority,
    INTERACTIVE,
};
pub use types::{parse_principal, Facility, LabelKey, MatchStyle, Outcome, Principal};
pub use users::{StaticUserDb, SystemUserDb, UserDb};
