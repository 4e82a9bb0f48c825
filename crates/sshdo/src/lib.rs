//! The sshdo binary: the forced-command gatekeeper and its admin modes.
//!
//! Run as an ssh forced command, it consults the policy, writes one audit
//! record, and replaces itself with the user's login shell (or denies).
//! The admin surface is `--check`, `--learn`, and `--unlearn`.

pub mod audit;
pub mod check;
pub mod session;

pub use audit::SyslogSink;
pub use check::run_check;
pub use session::{
    decision_record, evaluate, exec_plan, normalize_label, show_banner, ExecPlan, SessionAction,
    SessionRequest,
};
