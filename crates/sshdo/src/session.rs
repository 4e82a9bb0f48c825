use std::path::{Path, PathBuf};

use sshdo_core::{AuditRecord, AuditSink, Outcome, UserDb, INTERACTIVE};
use sshdo_policy::{decide, LoadedPolicy, PatternCache, Settings};

// ---------------------------------------------------------------------------
// SessionRequest — what the hosting daemon told us
// ---------------------------------------------------------------------------

/// The forced-command invocation, read from the environment the hosting
/// daemon set up. The environment is trusted as-is.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub user: String,
    /// The requested command; an empty request maps to `<interactive>`.
    pub command: String,
    pub remoteip: String,
    pub label: Option<String>,
}

impl SessionRequest {
    /// Read `USER`, `SSH_ORIGINAL_COMMAND`, and `SSH_CLIENT`. Only `USER`
    /// is required.
    pub fn from_env(label_arg: Option<&str>) -> Result<Self, String> {
        let user = std::env::var("USER").map_err(|_| "USER is not set".to_string())?;
        let command = std::env::var("SSH_ORIGINAL_COMMAND").unwrap_or_default();
        let command = if command.is_empty() {
            INTERACTIVE.to_string()
        } else {
            command
        };
        let remoteip = std::env::var("SSH_CLIENT")
            .unwrap_or_default()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let label = label_arg
            .map(normalize_label)
            .filter(|label| !label.is_empty());
        Ok(Self {
            user,
            command,
            remoteip,
            label,
        })
    }
}

/// Labels end up in policy files and audit records, where whitespace and
/// colons are structural.
pub fn normalize_label(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_whitespace() || c == ':' { '_' } else { c })
        .collect()
}

// ---------------------------------------------------------------------------
// The decision path
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Replace this process with the user's login shell.
    Exec(ExecPlan),
    /// Show the banner, if any, and exit 1.
    Deny,
    /// Exit 1 without the banner (the decision allowed, the exec cannot
    /// happen).
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    pub shell: PathBuf,
    pub arg0: String,
    pub args: Vec<String>,
}

/// How the login shell gets invoked: as a login shell (`-shell`, no
/// arguments) for interactive sessions, with `-c command` otherwise.
pub fn exec_plan(shell: &Path, command: &str) -> ExecPlan {
    let name = shell
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("sh")
        .to_string();
    if command == INTERACTIVE {
        ExecPlan {
            shell: shell.to_path_buf(),
            arg0: format!("-{}", name),
            args: Vec::new(),
        }
    } else {
        ExecPlan {
            shell: shell.to_path_buf(),
            arg0: name,
            args: vec!["-c".to_string(), command.to_string()],
        }
    }
}

/// Decide, emit the audit record, and say what to do next. Emission
/// failures are logged and ignored; they never change the action.
pub fn evaluate(
    loaded: &LoadedPolicy,
    request: &SessionRequest,
    users: &dyn UserDb,
    sink: &dyn AuditSink,
) -> SessionAction {
    let cache = PatternCache::new(loaded.settings.style);
    let outcome = decide(
        &loaded.tree,
        &loaded.training,
        &request.user,
        request.label.as_deref(),
        &request.command,
        users,
        &cache,
    );

    emit(sink, &decision_record(&outcome, request, &loaded.settings));

    if !outcome.permits_exec() {
        return SessionAction::Deny;
    }
    match users.login_shell(&request.user) {
        Some(shell) => SessionAction::Exec(exec_plan(&shell, &request.command)),
        None => {
            emit(
                sink,
                &AuditRecord::new("execerror")
                    .field("command", request.command.clone())
                    .field("error", format!("no login shell for {}", request.user)),
            );
            SessionAction::Fail
        }
    }
}

/// The one record every decision produces. Field order is fixed; empty
/// fields are dropped; the config path appears only when it is not the
/// default.
pub fn decision_record(
    outcome: &Outcome,
    request: &SessionRequest,
    settings: &Settings,
) -> AuditRecord {
    let config = if settings.is_default_config() {
        String::new()
    } else {
        settings.config_path.display().to_string()
    };
    AuditRecord::new(outcome.record_type())
        .field("user", request.user.clone())
        .field("remoteip", request.remoteip.clone())
        .field("label", request.label.clone().unwrap_or_default())
        .field("command", request.command.clone())
        .field("group", outcome.group().unwrap_or_default().to_string())
        .field("config", config)
}

/// Print the banner on the denied path. A missing or unreadable banner is
/// reported but the deny stands.
pub fn show_banner(settings: &Settings, sink: &dyn AuditSink, out: &mut impl std::io::Write) {
    let Some(banner) = &settings.banner else {
        return;
    };
    match std::fs::read_to_string(banner) {
        Ok(text) => {
            let _ = out.write_all(text.as_bytes());
        }
        Err(e) => emit(
            sink,
            &AuditRecord::new("configerror")
                .field("filename", banner.display().to_string())
                .field("error", e.to_string()),
        ),
    }
}

fn emit(sink: &dyn AuditSink, record: &AuditRecord) {
    if let Err(e) = sink.emit(record) {
        tracing::warn!("audit record not delivered: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sshdo_core::{InMemoryAuditSink, StaticUserDb};

    fn loaded_from(contents: &str) -> LoadedPolicy {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sshdoers");
        std::fs::write(&path, contents).unwrap();
        sshdo_policy::load(&path)
    }

    fn request(user: &str, command: &str, label: Option<&str>) -> SessionRequest {
        SessionRequest {
            user: user.to_string(),
            command: command.to_string(),
            remoteip: "203.0.113.7".to_string(),
            label: label.map(|l| l.to_string()),
        }
    }

    #[test]
    fn test_from_env_maps_empty_command_to_interactive() {
        std::env::set_var("USER", "alice");
        std::env::set_var("SSH_ORIGINAL_COMMAND", "");
        std::env::set_var("SSH_CLIENT", "203.0.113.7 51515 22");

        let request = SessionRequest::from_env(Some("a key")).unwrap();
        assert_eq!(request.user, "alice");
        assert_eq!(request.command, INTERACTIVE);
        assert_eq!(request.remoteip, "203.0.113.7");
        assert_eq!(request.label.as_deref(), Some("a_key"));
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("backup"), "backup");
        assert_eq!(normalize_label("two words"), "two_words");
        assert_eq!(normalize_label("a:b\tc"), "a_b_c");
    }

    #[test]
    fn test_exec_plan_interactive_is_login_shell() {
        let plan = exec_plan(Path::new("/bin/bash"), INTERACTIVE);
        assert_eq!(plan.shell, PathBuf::from("/bin/bash"));
        assert_eq!(plan.arg0, "-bash");
        assert!(plan.args.is_empty());
    }

    #[test]
    fn test_exec_plan_command_uses_dash_c() {
        let plan = exec_plan(Path::new("/bin/bash"), "echo 42");
        assert_eq!(plan.arg0, "bash");
        assert_eq!(plan.args, vec!["-c", "echo 42"]);
    }

    #[test]
    fn test_evaluate_allowed_emits_and_execs() {
        let loaded = loaded_from("alice: echo #\n");
        let users = StaticUserDb::new().with_user("alice", "/bin/bash", &["alice"]);
        let sink = InMemoryAuditSink::new();

        let action = evaluate(&loaded, &request("alice", "echo 42", None), &users, &sink);
        let SessionAction::Exec(plan) = action else {
            panic!("expected exec, got {:?}", action);
        };
        assert_eq!(plan.args, vec!["-c", "echo 42"]);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type(), "allowed");
        assert_eq!(records[0].get("user"), Some("alice"));
        assert_eq!(records[0].get("command"), Some("echo 42"));
    }

    #[test]
    fn test_evaluate_denied() {
        let loaded = loaded_from("");
        let users = StaticUserDb::new().with_user("alice", "/bin/bash", &["alice"]);
        let sink = InMemoryAuditSink::new();

        let action = evaluate(&loaded, &request("alice", "rm -rf /", None), &users, &sink);
        assert_eq!(action, SessionAction::Deny);
        assert_eq!(sink.records()[0].record_type(), "disallowed");
    }

    #[test]
    fn test_evaluate_missing_shell_is_execerror() {
        let loaded = loaded_from("ghost: ls\n");
        let users = StaticUserDb::new();
        let sink = InMemoryAuditSink::new();

        let action = evaluate(&loaded, &request("ghost", "ls", None), &users, &sink);
        assert_eq!(action, SessionAction::Fail);
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].record_type(), "execerror");
    }

    #[test]
    fn test_decision_record_group_and_config_fields() {
        let loaded = loaded_from("+admins: uptime\n");
        let users = StaticUserDb::new().with_user("alice", "/bin/sh", &["alice", "admins"]);
        let sink = InMemoryAuditSink::new();

        evaluate(&loaded, &request("alice", "uptime", Some("ops")), &users, &sink);
        let record = &sink.records()[0];
        assert_eq!(record.record_type(), "allowed");
        assert_eq!(record.get("group"), Some("admins"));
        assert_eq!(record.get("label"), Some("ops"));
        // Loaded from a temp dir, so the non-default path is recorded.
        assert!(record.get("config").is_some());
    }

    #[test]
    fn test_show_banner_prints_file() {
        let dir = tempfile::tempdir().unwrap();
        let banner = dir.path().join("banner.txt");
        std::fs::write(&banner, "access denied\n").unwrap();
        let mut settings = Settings::new("/etc/sshdoers");
        settings.banner = Some(banner);

        let sink = InMemoryAuditSink::new();
        let mut out = Vec::new();
        show_banner(&settings, &sink, &mut out);
        assert_eq!(out, b"access denied\n");
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_show_banner_missing_reports_configerror() {
        let mut settings = Settings::new("/etc/sshdoers");
        settings.banner = Some(PathBuf::from("/nonexistent/banner.txt"));

        let sink = InMemoryAuditSink::new();
        let mut out = Vec::new();
        show_banner(&settings, &sink, &mut out);
        assert!(out.is_empty());
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type(), "configerror");
    }
}
