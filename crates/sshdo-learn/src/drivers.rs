use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use sshdo_core::{Outcome, Principal, UserDb, INTERACTIVE};
use sshdo_policy::{decide, LoadedPolicy, PatternCache, DEFAULT_CONFIG_PATH};

use crate::coalesce::{coalesce, Flavor, Mark, Observations};
use crate::error::{LearnError, LearnResult};
use crate::record::{scan, LogRecord, RecordParser};
use crate::render::render_directives;

#[derive(Debug, Default)]
pub struct DriverOptions {
    /// Treat disallowed records as acceptable usage.
    pub accepting: bool,
    /// Log files named on the command line; empty means the configured
    /// globs (or the platform default).
    pub log_files: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Learn — propose directives covering observed training usage
// ---------------------------------------------------------------------------

/// Replay the audit log and print directive text covering the commands
/// seen under training (and, with `accepting`, the denied ones too).
/// Records already allowed by the current policy are skipped, so learn
/// output never repeats what the policy grants.
pub fn learn(
    loaded: &LoadedPolicy,
    users: &dyn UserDb,
    options: &DriverOptions,
    out: &mut impl Write,
) -> LearnResult<()> {
    let cache = PatternCache::new(loaded.settings.style);
    let mut observations = Observations::new();

    for_each_record(loaded, options, |record| {
        if record.record_type != "training" && record.record_type != "disallowed" {
            return;
        }
        let outcome = decide(
            &loaded.tree,
            &loaded.training,
            &record.user,
            record.label.as_deref(),
            &record.command,
            users,
            &cache,
        );
        if matches!(outcome, Outcome::Allowed | Outcome::AllowedByGroup(_)) {
            return;
        }

        let principal = observed_principal(&record);
        let mark = if record.command == INTERACTIVE {
            Mark::Commented
        } else if record.record_type == "training" || options.accepting {
            Mark::Allowed
        } else {
            Mark::Commented
        };

        // The same principal seen both ways keeps the allowed mark.
        let slot = observations
            .entry(record.command.clone())
            .or_default()
            .entry(principal)
            .or_insert(mark);
        if mark == Mark::Allowed {
            *slot = Mark::Allowed;
        }
    })?;

    let coalesced = coalesce(observations, loaded.settings.style, Flavor::Learn);
    render_directives(&coalesced, out)?;
    Ok(())
}

/// The directive principal an observation belongs to: the group that
/// granted access when one did, else the user with its key label.
fn observed_principal(record: &LogRecord) -> String {
    if let Some(group) = &record.group {
        return format!("+{}", group);
    }
    match &record.label {
        Some(label) => format!("{}/{}", record.user, label),
        None => record.user.clone(),
    }
}

// ---------------------------------------------------------------------------
// Unlearn — re-emit the policy with unused directives commented out
// ---------------------------------------------------------------------------

/// Replay the audit log and print the current authorisations, commenting
/// out every one no observed command exercised. Negated-user directives
/// always survive.
pub fn unlearn(
    loaded: &LoadedPolicy,
    _users: &dyn UserDb,
    options: &DriverOptions,
    out: &mut impl Write,
) -> LearnResult<()> {
    let cache = PatternCache::new(loaded.settings.style);

    // principal -> label -> commands seen
    let mut used: HashMap<String, HashMap<Option<String>, BTreeSet<String>>> = HashMap::new();
    for_each_record(loaded, options, |record| {
        let wanted = matches!(record.record_type.as_str(), "allowed" | "training")
            || (options.accepting && record.record_type == "disallowed");
        if !wanted || record.command == INTERACTIVE {
            return;
        }
        let principal = match &record.group {
            Some(group) => format!("+{}", group),
            None => record.user.clone(),
        };
        used.entry(principal)
            .or_default()
            .entry(record.label.clone())
            .or_default()
            .insert(record.command.clone());
    })?;

    let mut current = Observations::new();
    for (principal, label, pattern) in loaded.tree.iter() {
        let keep = principal.is_negated() || {
            let key = match principal {
                Principal::Group(name) => format!("+{}", name),
                Principal::User(name) | Principal::NegUser(name) => name.clone(),
            };
            match (used.get(&key), label) {
                (None, _) => false,
                (Some(by_label), sshdo_core::LabelKey::Label(l)) => by_label
                    .get(&Some(l.clone()))
                    .is_some_and(|commands| commands.iter().any(|c| cache.matches(pattern, c))),
                (Some(by_label), sshdo_core::LabelKey::Any) => by_label
                    .values()
                    .any(|commands| commands.iter().any(|c| cache.matches(pattern, c))),
            }
        };
        let mark = if keep { Mark::Allowed } else { Mark::Commented };
        let rendered = format!("{}{}", principal, label);
        current
            .entry(pattern.to_string())
            .or_default()
            .insert(rendered, mark);
    }

    let coalesced = coalesce(current, loaded.settings.style, Flavor::Unlearn);
    render_directives(&coalesced, out)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

fn for_each_record<F: FnMut(LogRecord)>(
    loaded: &LoadedPolicy,
    options: &DriverOptions,
    mut f: F,
) -> LearnResult<()> {
    let parser = RecordParser::new();
    for file in resolve_log_files(options, &loaded.settings)? {
        scan(&file, &parser, |record| {
            if config_matches(&record, &loaded.settings) {
                f(record);
            }
        })?;
    }
    Ok(())
}

/// Records are tied to the policy file they were decided under; only the
/// ones for the active path feed the miners. An absent field and the
/// default path both denote the default config.
fn config_matches(record: &LogRecord, settings: &sshdo_policy::Settings) -> bool {
    match &record.config {
        None => settings.is_default_config(),
        Some(config) => {
            Path::new(config) == settings.config_path
                || (settings.is_default_config() && config == DEFAULT_CONFIG_PATH)
        }
    }
}

fn resolve_log_files(
    options: &DriverOptions,
    settings: &sshdo_policy::Settings,
) -> LearnResult<Vec<PathBuf>> {
    if !options.log_files.is_empty() {
        return Ok(options.log_files.clone());
    }
    let mut files = Vec::new();
    for pattern in settings.logfile_globs_or_default() {
        let paths = glob::glob(&pattern).map_err(|source| LearnError::BadGlob {
            pattern: pattern.clone(),
            source,
        })?;
        for path in paths {
            match path {
                Ok(path) => files.push(path),
                Err(e) => {
                    return Err(LearnError::Io {
                        path: e.path().to_path_buf(),
                        source: e.into_error(),
                    })
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sshdo_core::StaticUserDb;
    use std::path::Path;

    const PREFIX: &str = "Jun  3 12:34:56 bastion sshdo[4242]:";

    fn write_policy(dir: &Path, contents: &str) -> LoadedPolicy {
        let path = dir.join("sshdoers");
        std::fs::write(&path, contents).unwrap();
        let loaded = sshdo_policy::load(&path);
        assert!(loaded.issues.is_empty(), "{:?}", loaded.issues);
        loaded
    }

    fn write_log(dir: &Path, records: &[&str]) -> PathBuf {
        let path = dir.join("auth.log");
        let mut contents = String::from("Jun  3 12:00:00 bastion sshd[1]: noise\n");
        for record in records {
            contents.push_str(&format!("{} {}\n", PREFIX, record));
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn run_learn(loaded: &LoadedPolicy, log: PathBuf, accepting: bool) -> String {
        let users = StaticUserDb::new().with_user("bob", "/bin/sh", &["bob"]);
        let options = DriverOptions {
            accepting,
            log_files: vec![log],
        };
        let mut out = Vec::new();
        learn(loaded, &users, &options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn run_unlearn(loaded: &LoadedPolicy, log: PathBuf, accepting: bool) -> String {
        let users = StaticUserDb::new();
        let options = DriverOptions {
            accepting,
            log_files: vec![log],
        };
        let mut out = Vec::new();
        unlearn(loaded, &users, &options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_learn_coalesces_training_records() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "");
        let log = write_log(
            dir.path(),
            &[
                "type=\"training\" user=\"bob\" command=\"job 1\" config=\"CONFIG\"",
                "type=\"training\" user=\"bob\" command=\"job 12\" config=\"CONFIG\"",
                "type=\"training\" user=\"bob\" command=\"job 345\" config=\"CONFIG\"",
            ],
        );
        let log_text = std::fs::read_to_string(&log)
            .unwrap()
            .replace("CONFIG", &loaded.settings.config_path.display().to_string());
        std::fs::write(&log, log_text).unwrap();

        assert_eq!(run_learn(&loaded, log, false), "bob: job #\n");
    }

    #[test]
    fn test_learn_skips_foreign_config_records() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "");
        // No config field: these belong to the default policy file, not
        // the one under test.
        let log = write_log(
            dir.path(),
            &["type=\"training\" user=\"bob\" command=\"job 1\""],
        );
        assert_eq!(run_learn(&loaded, log, false), "");
    }

    #[test]
    fn test_learn_disallowed_commented_unless_accepting() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "");
        let config = loaded.settings.config_path.display().to_string();
        let record = format!(
            "type=\"disallowed\" user=\"bob\" command=\"reboot\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[record.as_str()]);
        assert_eq!(run_learn(&loaded, log.clone(), false), "# bob: reboot\n");
        assert_eq!(run_learn(&loaded, log, true), "bob: reboot\n");
    }

    #[test]
    fn test_learn_interactive_always_commented() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "");
        let config = loaded.settings.config_path.display().to_string();
        let record = format!(
            "type=\"training\" user=\"bob\" command=\"<interactive>\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[record.as_str()]);
        assert_eq!(run_learn(&loaded, log, false), "# bob: <interactive>\n");
    }

    #[test]
    fn test_learn_skips_already_allowed_commands() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "bob: job #\n");
        let config = loaded.settings.config_path.display().to_string();
        let allowed = format!(
            "type=\"training\" user=\"bob\" command=\"job 7\" config=\"{}\"",
            config
        );
        let fresh = format!(
            "type=\"training\" user=\"bob\" command=\"send 7\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[allowed.as_str(), fresh.as_str()]);
        assert_eq!(run_learn(&loaded, log, false), "bob: send 7\n");
    }

    #[test]
    fn test_learn_group_and_label_principals() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "");
        let config = loaded.settings.config_path.display().to_string();
        let by_group = format!(
            "type=\"training\" user=\"bob\" label=\"x\" command=\"df\" group=\"ops\" config=\"{}\"",
            config
        );
        let by_label = format!(
            "type=\"training\" user=\"bob\" label=\"dev\" command=\"df\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[by_group.as_str(), by_label.as_str()]);
        assert_eq!(run_learn(&loaded, log, false), "+ops bob/dev: df\n");
    }

    #[test]
    fn test_learn_allowed_mark_prevails_per_principal() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "");
        let config = loaded.settings.config_path.display().to_string();
        let denied = format!(
            "type=\"disallowed\" user=\"bob\" command=\"job 7\" config=\"{}\"",
            config
        );
        let trained = format!(
            "type=\"training\" user=\"bob\" command=\"job 7\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[denied.as_str(), trained.as_str()]);
        assert_eq!(run_learn(&loaded, log, false), "bob: job 7\n");
    }

    #[test]
    fn test_unlearn_keeps_exercised_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "carol: backup ###\n");
        let config = loaded.settings.config_path.display().to_string();
        let one = format!(
            "type=\"allowed\" user=\"carol\" command=\"backup 001\" config=\"{}\"",
            config
        );
        let two = format!(
            "type=\"allowed\" user=\"carol\" command=\"backup 002\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[one.as_str(), two.as_str()]);
        assert_eq!(run_unlearn(&loaded, log, false), "carol: backup ###\n");
    }

    #[test]
    fn test_unlearn_comments_unused_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "carol: backup ###\ncarol: uptime\n");
        let config = loaded.settings.config_path.display().to_string();
        let record = format!(
            "type=\"allowed\" user=\"carol\" command=\"uptime\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[record.as_str()]);
        assert_eq!(
            run_unlearn(&loaded, log, false),
            "# carol: backup ###\ncarol: uptime\n"
        );
    }

    #[test]
    fn test_unlearn_always_keeps_negated_users() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "-mallory: reboot\n");
        let log = write_log(dir.path(), &[]);
        assert_eq!(run_unlearn(&loaded, log, false), "-mallory: reboot\n");
    }

    #[test]
    fn test_unlearn_any_label_entry_kept_by_labelled_usage() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "carol: df\ncarol/x: du\n");
        let config = loaded.settings.config_path.display().to_string();
        let record = format!(
            "type=\"allowed\" user=\"carol\" label=\"y\" command=\"df\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[record.as_str()]);
        // The any-label df entry is exercised through label y; the /x du
        // entry saw no matching usage under label x.
        assert_eq!(run_unlearn(&loaded, log, false), "carol: df\n# carol/x: du\n");
    }

    #[test]
    fn test_unlearn_group_usage_keeps_group_directive() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "+ops: uptime\n");
        let config = loaded.settings.config_path.display().to_string();
        let record = format!(
            "type=\"allowed\" user=\"bob\" command=\"uptime\" group=\"ops\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[record.as_str()]);
        assert_eq!(run_unlearn(&loaded, log, false), "+ops: uptime\n");
    }

    #[test]
    fn test_unlearn_drops_interactive_records() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "carol: <interactive>\n");
        let config = loaded.settings.config_path.display().to_string();
        let record = format!(
            "type=\"allowed\" user=\"carol\" command=\"<interactive>\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[record.as_str()]);
        assert_eq!(run_unlearn(&loaded, log, false), "# carol: <interactive>\n");
    }

    #[test]
    fn test_unlearn_accepting_counts_disallowed_usage() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = write_policy(dir.path(), "carol: uptime\n");
        let config = loaded.settings.config_path.display().to_string();
        let record = format!(
            "type=\"disallowed\" user=\"carol\" command=\"uptime\" config=\"{}\"",
            config
        );
        let log = write_log(dir.path(), &[record.as_str()]);
        assert_eq!(run_unlearn(&loaded, log.clone(), false), "# carol: uptime\n");
        assert_eq!(run_unlearn(&loaded, log, true), "carol: uptime\n");
    }
}
