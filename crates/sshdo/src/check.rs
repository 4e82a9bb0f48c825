use std::io::Write;
use std::path::{Path, PathBuf};

use sshdo_core::UserDb;
use sshdo_policy::{load, validate, Issue, LoadedPolicy};

/// Check each named policy file as a main file (with its `.d` siblings)
/// and print one line per finding. Returns the number of findings; the
/// caller turns that into the exit status.
pub fn run_check(files: &[PathBuf], users: &dyn UserDb, out: &mut impl Write) -> std::io::Result<u32> {
    let mut count = 0u32;
    for file in files {
        let loaded = load(file);
        let mut issues = loaded.issues.clone();
        issues.extend(validate(&loaded, users));
        issues.extend(logfile_issues(&loaded));
        for issue in &issues {
            writeln!(out, "{}", issue.describe())?;
        }
        count = count.saturating_add(issues.len() as u32);
    }
    Ok(count)
}

/// Warn about configured log globs that match nothing or do not parse.
fn logfile_issues(loaded: &LoadedPolicy) -> Vec<Issue> {
    let config = &loaded.settings.config_path;
    let mut issues = Vec::new();
    for pattern in &loaded.settings.logfile_globs {
        let message = match glob::glob(pattern) {
            Err(e) => Some(format!("bad logfiles glob {:?}: {}", pattern, e)),
            Ok(paths) => {
                if paths.filter_map(|p| p.ok()).next().is_none() {
                    Some(format!("missing logfiles {}", pattern))
                } else {
                    None
                }
            }
        };
        if let Some(message) = message {
            issues.push(warning(config, message));
        }
    }
    issues
}

fn warning(config: &Path, message: String) -> Issue {
    Issue::Warning {
        filename: config.to_path_buf(),
        linenumber: None,
        message,
    }
}
