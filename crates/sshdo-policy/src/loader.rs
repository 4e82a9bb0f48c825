use std::path::{Path, PathBuf};
use std::str::FromStr;

use sshdo_core::{
    decode_command, parse_principal, AuditRecord, Facility, MatchStyle, Principal, UserDb,
};

use crate::tree::{PolicyTree, Settings, TrainingSet};

// ---------------------------------------------------------------------------
// Issue — one loader or validator finding
// ---------------------------------------------------------------------------

/// A problem found while loading or checking policy. Loading never fails:
/// the caller decides whether issues become check-mode output or runtime
/// `configerror` audit records.
#[derive(Debug, Clone)]
pub enum Issue {
    /// A policy file (or the drop-in directory) could not be read.
    Unreadable {
        filename: PathBuf,
        error: String,
    },
    /// A line that does not parse as any directive.
    Malformed {
        filename: PathBuf,
        linenumber: u32,
        line: String,
        message: String,
    },
    Warning {
        filename: PathBuf,
        linenumber: Option<u32>,
        message: String,
    },
}

impl Issue {
    pub fn is_error(&self) -> bool {
        !matches!(self, Issue::Warning { .. })
    }

    /// The check-mode report line.
    pub fn describe(&self) -> String {
        match self {
            Issue::Unreadable { filename, error } => {
                format!("error: {}: {}", filename.display(), error)
            }
            Issue::Malformed {
                filename,
                linenumber,
                line,
                message,
            } => format!(
                "error: {} line {}: {}: {}",
                filename.display(),
                linenumber,
                message,
                line
            ),
            Issue::Warning {
                filename,
                linenumber: Some(n),
                message,
            } => format!("warning: {} line {}: {}", filename.display(), n, message),
            Issue::Warning {
                filename,
                linenumber: None,
                message,
            } => format!("warning: {}: {}", filename.display(), message),
        }
    }

    /// The `configerror` audit record emitted on the forced-command path.
    /// Only read and parse failures are reported at runtime.
    pub fn runtime_record(&self) -> Option<AuditRecord> {
        match self {
            Issue::Unreadable { filename, error } => Some(
                AuditRecord::new("configerror")
                    .field("filename", filename.display().to_string())
                    .field("error", error.clone()),
            ),
            Issue::Malformed {
                filename,
                linenumber,
                line,
                ..
            } => Some(
                AuditRecord::new("configerror")
                    .field("filename", filename.display().to_string())
                    .field("linenumber", linenumber.to_string())
                    .field("line", line.clone()),
            ),
            Issue::Warning { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LoadedPolicy {
    pub tree: PolicyTree,
    pub training: TrainingSet,
    pub settings: Settings,
    pub issues: Vec<Issue>,
}

/// Load the main policy file and its sorted `.d` drop-ins. Never fails;
/// whatever parsed is kept and every problem is collected as an `Issue`.
pub fn load(main: &Path) -> LoadedPolicy {
    let mut loader = Loader {
        tree: PolicyTree::new(),
        training: TrainingSet::new(),
        settings: Settings::new(main),
        issues: Vec::new(),
        match_count: 0,
        syslog_count: 0,
        banner_count: 0,
    };

    loader.parse_file(main, true);

    let dropin_dir = PathBuf::from(format!("{}.d", main.display()));
    if dropin_dir.is_dir() {
        match std::fs::read_dir(&dropin_dir) {
            Ok(entries) => {
                let mut files: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.is_file()
                            && !p
                                .file_name()
                                .and_then(|n| n.to_str())
                                .is_some_and(|n| n.starts_with('.'))
                    })
                    .collect();
                files.sort();
                for file in files {
                    loader.parse_file(&file, false);
                }
            }
            Err(e) => loader.issues.push(Issue::Unreadable {
                filename: dropin_dir,
                error: e.to_string(),
            }),
        }
    }

    LoadedPolicy {
        tree: loader.tree,
        training: loader.training,
        settings: loader.settings,
        issues: loader.issues,
    }
}

struct Loader {
    tree: PolicyTree,
    training: TrainingSet,
    settings: Settings,
    issues: Vec<Issue>,
    match_count: u32,
    syslog_count: u32,
    banner_count: u32,
}

impl Loader {
    fn parse_file(&mut self, path: &Path, is_main: bool) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                self.issues.push(Issue::Unreadable {
                    filename: path.to_path_buf(),
                    error: e.to_string(),
                });
                return;
            }
        };
        tracing::debug!("loading {}", path.display());
        for (index, raw) in contents.lines().enumerate() {
            self.parse_line(path, is_main, index as u32 + 1, raw);
        }
    }

    fn parse_line(&mut self, path: &Path, is_main: bool, linenumber: u32, raw: &str) {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        let keyword = line.split_whitespace().next().unwrap_or("");
        let rest = line[keyword.len()..].trim_start();
        match keyword {
            "training" => self.parse_training(path, is_main, linenumber, line, rest),
            "match" => {
                if self.require_main(path, is_main, linenumber, line, "match") {
                    self.parse_match(path, linenumber, line, rest);
                }
            }
            "syslog" => {
                if self.require_main(path, is_main, linenumber, line, "syslog") {
                    self.parse_syslog(path, linenumber, line, rest);
                }
            }
            "logfiles" => {
                if self.require_main(path, is_main, linenumber, line, "logfiles") {
                    self.parse_logfiles(path, linenumber, line, rest);
                }
            }
            "banner" => {
                if self.require_main(path, is_main, linenumber, line, "banner") {
                    self.parse_banner(path, linenumber, line, rest);
                }
            }
            _ => self.parse_authorisation(path, linenumber, line),
        }
    }

    /// Singleton settings and global training belong to the main file only.
    fn require_main(
        &mut self,
        path: &Path,
        is_main: bool,
        linenumber: u32,
        line: &str,
        directive: &str,
    ) -> bool {
        if !is_main {
            self.malformed(
                path,
                linenumber,
                line,
                format!("{} is only permitted in the main policy file", directive),
            );
        }
        is_main
    }

    fn parse_training(
        &mut self,
        path: &Path,
        is_main: bool,
        linenumber: u32,
        line: &str,
        rest: &str,
    ) {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.is_empty() {
            if !is_main {
                self.malformed(
                    path,
                    linenumber,
                    line,
                    "global training is only permitted in the main policy file".into(),
                );
                return;
            }
            self.training.set_global();
            return;
        }
        for token in tokens {
            match parse_principal(token) {
                Ok((principal, label)) => self.training.insert(principal, label),
                Err(e) => {
                    self.malformed(path, linenumber, line, e.to_string());
                    return;
                }
            }
        }
    }

    fn parse_match(&mut self, path: &Path, linenumber: u32, line: &str, rest: &str) {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [value] = tokens.as_slice() else {
            self.malformed(path, linenumber, line, "match takes one style".into());
            return;
        };
        match MatchStyle::from_str(value) {
            Ok(style) => {
                self.match_count += 1;
                if self.match_count > 1 {
                    self.repeated(path, linenumber, "match");
                }
                self.settings.style = style;
            }
            Err(e) => self.malformed(path, linenumber, line, e.to_string()),
        }
    }

    fn parse_syslog(&mut self, path: &Path, linenumber: u32, line: &str, rest: &str) {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [value] = tokens.as_slice() else {
            self.malformed(path, linenumber, line, "syslog takes one facility".into());
            return;
        };
        match Facility::from_str(value) {
            Ok(facility) => {
                self.syslog_count += 1;
                if self.syslog_count > 1 {
                    self.repeated(path, linenumber, "syslog");
                }
                self.settings.facility = facility;
            }
            Err(e) => self.malformed(path, linenumber, line, e.to_string()),
        }
    }

    fn parse_logfiles(&mut self, path: &Path, linenumber: u32, line: &str, rest: &str) {
        let globs: Vec<&str> = rest.split_whitespace().collect();
        if globs.is_empty() {
            self.malformed(path, linenumber, line, "logfiles takes glob patterns".into());
            return;
        }
        self.settings
            .logfile_globs
            .extend(globs.iter().map(|g| g.to_string()));
    }

    fn parse_banner(&mut self, path: &Path, linenumber: u32, line: &str, rest: &str) {
        if rest.is_empty() {
            self.malformed(path, linenumber, line, "banner takes a file path".into());
            return;
        }
        self.banner_count += 1;
        if self.banner_count > 1 {
            self.repeated(path, linenumber, "banner");
        }
        self.settings.banner = Some(PathBuf::from(rest));
    }

    fn parse_authorisation(&mut self, path: &Path, linenumber: u32, line: &str) {
        let Some((left, right)) = line.split_once(':') else {
            self.malformed(path, linenumber, line, "unrecognised directive".into());
            return;
        };

        let tokens: Vec<&str> = left.split_whitespace().collect();
        if tokens.is_empty() {
            self.malformed(path, linenumber, line, "missing principals".into());
            return;
        }
        let mut principals = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match parse_principal(token) {
                Ok(parsed) => principals.push(parsed),
                Err(e) => {
                    self.malformed(path, linenumber, line, e.to_string());
                    return;
                }
            }
        }

        let written = right.trim();
        if written.is_empty() {
            self.malformed(path, linenumber, line, "missing command".into());
            return;
        }
        let command = match decode_command(written) {
            Ok(command) => command,
            Err(e) => {
                self.malformed(path, linenumber, line, e.to_string());
                return;
            }
        };

        for (principal, label) in principals {
            self.tree.insert(principal, label, command.clone());
        }
    }

    fn malformed(&mut self, path: &Path, linenumber: u32, line: &str, message: String) {
        self.issues.push(Issue::Malformed {
            filename: path.to_path_buf(),
            linenumber,
            line: line.to_string(),
            message,
        });
    }

    fn repeated(&mut self, path: &Path, linenumber: u32, directive: &str) {
        self.issues.push(Issue::Warning {
            filename: path.to_path_buf(),
            linenumber: Some(linenumber),
            message: format!("repeated {} directive, last one wins", directive),
        });
    }
}

// ---------------------------------------------------------------------------
// Validation — the extra checks behind --check
// ---------------------------------------------------------------------------

/// Check-mode scrutiny of a loaded policy: unknown accounts, clashing
/// positive/negative directives, and a missing banner. Loading problems are
/// already in `loaded.issues`; these findings are additional.
pub fn validate(loaded: &LoadedPolicy, users: &dyn UserDb) -> Vec<Issue> {
    let mut issues = Vec::new();
    let config = &loaded.settings.config_path;

    let mut checked: std::collections::HashSet<&Principal> = std::collections::HashSet::new();
    let principals = loaded
        .tree
        .principals()
        .chain(loaded.training.principals());
    for principal in principals {
        if !checked.insert(principal) {
            continue;
        }
        let known = match principal {
            Principal::User(name) | Principal::NegUser(name) => users.user_exists(name),
            Principal::Group(name) => users.group_exists(name),
        };
        if !known {
            let kind = match principal {
                Principal::Group(_) => "group",
                _ => "user",
            };
            issues.push(Issue::Warning {
                filename: config.clone(),
                linenumber: None,
                message: format!("unknown {} {}", kind, principal.name()),
            });
        }
    }

    issues.extend(authorisation_clashes(loaded, config));
    issues.extend(training_clashes(loaded, config));

    if let Some(banner) = &loaded.settings.banner {
        if !banner.is_file() {
            issues.push(Issue::Warning {
                filename: config.clone(),
                linenumber: None,
                message: format!("missing banner {}", banner.display()),
            });
        }
    }

    issues
}

/// A positive and a negative form of the same user authorising the same
/// command, under overlapping labels. Both stay in the tree; the decision
/// engine denies at runtime.
fn authorisation_clashes(loaded: &LoadedPolicy, config: &Path) -> Vec<Issue> {
    let mut issues = Vec::new();
    for principal in loaded.tree.principals() {
        let Principal::User(name) = principal else {
            continue;
        };
        let negated = Principal::NegUser(name.clone());
        for pos_label in loaded.tree.labels(principal) {
            let Some(pos_set) = loaded.tree.patterns(principal, pos_label) else {
                continue;
            };
            for neg_label in loaded.tree.labels(&negated) {
                if !pos_label.overlaps(neg_label) {
                    continue;
                }
                let Some(neg_set) = loaded.tree.patterns(&negated, neg_label) else {
                    continue;
                };
                for command in pos_set.intersection(neg_set) {
                    issues.push(Issue::Warning {
                        filename: config.to_path_buf(),
                        linenumber: None,
                        message: format!(
                            "{}{} and {}{} clash on {:?}",
                            principal, pos_label, negated, neg_label, command
                        ),
                    });
                }
            }
        }
    }
    issues
}

fn training_clashes(loaded: &LoadedPolicy, config: &Path) -> Vec<Issue> {
    let mut issues = Vec::new();
    for principal in loaded.training.principals() {
        let Principal::User(name) = principal else {
            continue;
        };
        let negated = Principal::NegUser(name.clone());
        for pos_label in loaded.training.labels(principal) {
            for neg_label in loaded.training.labels(&negated) {
                if pos_label.overlaps(neg_label) {
                    issues.push(Issue::Warning {
                        filename: config.to_path_buf(),
                        linenumber: None,
                        message: format!(
                            "training {}{} clashes with {}{}",
                            principal, pos_label, negated, neg_label
                        ),
                    });
                }
            }
        }
    }
    issues
}
