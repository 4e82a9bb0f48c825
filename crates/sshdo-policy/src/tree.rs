use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use sshdo_core::{Facility, LabelKey, MatchStyle, Principal};

use crate::pattern::PatternCache;

/// Main policy file; the drop-in directory is its `.d` sibling.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sshdoers";

#[cfg(target_os = "macos")]
const DEFAULT_LOGFILES: &str = "/var/log/system.log*";
#[cfg(not(target_os = "macos"))]
const DEFAULT_LOGFILES: &str = "/var/log/auth.log*";

// ---------------------------------------------------------------------------
// PolicyTree — principal -> label-or-any -> set of command patterns
// ---------------------------------------------------------------------------

/// Authorisation directives. Command patterns are stored verbatim, exactly
/// as written in the policy file.
#[derive(Debug, Default)]
pub struct PolicyTree {
    entries: HashMap<Principal, HashMap<LabelKey, BTreeSet<String>>>,
}

impl PolicyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, principal: Principal, label: LabelKey, command: String) {
        self.entries
            .entry(principal)
            .or_default()
            .entry(label)
            .or_default()
            .insert(command);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patterns(&self, principal: &Principal, label: &LabelKey) -> Option<&BTreeSet<String>> {
        self.entries.get(principal)?.get(label)
    }

    /// Whether any pattern of `principal` authorises `command` for an
    /// invocation carrying `label`. The entry for the concrete label is
    /// consulted first, then the any-label entry.
    pub fn authorizes(
        &self,
        principal: &Principal,
        label: Option<&str>,
        command: &str,
        cache: &PatternCache,
    ) -> bool {
        let Some(by_label) = self.entries.get(principal) else {
            return false;
        };
        if let Some(label) = label {
            if let Some(set) = by_label.get(&LabelKey::Label(label.to_string())) {
                if set_matches(set, command, cache) {
                    return true;
                }
            }
        }
        by_label
            .get(&LabelKey::Any)
            .is_some_and(|set| set_matches(set, command, cache))
    }

    /// Every (principal, label, pattern) triple in the tree.
    pub fn iter(&self) -> impl Iterator<Item = (&Principal, &LabelKey, &str)> {
        self.entries.iter().flat_map(|(principal, by_label)| {
            by_label.iter().flat_map(move |(label, patterns)| {
                patterns
                    .iter()
                    .map(move |pattern| (principal, label, pattern.as_str()))
            })
        })
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.entries.keys()
    }

    pub fn labels(&self, principal: &Principal) -> Vec<&LabelKey> {
        self.entries
            .get(principal)
            .map(|by_label| by_label.keys().collect())
            .unwrap_or_default()
    }
}

/// A command matches a pattern set if the literal string is present or any
/// `#`-bearing pattern compiles to a matcher that accepts it whole.
fn set_matches(set: &BTreeSet<String>, command: &str, cache: &PatternCache) -> bool {
    if set.contains(command) {
        return true;
    }
    set.iter()
        .filter(|p| p.contains('#'))
        .any(|p| cache.matches(p, command))
}

// ---------------------------------------------------------------------------
// TrainingSet — principals under training, or everyone
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TrainingSet {
    global: bool,
    entries: HashMap<Principal, HashSet<LabelKey>>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put every user and key under training.
    pub fn set_global(&mut self) {
        self.global = true;
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn insert(&mut self, principal: Principal, label: LabelKey) {
        self.entries.entry(principal).or_default().insert(label);
    }

    pub fn contains(&self, principal: &Principal, label: Option<&str>) -> bool {
        let Some(labels) = self.entries.get(principal) else {
            return false;
        };
        if let Some(label) = label {
            if labels.contains(&LabelKey::Label(label.to_string())) {
                return true;
            }
        }
        labels.contains(&LabelKey::Any)
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.entries.keys()
    }

    pub fn labels(&self, principal: &Principal) -> Vec<&LabelKey> {
        self.entries
            .get(principal)
            .map(|labels| labels.iter().collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Settings — the flat record of singleton directives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    pub facility: Facility,
    pub style: MatchStyle,
    pub banner: Option<PathBuf>,
    pub logfile_globs: Vec<String>,
    /// The path policy was actually resolved from, for audit records.
    pub config_path: PathBuf,
}

impl Settings {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            facility: Facility::default(),
            style: MatchStyle::default(),
            banner: None,
            logfile_globs: Vec::new(),
            config_path: config_path.into(),
        }
    }

    pub fn is_default_config(&self) -> bool {
        self.config_path == Path::new(DEFAULT_CONFIG_PATH)
    }

    /// Configured log globs, or the platform default.
    pub fn logfile_globs_or_default(&self) -> Vec<String> {
        if self.logfile_globs.is_empty() {
            vec![DEFAULT_LOGFILES.to_string()]
        } else {
            self.logfile_globs.clone()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> PatternCache {
        PatternCache::new(MatchStyle::Digits)
    }

    #[test]
    fn test_tree_literal_and_pattern_match() {
        let mut tree = PolicyTree::new();
        let alice = Principal::User("alice".into());
        tree.insert(alice.clone(), LabelKey::Any, "ls".into());
        tree.insert(alice.clone(), LabelKey::Any, "echo #".into());

        let cache = cache();
        assert!(tree.authorizes(&alice, None, "ls", &cache));
        assert!(tree.authorizes(&alice, None, "echo 42", &cache));
        assert!(!tree.authorizes(&alice, None, "rm -rf /", &cache));
    }

    #[test]
    fn test_tree_label_falls_back_to_any() {
        let mut tree = PolicyTree::new();
        let alice = Principal::User("alice".into());
        tree.insert(alice.clone(), LabelKey::Label("backup".into()), "tar".into());
        tree.insert(alice.clone(), LabelKey::Any, "ls".into());

        let cache = cache();
        // Labelled invocations see both the labelled entry and the any entry.
        assert!(tree.authorizes(&alice, Some("backup"), "tar", &cache));
        assert!(tree.authorizes(&alice, Some("backup"), "ls", &cache));
        // Unlabelled invocations only see the any entry.
        assert!(!tree.authorizes(&alice, None, "tar", &cache));
        assert!(tree.authorizes(&alice, None, "ls", &cache));
        // A different label falls through to the any entry.
        assert!(!tree.authorizes(&alice, Some("other"), "tar", &cache));
    }

    #[test]
    fn test_tree_any_and_specific_label_coexist() {
        let mut tree = PolicyTree::new();
        let alice = Principal::User("alice".into());
        tree.insert(alice.clone(), LabelKey::Any, "ls".into());
        tree.insert(alice.clone(), LabelKey::Label("x".into()), "ls".into());
        assert_eq!(tree.labels(&alice).len(), 2);
    }

    #[test]
    fn test_tree_iter_yields_all_triples() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("a".into()), LabelKey::Any, "one".into());
        tree.insert(Principal::Group("g".into()), LabelKey::Any, "two".into());
        tree.insert(
            Principal::User("a".into()),
            LabelKey::Label("l".into()),
            "three".into(),
        );
        assert_eq!(tree.iter().count(), 3);
    }

    #[test]
    fn test_training_specific_and_any_label() {
        let mut training = TrainingSet::new();
        let bob = Principal::User("bob".into());
        training.insert(bob.clone(), LabelKey::Label("dev".into()));

        assert!(training.contains(&bob, Some("dev")));
        assert!(!training.contains(&bob, Some("prod")));
        assert!(!training.contains(&bob, None));

        training.insert(bob.clone(), LabelKey::Any);
        assert!(training.contains(&bob, Some("prod")));
        assert!(training.contains(&bob, None));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.facility, Facility::Auth);
        assert_eq!(settings.style, MatchStyle::Digits);
        assert!(settings.banner.is_none());
        assert!(settings.is_default_config());
        assert_eq!(settings.logfile_globs_or_default().len(), 1);

        let other = Settings::new("/tmp/sshdoers");
        assert!(!other.is_default_config());
    }
}
