use sshdo_core::{Outcome, Principal, UserDb};

use crate::pattern::PatternCache;
use crate::tree::{PolicyTree, TrainingSet};

/// Decide what to do with `command`, requested by `user` under `label`.
///
/// First hit wins: a matching negated-user entry denies regardless of any
/// positive entry; then the user's own entries, then each of the user's
/// groups in OS order; then the training set (global, negated, user,
/// group). The fallback is deny, so this function never fails.
pub fn decide(
    tree: &PolicyTree,
    training: &TrainingSet,
    user: &str,
    label: Option<&str>,
    command: &str,
    users: &dyn UserDb,
    cache: &PatternCache,
) -> Outcome {
    let negated = Principal::NegUser(user.to_string());
    if tree.authorizes(&negated, label, command, cache) {
        return Outcome::Disallowed;
    }

    let positive = Principal::User(user.to_string());
    if tree.authorizes(&positive, label, command, cache) {
        return Outcome::Allowed;
    }

    let groups = users.groups_of(user);
    for group in &groups {
        if tree.authorizes(&Principal::Group(group.clone()), label, command, cache) {
            return Outcome::AllowedByGroup(group.clone());
        }
    }

    if training.is_global() {
        return Outcome::Training;
    }
    if training.contains(&negated, label) {
        return Outcome::Disallowed;
    }
    if training.contains(&positive, label) {
        return Outcome::Training;
    }
    for group in &groups {
        if training.contains(&Principal::Group(group.clone()), label) {
            return Outcome::TrainingByGroup(group.clone());
        }
    }

    Outcome::Disallowed
}
