use std::collections::BTreeMap;
use std::io::Write;

use sshdo_core::encode_command;

use crate::coalesce::{Mark, Observations};

/// Write coalesced observations as policy directive text: one line per
/// command for the principals that stand, then a commented line for the
/// ones that do not. `user/label` forms are dropped when the same user
/// already appears unlabelled with the same mark.
pub fn render_directives(observations: &Observations, out: &mut impl Write) -> std::io::Result<()> {
    for (command, principals) in observations {
        let encoded = encode_command(command);
        let allowed = select(principals, Mark::Allowed);
        let commented = select(principals, Mark::Commented);
        if !allowed.is_empty() {
            writeln!(out, "{}: {}", allowed.join(" "), encoded)?;
        }
        if !commented.is_empty() {
            writeln!(out, "# {}: {}", commented.join(" "), encoded)?;
        }
    }
    Ok(())
}

fn select(principals: &BTreeMap<String, Mark>, mark: Mark) -> Vec<String> {
    principals
        .iter()
        .filter(|(_, m)| **m == mark)
        .filter(|(name, _)| {
            // Redundant labelled form of an already-listed principal.
            match name.split_once('/') {
                Some((base, _)) => principals.get(base) != Some(&mark),
                None => true,
            }
        })
        .map(|(name, _)| name.clone())
        .collect()
}
