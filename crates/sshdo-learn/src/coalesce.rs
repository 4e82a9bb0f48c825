use std::collections::BTreeMap;

use regex::Regex;
use sshdo_core::MatchStyle;

// ---------------------------------------------------------------------------
// Marks and flavours
// ---------------------------------------------------------------------------

/// Whether a principal's observation of a command stands, or is emitted
/// commented out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Allowed,
    Commented,
}

/// The two drivers resolve conflicting marks in opposite directions when
/// merging observations of different commands: learn lets the commented
/// mark win, unlearn the allowed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Learn,
    Unlearn,
}

impl Flavor {
    fn merge(self, a: Mark, b: Mark) -> Mark {
        if a == b {
            return a;
        }
        match self {
            Flavor::Learn => Mark::Commented,
            Flavor::Unlearn => Mark::Allowed,
        }
    }
}

/// `command -> principal -> mark`, sorted both ways for stable output.
pub type Observations = BTreeMap<String, BTreeMap<String, Mark>>;

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

/// A command split around digit runs. Literal text and runs alternate,
/// starting and ending with a (possibly empty) literal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Run(RunSlot),
}

/// The surviving replacement candidates for one digit-run slot. The lone
/// `#` is always a candidate; the literal survives while every observation
/// agrees on it, the fixed-width form while every observation agrees on a
/// width greater than one.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RunSlot {
    literal: Option<String>,
    width: Option<usize>,
}

impl RunSlot {
    fn new(run: &str) -> Self {
        let len = run.chars().count();
        Self {
            literal: Some(run.to_string()),
            width: if len > 1 { Some(len) } else { None },
        }
    }

    fn merge(&mut self, other: &RunSlot) {
        if self.literal != other.literal {
            self.literal = None;
        }
        if self.width != other.width {
            self.width = None;
        }
    }

    /// Tightest surviving form: the literal, else the pinned width, else
    /// the lone `#`.
    fn render(&self) -> String {
        if let Some(literal) = &self.literal {
            literal.clone()
        } else if let Some(width) = self.width {
            "#".repeat(width)
        } else {
            "#".to_string()
        }
    }
}

fn segment(command: &str, run_re: &Regex) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for found in run_re.find_iter(command) {
        segments.push(Segment::Literal(command[last..found.start()].to_string()));
        segments.push(Segment::Run(RunSlot::new(found.as_str())));
        last = found.end();
    }
    segments.push(Segment::Literal(command[last..].to_string()));
    segments
}

/// Same shape: equal length, equal literal segments, run slots aligned
/// with run slots.
fn similar(a: &[Segment], b: &[Segment]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| match (x, y) {
            (Segment::Literal(x), Segment::Literal(y)) => x == y,
            (Segment::Run(_), Segment::Run(_)) => true,
            _ => false,
        })
}

fn render_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| match s {
            Segment::Literal(text) => text.clone(),
            Segment::Run(slot) => slot.render(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Coalescing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Entry {
    segments: Vec<Segment>,
    principals: BTreeMap<String, Mark>,
}

/// Fold observed commands into the minimal digit-pattern directives that
/// cover them. Under the `exact` style this is the identity.
///
/// Similarity is equality of the literal skeleton, so a command can match
/// at most one working entry. Commands are visited in sorted order and a
/// merge only ever narrows run-slot candidates, so the surviving pattern
/// does not depend on the order observations arrived in.
pub fn coalesce(observations: Observations, style: MatchStyle, flavor: Flavor) -> Observations {
    if style == MatchStyle::Exact {
        return observations;
    }

    let run_re = Regex::new(&format!("[{}]+", style.run_class())).expect("run class is valid");

    let mut work: Vec<Entry> = Vec::new();
    for (command, principals) in &observations {
        let segments = segment(command, &run_re);
        if let Some(index) = work
            .iter()
            .position(|entry| similar(&entry.segments, &segments))
        {
            let entry = &mut work[index];
            for (ours, theirs) in entry.segments.iter_mut().zip(&segments) {
                if let (Segment::Run(ours), Segment::Run(theirs)) = (ours, theirs) {
                    ours.merge(theirs);
                }
            }
            merge_principals(&mut entry.principals, principals, flavor);
        } else {
            work.push(Entry {
                segments,
                principals: principals.clone(),
            });
        }
    }

    let mut out = Observations::new();
    for entry in work {
        let pattern = render_segments(&entry.segments);
        merge_principals(out.entry(pattern).or_default(), &entry.principals, flavor);
    }
    out
}

fn merge_principals(
    into: &mut BTreeMap<String, Mark>,
    from: &BTreeMap<String, Mark>,
    flavor: Flavor,
) {
    for (principal, mark) in from {
        match into.get_mut(principal) {
            Some(existing) => *existing = flavor.merge(*existing, *mark),
            None => {
                into.insert(principal.clone(), *mark);
            }
        }
    }
}
