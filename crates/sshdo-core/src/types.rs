use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// Principal — a user, a negated user, or a group
// ---------------------------------------------------------------------------

/// The subject of a policy directive. There is no negated-group form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Principal {
    User(String),
    NegUser(String),
    Group(String),
}

impl Principal {
    pub fn name(&self) -> &str {
        match self {
            Principal::User(n) | Principal::NegUser(n) | Principal::Group(n) => n,
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Principal::NegUser(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(n) => write!(f, "{}", n),
            Principal::NegUser(n) => write!(f, "-{}", n),
            Principal::Group(n) => write!(f, "+{}", n),
        }
    }
}

// ---------------------------------------------------------------------------
// LabelKey — a specific key label, or the any-label sentinel
// ---------------------------------------------------------------------------

/// Policy entries are keyed by the label the forced command was invoked
/// with. `Any` matches invocations that supplied no label as well as ones
/// that did; lookups consult the specific label first, then `Any`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabelKey {
    Any,
    Label(String),
}

impl LabelKey {
    /// Whether two label keys can apply to the same invocation.
    pub fn overlaps(&self, other: &LabelKey) -> bool {
        match (self, other) {
            (LabelKey::Any, _) | (_, LabelKey::Any) => true,
            (LabelKey::Label(a), LabelKey::Label(b)) => a == b,
        }
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKey::Any => Ok(()),
            LabelKey::Label(l) => write!(f, "/{}", l),
        }
    }
}

/// Parse one principal token of the form `[+-]name[/label]`.
///
/// Labels may not be empty, contain whitespace, or contain a colon; the
/// token itself was produced by whitespace splitting so only the colon
/// needs rejecting here.
pub fn parse_principal(token: &str) -> CoreResult<(Principal, LabelKey)> {
    let (body, label) = match token.split_once('/') {
        Some((body, label)) => {
            if label.is_empty() {
                return Err(CoreError::BadPrincipal(
                    token.to_string(),
                    "empty label".into(),
                ));
            }
            if label.contains(':') {
                return Err(CoreError::BadPrincipal(
                    token.to_string(),
                    "colon in label".into(),
                ));
            }
            (body, LabelKey::Label(label.to_string()))
        }
        None => (token, LabelKey::Any),
    };

    let principal = if let Some(group) = body.strip_prefix('+') {
        Principal::Group(group.to_string())
    } else if let Some(user) = body.strip_prefix('-') {
        Principal::NegUser(user.to_string())
    } else {
        Principal::User(body.to_string())
    };

    if principal.name().is_empty() {
        return Err(CoreError::BadPrincipal(
            token.to_string(),
            "empty name".into(),
        ));
    }
    if principal.name().contains(':') {
        return Err(CoreError::BadPrincipal(
            token.to_string(),
            "colon in name".into(),
        ));
    }

    Ok((principal, label))
}

// ---------------------------------------------------------------------------
// MatchStyle — how `#` runs in command patterns are interpreted
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchStyle {
    /// `#` is an ordinary character.
    Exact,
    /// A lone `#` matches any decimal digit run; `##…` pins the width.
    #[default]
    Digits,
    /// As `Digits`, with the hexadecimal alphabet.
    HexDigits,
}

impl MatchStyle {
    /// Character class (regex body, no brackets) of a digit run under this
    /// style, `#` included.
    pub fn run_class(&self) -> &'static str {
        match self {
            MatchStyle::Exact | MatchStyle::Digits => "#0-9",
            MatchStyle::HexDigits => "#0-9a-fA-F",
        }
    }

    /// Alphabet of the variable-width form, without `#`.
    pub fn digit_class(&self) -> &'static str {
        match self {
            MatchStyle::Exact | MatchStyle::Digits => "0-9",
            MatchStyle::HexDigits => "0-9a-fA-F",
        }
    }
}

impl FromStr for MatchStyle {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchStyle::Exact),
            "digits" => Ok(MatchStyle::Digits),
            "hexdigits" => Ok(MatchStyle::HexDigits),
            _ => Err(CoreError::UnknownMatchStyle(s.to_string())),
        }
    }
}

impl fmt::Display for MatchStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStyle::Exact => write!(f, "exact"),
            MatchStyle::Digits => write!(f, "digits"),
            MatchStyle::HexDigits => write!(f, "hexdigits"),
        }
    }
}

// ---------------------------------------------------------------------------
// Facility — the closed list of permitted syslog facilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facility {
    #[default]
    Auth,
    Daemon,
    User,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl Facility {
    /// Numeric facility code as defined by syslog(3).
    pub fn code(&self) -> u8 {
        match self {
            Facility::Auth => 4,
            Facility::Daemon => 3,
            Facility::User => 1,
            Facility::Local0 => 16,
            Facility::Local1 => 17,
            Facility::Local2 => 18,
            Facility::Local3 => 19,
            Facility::Local4 => 20,
            Facility::Local5 => 21,
            Facility::Local6 => 22,
            Facility::Local7 => 23,
        }
    }
}

impl FromStr for Facility {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auth" => Ok(Facility::Auth),
            "daemon" => Ok(Facility::Daemon),
            "user" => Ok(Facility::User),
            "local0" => Ok(Facility::Local0),
            "local1" => Ok(Facility::Local1),
            "local2" => Ok(Facility::Local2),
            "local3" => Ok(Facility::Local3),
            "local4" => Ok(Facility::Local4),
            "local5" => Ok(Facility::Local5),
            "local6" => Ok(Facility::Local6),
            "local7" => Ok(Facility::Local7),
            _ => Err(CoreError::UnknownFacility(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome — the five-way decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    AllowedByGroup(String),
    Training,
    TrainingByGroup(String),
    Disallowed,
}

impl Outcome {
    /// Whether the requested command gets executed.
    pub fn permits_exec(&self) -> bool {
        !matches!(self, Outcome::Disallowed)
    }

    /// The `type` field of the audit record for this outcome.
    pub fn record_type(&self) -> &'static str {
        match self {
            Outcome::Allowed | Outcome::AllowedByGroup(_) => "allowed",
            Outcome::Training | Outcome::TrainingByGroup(_) => "training",
            Outcome::Disallowed => "disallowed",
        }
    }

    /// The group that granted access, when one did.
    pub fn group(&self) -> Option<&str> {
        match self {
            Outcome::AllowedByGroup(g) | Outcome::TrainingByGroup(g) => Some(g),
            _ => None,
        }
    }
}
