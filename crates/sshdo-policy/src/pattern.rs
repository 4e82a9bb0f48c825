use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use regex::Regex;
use sshdo_core::MatchStyle;

use crate::error::{PolicyError, PolicyResult};

// ---------------------------------------------------------------------------
// CommandPattern — one policy command string, compiled
// ---------------------------------------------------------------------------

/// A compiled policy command pattern. Patterns without `#`, and every
/// pattern under the `exact` style, compare by byte equality; the rest
/// compile to an anchored regex once and are reused.
#[derive(Debug)]
pub enum CommandPattern {
    Literal(String),
    Matcher { source: String, regex: Regex },
}

impl CommandPattern {
    pub fn compile(pattern: &str, style: MatchStyle) -> PolicyResult<Self> {
        if style == MatchStyle::Exact || !pattern.contains('#') {
            return Ok(CommandPattern::Literal(pattern.to_string()));
        }

        let mut expr = String::with_capacity(pattern.len() + 16);
        expr.push('^');
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '#' {
                let mut width = 1;
                while chars.peek() == Some(&'#') {
                    chars.next();
                    width += 1;
                }
                if width == 1 {
                    // A lone `#` matches itself or a digit run of any width;
                    // longer runs pin the exact width observed.
                    expr.push_str(&format!("(?:#|[{}]+)", style.digit_class()));
                } else {
                    expr.push_str(&format!("[{}]{{{}}}", style.run_class(), width));
                }
            } else if c.is_ascii_alphanumeric() || c == '_' || c == '/' {
                expr.push(c);
            } else {
                expr.push_str(&regex::escape(&c.to_string()));
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| PolicyError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(CommandPattern::Matcher {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        match self {
            CommandPattern::Literal(s) => s,
            CommandPattern::Matcher { source, .. } => source,
        }
    }

    pub fn matches(&self, command: &str) -> bool {
        match self {
            CommandPattern::Literal(s) => s == command,
            CommandPattern::Matcher { regex, .. } => regex.is_match(command),
        }
    }
}

// ---------------------------------------------------------------------------
// PatternCache — one compiled matcher per unique policy pattern
// ---------------------------------------------------------------------------

/// Memoised pattern compilation for a fixed match style. The whole tool is
/// single-shot and single-threaded, so interior mutability is enough.
pub struct PatternCache {
    style: MatchStyle,
    compiled: RefCell<HashMap<String, Rc<CommandPattern>>>,
}

impl PatternCache {
    pub fn new(style: MatchStyle) -> Self {
        Self {
            style,
            compiled: RefCell::new(HashMap::new()),
        }
    }

    pub fn style(&self) -> MatchStyle {
        self.style
    }

    pub fn matches(&self, pattern: &str, command: &str) -> bool {
        self.matcher(pattern).matches(command)
    }

    fn matcher(&self, pattern: &str) -> Rc<CommandPattern> {
        if let Some(compiled) = self.compiled.borrow().get(pattern) {
            return compiled.clone();
        }
        let compiled = Rc::new(match CommandPattern::compile(pattern, self.style) {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::warn!("cannot compile pattern {:?}: {}", pattern, e);
                CommandPattern::Literal(pattern.to_string())
            }
        });
        self.compiled
            .borrow_mut()
            .insert(pattern.to_string(), compiled.clone());
        compiled
    }
}
