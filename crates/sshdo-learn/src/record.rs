use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use regex::Regex;
use sshdo_core::unescape_value;

use crate::error::{LearnError, LearnResult};

/// The program name records are logged under.
pub const PROGNAME: &str = "sshdo";

/// One decoded audit record, with its provenance for error messages.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub record_type: String,
    pub user: String,
    pub remoteip: Option<String>,
    pub label: Option<String>,
    pub command: String,
    pub group: Option<String>,
    pub config: Option<String>,
    pub filename: String,
    pub linenumber: u64,
}

// ---------------------------------------------------------------------------
// RecordParser — recognise this tool's records among syslog noise
// ---------------------------------------------------------------------------

/// Escaped-value grammar: anything but a bare quote or backslash, or one
/// of the three escape forms.
const VALUE: &str = r#"(?:[^"\\]|\\\\|\\"|\\x[0-9A-Fa-f]{2})*"#;

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let expr = format!(
            "{s}type=\"({v})\"{s}user=\"({v})\"(?:{s}remoteip=\"({v})\")?\
             (?:{s}label=\"({v})\")?{s}command=\"({v})\"(?:{s}group=\"({v})\")?\
             (?:{s}config=\"({v})\")?\\s*$",
            s = " ",
            v = VALUE
        );
        Regex::new(&expr).expect("record field regex is valid")
    })
}

#[derive(Debug, Default)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        Self
    }

    /// Decode one log line, or `None` when it is not one of ours. Lines
    /// that carry the program name but do not match the field grammar are
    /// skipped silently, as are values with broken escapes.
    pub fn parse(&self, line: &str, filename: &str, linenumber: u64) -> Option<LogRecord> {
        if !line.contains(" sshdo[") && !line.contains(" sshdo:") {
            return None;
        }

        let captures = field_regex().captures(line)?;
        let value = |i: usize| captures.get(i).map(|m| unescape_value(m.as_str()));

        Some(LogRecord {
            record_type: value(1)?.ok()?,
            user: value(2)?.ok()?,
            remoteip: value(3).transpose().ok()?,
            label: value(4).transpose().ok()?,
            command: value(5)?.ok()?,
            group: value(6).transpose().ok()?,
            config: value(7).transpose().ok()?,
            filename: filename.to_string(),
            linenumber,
        })
    }
}

// ---------------------------------------------------------------------------
// Log streaming
// ---------------------------------------------------------------------------

fn open(path: &Path) -> LearnResult<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    let file = std::fs::File::open(path).map_err(|source| LearnError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader: Box<dyn Read> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Stream a log file (plain, gzip, or `-` for stdin) one line at a time,
/// invoking `f` for every record this tool recognises as its own.
pub fn scan<F: FnMut(LogRecord)>(
    path: &Path,
    parser: &RecordParser,
    mut f: F,
) -> LearnResult<()> {
    let filename = path.display().to_string();
    let mut reader = open(path)?;
    let mut buf = Vec::new();
    let mut linenumber = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| LearnError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            return Ok(());
        }
        linenumber += 1;
        let line = String::from_utf8_lossy(&buf);
        if let Some(record) = parser.parse(line.trim_end_matches(['\n', '\r']), &filename, linenumber)
        {
            f(record);
        }
    }
}
