//! Offline mining of the sshdo audit log.
//!
//! The learn and unlearn drivers replay audit records against the current
//! policy: learn proposes new digit-pattern directives covering what was
//! observed under training, unlearn re-emits the current authorisations
//! with the unused ones commented out. Both rest on the coalescer, which
//! folds observed commands into the tightest digit patterns consistent
//! with every observation.

pub mod coalesce;
pub mod drivers;
pub mod error;
pub mod record;
pub mod render;

pub use coalesce::{coalesce, Flavor, Mark, Observations};
pub use drivers::{learn, unlearn, DriverOptions};
pub use error::{LearnError, LearnResult};
pub use record::{scan, LogRecord, RecordParser, PROGNAME};
pub use render::render_directives;
