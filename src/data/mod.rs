pub mod json;
pub mod validate;

pub use json::{ingest, load_snapshot, parse_snapshot, LoadedSnapshot};
pub use validate::{Collection, RecordError};
