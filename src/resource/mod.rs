//! Source and destination collaborators over SQLite.

mod destination;
mod record;
mod source;

pub use destination::Destination;
pub use record::Record;
pub use source::Source;
