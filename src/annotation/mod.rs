pub mod cache;
pub mod genes;
pub mod io;

pub use genes::GeneSet;
pub use io::{GtfReader, GtfRecord, ParseError};
