pub mod gene;
pub mod regions;
pub mod transcript;

pub use gene::Gene;
pub use regions::{calc_regions, Region};
pub use transcript::Transcript;
