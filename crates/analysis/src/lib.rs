pub mod completeness;
pub mod duplicates;
pub mod normalize;

pub use completeness::{classify, classify_all, group_albums};
pub use duplicates::{duplicates_in_mixed, find_duplicates, DuplicateReport, MixedDuplicate};
pub use normalize::{NormalizeConfig, NormalizedFields};
