//! File system modules: exclusion rules and inventory traversal.

pub mod exclusion;
pub mod walker;

pub use exclusion::{ExclusionRule, ExclusionRules};
pub use walker::{build_inventory, FileRecord};
