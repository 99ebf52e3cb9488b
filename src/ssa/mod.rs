//! SSA construction and elimination (spec §4.5, component C5).

pub mod dominance;
pub mod from_ssa;
pub mod to_ssa;

pub use dominance::DominatorTree;
pub use from_ssa::from_ssa;
pub use to_ssa::to_ssa;
