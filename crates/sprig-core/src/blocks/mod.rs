//! Control-flow blocks driven by the effect tree.

mod if_block;

pub use if_block::{Branches, ChainLink, branch_effects, if_block};
