//! Built-in blocks for common equation terms.
//!
//! Each block is a [`Block`](rewind_core::Block) like any user-defined one;
//! the tape gives them no special treatment.

mod constant;
mod linear_combination;
mod mat_vec;
mod pointwise;
mod product;

pub use constant::Constant;
pub use linear_combination::LinearCombination;
pub use mat_vec::MatVec;
pub use pointwise::Pointwise;
pub use product::Product;
