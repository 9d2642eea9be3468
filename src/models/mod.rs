// This file declares all model modules and re-exports their contents
// This allows other parts of the code to use `use crate::models::Work`
// instead of `use crate::models::work::Work`

pub mod secret;
pub mod work;

pub use secret::*;
pub use work::*;
