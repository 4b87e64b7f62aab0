pub mod duration;
pub mod fuzzy;
pub mod ident;

pub use duration::*;
pub use ident::*;
