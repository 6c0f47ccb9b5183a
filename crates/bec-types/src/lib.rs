pub mod errors;
pub mod measurement;
pub mod space;

pub use errors::*;
pub use measurement::*;
pub use space::*;
