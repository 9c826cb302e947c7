pub mod format;
pub mod hash;
pub mod stability;
pub mod staging;

pub use format::*;
pub use hash::*;
pub use stability::*;
pub use staging::*;
