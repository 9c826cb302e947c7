pub mod document;
pub mod enums;
pub mod queue;
pub mod record;

pub use document::*;
pub use enums::*;
pub use queue::*;
pub use record::*;
