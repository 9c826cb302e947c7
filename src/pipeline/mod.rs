pub mod dedup;
pub mod error;
pub mod extraction;
pub mod import;
pub mod intake;
pub mod processor;
pub mod queue;
pub mod reprocess;
pub mod slots;
pub mod table;
pub mod watcher;
pub mod worker;


pub use error::IngestError;
