pub mod cache;
pub mod csv_table;

pub use cache::*;
pub use csv_table::{read_rows, write_rows, HEADERS};
