pub mod batch;
pub mod models;
pub mod paths;
pub mod queries;
pub mod sqlite;

pub use batch::BatchCursor;
pub use sqlite::Database;
