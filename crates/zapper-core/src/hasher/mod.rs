pub mod digest;
pub mod file_type;
pub mod hash_files;
pub mod sanity;
pub mod size_files;
pub mod type_files;

pub use digest::{hash_file, hash_to_hex};
pub use file_type::{detector_for, ExtensionDetector, FileCommandDetector, TypeDetector};
pub use hash_files::{HashEngine, HashSummary};
pub use sanity::{duplicate_hash_sanity_check, SanitySummary};
pub use size_files::{size_files, SizeSummary};
pub use type_files::{type_files, TypeSummary};
