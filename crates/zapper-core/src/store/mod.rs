pub mod integrity;
pub mod layout;
pub mod merge;
pub mod prune;
pub mod transfer;
pub mod unzap;
pub mod zap;

pub use integrity::{integrity, IntegritySummary};
pub use layout::ContentStore;
pub use merge::{merge_zaps, MergeSummary};
pub use prune::{clear_empty_folders, ClearSummary};
pub use transfer::{copy_or_move, Comparison, TransferMode, TransferOutcome};
pub use unzap::{unzap, UnzapSummary};
pub use zap::{zap, ZapSummary};
