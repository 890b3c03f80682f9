use std::fmt;

/// Pipeline stages that report progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Crawl,
    Hash,
    Size,
    Type,
    SanityCheck,
    ZapUniques,
    ZapDuplicates,
    PruneFolders,
    UnZap,
    Integrity,
    MergeZaps,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Crawl => "Crawling",
            Stage::Hash => "Hashing",
            Stage::Size => "Sizing",
            Stage::Type => "Typing",
            Stage::SanityCheck => "Sanity checking",
            Stage::ZapUniques => "Zapping",
            Stage::ZapDuplicates => "Removing duplicates",
            Stage::PruneFolders => "Removing empty folders",
            Stage::UnZap => "Un-zapping",
            Stage::Integrity => "Checking integrity",
            Stage::MergeZaps => "Merging zaps",
        };
        f.write_str(s)
    }
}

/// Trait for reporting stage progress.
///
/// The CLI implements it with indicatif bars. All methods have default
/// no-op implementations. `total` of zero means the size is not known upfront.
pub trait ProgressReporter: Send + Sync {
    fn on_stage_start(&self, _stage: Stage, _total: u64) {}
    fn on_task_complete(&self, _stage: Stage) {}
    fn on_stage_complete(&self, _stage: Stage) {}
    fn on_message(&self, _message: &str) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
