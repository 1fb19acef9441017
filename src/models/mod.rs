pub mod analysis;
pub mod digest;
pub mod loaders;
pub mod paper;
pub mod specialty;
pub mod usage;

pub use analysis::{AnalysisResult, AnalysisStage, FailedItem, ReconciledScore, ScoreBreakdown};
pub use digest::{
    Digest, DigestNarrative, KeywordCount, ScoreDistribution, SpecialtyGroup, SpecialtyStats,
    TopPaper,
};
pub use loaders::{load_all_toml_files, load_toml_papers};
pub use paper::PaperRecord;
pub use specialty::Specialty;
pub use usage::{CallFailureRecord, TokenUsageRecord, UsageSummary};
