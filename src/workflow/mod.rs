pub mod item_analyzer;
pub mod item_ctx;
pub mod prompts;
pub mod response_parser;

pub use item_analyzer::{failed_item, AnalysisState, ItemAnalyzer, ItemOutcome, CANCELLED_BEFORE_START};
pub use item_ctx::ItemCtx;
pub use prompts::NarrativeField;
pub use response_parser::{Extraction, ParseError};
