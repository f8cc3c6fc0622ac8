pub mod content;
pub mod credibility;
pub mod generation;
pub mod intake;
pub mod processor;
pub mod research;
pub mod sources;
pub mod workflow;

pub use intake::{add_headline, import_headlines, validate_headline, ImportReport};
pub use processor::{BatchSummary, HeadlineProcessor, ProcessOutcome, ProcessorSettings};
pub use workflow::{ReviewOutcome, WorkflowManager};
