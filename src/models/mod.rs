use thiserror::Error;

/// Text enum stored as a lowercase column value.
macro_rules! text_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::ParseEnumError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::models::ParseEnumError {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;

mod article;
mod headline;
mod log;
mod research;
mod source;
mod stats;

pub use article::{Article, ArticleStatus, NewArticle, ReviewDecision, ReviewQueueItem};
pub use headline::{Headline, HeadlineOrigin, HeadlineStatus, NewHeadline};
pub use log::{LogEntry, LogStatus, NewLogEntry, ProcessType};
pub use research::{NewResearch, Research, ResearchSource};
pub use source::Source;
pub use stats::{ProcessingStats, WorkflowStats};

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
