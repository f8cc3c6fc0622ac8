mod repository;
mod schema;

pub use repository::{ArticleReview, HeadlineTransition, Repository};
