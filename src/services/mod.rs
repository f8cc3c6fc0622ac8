mod notifier;
mod unsplash;
mod wordpress;

pub use notifier::{Notifier, WebhookNotifier};
pub use unsplash::{ArticleImages, Image, ImageSource, UnsplashClient};
pub use wordpress::{DocumentMetadata, DocumentStatus, NewDocument, PublishTarget, WordPressClient};
