//! Client-side view over the server-paginated collection of generated content.

pub mod aggregator;
pub mod traits;
pub mod view;

pub use aggregator::{AggregationFetchError, ContentLibrary, LoadOutcome};
pub use traits::{FeedbackSink, KitFetcher, KitPage};
pub use view::{GroupKey, LibraryView, ViewGroup};
