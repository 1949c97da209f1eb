use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to load document from {url}")]
    Load {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to render page {page}")]
    Render {
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("no document loaded")]
    NoDocument,

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Navigation failures are absorbed by the session; they exist so the
/// reason can be logged and tested.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("page input {input:?} is not a number")]
    InvalidInput { input: String },

    #[error("destination {name:?} not found")]
    MissingDestination { name: String },

    #[error("destination does not start with a page reference")]
    MalformedDestination,

    #[error("page {page} is outside 1..={page_count}")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("link belongs to a superseded render pass")]
    StaleRegion,

    #[error("document engine failed to resolve destination")]
    Engine(#[source] anyhow::Error),
}
