use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

pub mod annotations;
pub mod config;
pub mod engine;
pub mod error;
pub mod navigation;
pub mod render;
pub mod scale;
pub mod source;
pub mod viewer;
pub mod visibility;

#[cfg(test)]
mod testing;

pub use annotations::{build_overlay, AnnotationOverlay, HitRegion, LinkTarget, RegionRect};
pub use config::ViewerConfig;
pub use engine::{
    Annotation, AnnotationKind, Destination, DestinationEntry, DestinationRef, Document,
    DocumentEngine, DocRect, Page, PageRef, TextContent, TextItem, Viewport,
};
pub use error::{NavigationError, ViewerError};
pub use navigation::{NavigationController, ScrollBehavior, ScrollCommand};
pub use render::{PageSurface, PassOutcome, PassState, RenderOrchestrator, TextSpan};
pub use scale::{PinchTracker, ResizeDebouncer, ScaleLimits, TouchPoint, ViewportScaler, WheelEvent};
pub use source::DocumentSource;
pub use viewer::{LinkActivation, ViewerHost, ViewerSession, ViewerStatus};
pub use visibility::{IntersectionEntry, ObserverHandle, PageVisibilityTracker};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3d6a1f0e-5b7c-5f2a-9e41-0c8d2b7f6a13").expect("valid namespace UUID")
});

/// Stable identity for a document source; two loads of the same URL share an id.
pub fn document_id_for_source(url: &Url) -> DocumentId {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, url.as_str().as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub source: Url,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; (width as usize) * (height as usize) * 4],
        }
    }
}
