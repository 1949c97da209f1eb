//! Seam between the viewer and the document engine.
//!
//! The engine parses and rasterizes documents; the viewer only sees the
//! handles below. Page numbers at this seam are 1-based, page indices
//! (as stored in destinations) are 0-based.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::source::DocumentSource;
use crate::{DocumentInfo, RenderImage};

/// Rectangle in document space: origin bottom-left, units are points.
/// Corners are not guaranteed to be ordered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl DocRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    pub page_width: f32,
    pub page_height: f32,
}

impl Viewport {
    pub fn for_page(page_width: f32, page_height: f32, scale: f32) -> Self {
        Self {
            width: page_width * scale,
            height: page_height * scale,
            scale,
            page_width,
            page_height,
        }
    }

    /// Maps a document-space rectangle into render space (origin top-left).
    /// The returned corners keep the input order; callers normalise.
    pub fn convert_rect(&self, rect: DocRect) -> DocRect {
        DocRect {
            x0: rect.x0 * self.scale,
            y0: (self.page_height - rect.y0) * self.scale,
            x1: rect.x1 * self.scale,
            y1: (self.page_height - rect.y1) * self.scale,
        }
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.max(0.0).round() as u32,
            self.height.max(0.0).round() as u32,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRef {
    /// Zero-based page index.
    Index(usize),
    /// Indirect object reference to a page dictionary.
    Object { num: u32, gen: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DestinationEntry {
    Page(PageRef),
    Name(String),
    Number(f32),
    Null,
}

pub type Destination = Vec<DestinationEntry>;

#[derive(Debug, Clone, PartialEq)]
pub enum DestinationRef {
    Explicit(Destination),
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    ExternalLink { url: String },
    InternalLink { dest: DestinationRef },
    Other { subtype: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub rect: DocRect,
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub rect: DocRect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextContent {
    pub items: Vec<TextItem>,
}

#[async_trait]
pub trait DocumentEngine: Send + Sync {
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn Document>>;
}

#[async_trait]
pub trait Document: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    async fn page(&self, number: usize) -> Result<Arc<dyn Page>>;

    /// Looks up a named destination. `Ok(None)` when the name is unknown.
    async fn resolve_destination(&self, name: &str) -> Result<Option<Destination>>;

    /// Zero-based index of the page an object reference points at.
    async fn page_index_of(&self, page_ref: &PageRef) -> Result<usize>;
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Native page size in points at scale 1.
    fn size(&self) -> (f32, f32);

    fn viewport(&self, scale: f32) -> Viewport {
        let (width, height) = self.size();
        Viewport::for_page(width, height, scale)
    }

    async fn render(&self, viewport: &Viewport) -> Result<RenderImage>;

    async fn text_content(&self) -> Result<TextContent>;

    async fn annotations(&self) -> Result<Vec<Annotation>>;
}
