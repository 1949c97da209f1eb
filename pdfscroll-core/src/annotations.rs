use tracing::trace;

use crate::engine::{
    Annotation, AnnotationKind, DestinationEntry, DestinationRef, DocRect, Document, PageRef,
    Viewport,
};
use crate::error::NavigationError;
use crate::render::PageSurface;

/// Axis-aligned rectangle in render space (pixels, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl RegionRect {
    pub fn from_corners(rect: DocRect) -> Self {
        Self {
            left: rect.x0.min(rect.x1),
            top: rect.y0.min(rect.y1),
            width: (rect.x0 - rect.x1).abs(),
            height: (rect.y0 - rect.y1).abs(),
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    External { url: String },
    Internal { dest: DestinationRef },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HitRegion {
    pub rect: RegionRect,
    pub target: LinkTarget,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationOverlay {
    regions: Vec<HitRegion>,
}

impl AnnotationOverlay {
    pub fn regions(&self) -> &[HitRegion] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&HitRegion> {
        self.regions.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// Later regions sit above earlier ones, so the last match wins.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<usize> {
        self.regions
            .iter()
            .rposition(|region| region.rect.contains(x, y))
    }
}

/// Replaces the surface's hit-regions with one region per link annotation.
pub fn build_overlay(surface: &mut PageSurface, annotations: &[Annotation], viewport: &Viewport) {
    surface.overlay.clear();
    for annotation in annotations {
        let target = match &annotation.kind {
            AnnotationKind::ExternalLink { url } => LinkTarget::External { url: url.clone() },
            AnnotationKind::InternalLink { dest } => LinkTarget::Internal { dest: dest.clone() },
            AnnotationKind::Other { subtype } => {
                trace!(page = surface.number, %subtype, "skipping non-link annotation");
                continue;
            }
        };
        let rect = RegionRect::from_corners(viewport.convert_rect(annotation.rect));
        surface.overlay.regions.push(HitRegion { rect, target });
    }
}

/// Resolves an internal link destination to a 1-based page number.
pub async fn resolve_destination_page(
    document: &dyn Document,
    dest: &DestinationRef,
) -> Result<usize, NavigationError> {
    let destination = match dest {
        DestinationRef::Explicit(destination) => destination.clone(),
        DestinationRef::Named(name) => document
            .resolve_destination(name)
            .await
            .map_err(NavigationError::Engine)?
            .ok_or_else(|| NavigationError::MissingDestination { name: name.clone() })?,
    };

    let Some(DestinationEntry::Page(page_ref)) = destination.first() else {
        return Err(NavigationError::MalformedDestination);
    };

    let index = match page_ref {
        PageRef::Index(index) => *index,
        PageRef::Object { .. } => document
            .page_index_of(page_ref)
            .await
            .map_err(NavigationError::Engine)?,
    };

    let page_count = document.page_count();
    match index.checked_add(1) {
        Some(page) if page <= page_count => Ok(page),
        page => Err(NavigationError::PageOutOfRange {
            page: page.unwrap_or(usize::MAX),
            page_count,
        }),
    }
}
