//! Sequential, generation-guarded rendering of every page of a document.
//!
//! A pass captures the live generation when it starts and re-checks it after
//! each suspension point. Once the generation moves on, the pass stops
//! without touching the host again, so only the newest pass ever writes to
//! the view.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::annotations::{build_overlay, AnnotationOverlay, RegionRect};
use crate::engine::{Document, TextContent, Viewport};
use crate::error::ViewerError;
use crate::navigation::{ScrollBehavior, ScrollCommand};
use crate::viewer::ViewerHost;
use crate::visibility::PageVisibilityTracker;
use crate::RenderImage;

#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub rect: RegionRect,
}

/// Everything the host needs to display one page. Only complete surfaces
/// are ever handed to the host.
#[derive(Debug, Clone)]
pub struct PageSurface {
    pub number: usize,
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    pub image: RenderImage,
    pub text_layer: Vec<TextSpan>,
    pub overlay: AnnotationOverlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Clearing,
    RenderingPage(usize),
    Attaching,
    Done,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// A pass for the live generation was already running.
    Ignored,
    Done { generation: u64, pages: usize },
    Aborted { generation: u64, attached: usize },
}

pub struct RenderOrchestrator {
    live: AtomicU64,
    in_flight: Mutex<Option<u64>>,
    state: Mutex<PassState>,
}

impl Default for RenderOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

struct PassSlot<'a> {
    slot: &'a Mutex<Option<u64>>,
    generation: u64,
}

impl Drop for PassSlot<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if *slot == Some(self.generation) {
            *slot = None;
        }
    }
}

impl RenderOrchestrator {
    pub fn new() -> Self {
        Self {
            live: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            state: Mutex::new(PassState::Idle),
        }
    }

    pub fn generation(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Supersedes whatever pass is in flight; it stops at its next check.
    pub fn invalidate(&self) -> u64 {
        self.live.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn state(&self) -> PassState {
        *self.state.lock()
    }

    pub fn is_rendering(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    fn transition(&self, generation: u64, state: PassState) {
        if self.is_current(generation) {
            *self.state.lock() = state;
        }
    }

    fn claim(&self) -> Option<PassSlot<'_>> {
        let mut slot = self.in_flight.lock();
        if let Some(active) = *slot {
            if self.is_current(active) {
                return None;
            }
        }
        let generation = self.invalidate();
        *slot = Some(generation);
        Some(PassSlot {
            slot: &self.in_flight,
            generation,
        })
    }

    /// Tears down the previous surfaces and renders pages `1..=N` in order.
    /// `restore_page` is read once the pass completes to reposition the view.
    #[instrument(skip_all, fields(pages = document.page_count(), scale = scale))]
    pub async fn render_all(
        &self,
        document: &dyn Document,
        scale: f32,
        host: &dyn ViewerHost,
        tracker: &Mutex<PageVisibilityTracker>,
        restore_page: &(dyn Fn() -> usize + Send + Sync),
    ) -> Result<PassOutcome, ViewerError> {
        let Some(pass) = self.claim() else {
            debug!("render pass already in flight for the live generation");
            return Ok(PassOutcome::Ignored);
        };
        let generation = pass.generation;
        let page_count = document.page_count();

        self.transition(generation, PassState::Clearing);
        tracker.lock().disconnect();
        host.clear_pages();

        let mut attached = Vec::with_capacity(page_count);
        for number in 1..=page_count {
            if !self.is_current(generation) {
                return Ok(self.abort(generation, attached.len()));
            }
            self.transition(generation, PassState::RenderingPage(number));

            let surface = match self.produce_surface(document, number, scale, generation).await {
                Ok(Some(surface)) => surface,
                Ok(None) => return Ok(self.abort(generation, attached.len())),
                Err(source) => {
                    if !self.is_current(generation) {
                        return Ok(self.abort(generation, attached.len()));
                    }
                    warn!(page = number, error = ?source, "page render failed");
                    self.transition(generation, PassState::Failed);
                    let handle = tracker.lock().observe(generation, attached.iter().copied());
                    host.observe_pages(handle, &attached);
                    return Err(ViewerError::Render {
                        page: number,
                        source,
                    });
                }
            };

            if !self.is_current(generation) {
                return Ok(self.abort(generation, attached.len()));
            }
            host.attach_page(surface);
            attached.push(number);
        }

        if !self.is_current(generation) {
            return Ok(self.abort(generation, attached.len()));
        }
        self.transition(generation, PassState::Attaching);
        let handle = tracker.lock().observe(generation, attached.iter().copied());
        host.observe_pages(handle, &attached);
        if page_count > 0 {
            host.scroll_to_page(ScrollCommand {
                page: restore_page().clamp(1, page_count),
                behavior: ScrollBehavior::Instant,
            });
        }
        self.transition(generation, PassState::Done);
        info!(generation, pages = page_count, "render pass complete");
        Ok(PassOutcome::Done {
            generation,
            pages: page_count,
        })
    }

    fn abort(&self, generation: u64, attached: usize) -> PassOutcome {
        debug!(generation, attached, "render pass superseded");
        let active = *self.in_flight.lock();
        let replaced = active.map_or(false, |active| active != generation);
        if !replaced {
            *self.state.lock() = PassState::Aborted;
        }
        PassOutcome::Aborted {
            generation,
            attached,
        }
    }

    /// `Ok(None)` when the pass went stale while waiting on the engine.
    async fn produce_surface(
        &self,
        document: &dyn Document,
        number: usize,
        scale: f32,
        generation: u64,
    ) -> Result<Option<PageSurface>> {
        let page = document
            .page(number)
            .await
            .with_context(|| format!("failed to load page {number}"))?;
        if !self.is_current(generation) {
            return Ok(None);
        }

        let viewport = page.viewport(scale);
        let image = page
            .render(&viewport)
            .await
            .with_context(|| format!("failed to rasterize page {number}"))?;
        if !self.is_current(generation) {
            return Ok(None);
        }

        let text = page
            .text_content()
            .await
            .with_context(|| format!("failed to extract text for page {number}"))?;
        let annotations = page
            .annotations()
            .await
            .with_context(|| format!("failed to read annotations for page {number}"))?;
        if !self.is_current(generation) {
            return Ok(None);
        }

        let mut surface = PageSurface {
            number,
            generation,
            width: image.width,
            height: image.height,
            image,
            text_layer: text_layer(&text, &viewport),
            overlay: AnnotationOverlay::default(),
        };
        build_overlay(&mut surface, &annotations, &viewport);
        Ok(Some(surface))
    }
}

fn text_layer(text: &TextContent, viewport: &Viewport) -> Vec<TextSpan> {
    text.items
        .iter()
        .filter(|item| !item.text.trim().is_empty())
        .map(|item| TextSpan {
            text: item.text.clone(),
            rect: RegionRect::from_corners(viewport.convert_rect(item.rect)),
        })
        .collect()
}
