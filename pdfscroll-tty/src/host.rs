use parking_lot::Mutex;
use pdfscroll_core::{
    IntersectionEntry, LinkTarget, ObserverHandle, PageSurface, RenderImage, ScrollBehavior,
    ScrollCommand, ViewerHost,
};
use tracing::{debug, trace};

use crate::layout::{ScrollLayout, VisibleSlice};

/// Portion of the remaining distance covered per frame while a smooth
/// scroll is in progress.
const SMOOTH_STEP: f32 = 0.35;

/// Page image cropped to what the viewport shows.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSlice {
    pub number: usize,
    pub left: f32,
    pub screen_top: f32,
    pub image: RenderImage,
}

/// A link under the pointer, tagged with the render generation that
/// produced its surface.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkHit {
    pub page: usize,
    pub generation: u64,
    pub target: LinkTarget,
}

struct HostState {
    surfaces: Vec<PageSurface>,
    layout: ScrollLayout,
    observer: Option<(ObserverHandle, Vec<usize>)>,
    scroll_target: Option<f32>,
    pending_page: Option<usize>,
    external: Vec<String>,
    container_width: f32,
    dirty: bool,
}

/// `ViewerHost` backed by an in-memory scroll canvas that the terminal
/// front end draws from.
pub struct TerminalHost {
    state: Mutex<HostState>,
}

impl TerminalHost {
    pub fn new(width: f32, height: f32) -> Self {
        let mut layout = ScrollLayout::default();
        layout.set_viewport(width, height);
        Self {
            state: Mutex::new(HostState {
                surfaces: Vec::new(),
                layout,
                observer: None,
                scroll_target: None,
                pending_page: None,
                external: Vec::new(),
                container_width: width,
                dirty: true,
            }),
        }
    }

    pub fn set_viewport(&self, width: f32, height: f32) {
        let mut state = self.state.lock();
        state.container_width = width;
        state.layout.set_viewport(width, height);
        state.dirty = true;
    }

    pub fn attached_pages(&self) -> Vec<usize> {
        self.state.lock().surfaces.iter().map(|s| s.number).collect()
    }

    pub fn viewport_height(&self) -> f32 {
        self.state.lock().layout.viewport_height()
    }

    pub fn offset(&self) -> f32 {
        self.state.lock().layout.offset()
    }

    pub fn scroll_by(&self, delta: f32) -> bool {
        let mut state = self.state.lock();
        state.scroll_target = None;
        let moved = state.layout.scroll_by(delta);
        state.dirty |= moved;
        moved
    }

    /// Advances an in-progress smooth scroll by one frame.
    pub fn tick(&self) -> bool {
        let mut state = self.state.lock();
        let Some(target) = state.scroll_target else {
            return false;
        };
        let current = state.layout.offset();
        let remaining = target - current;
        let next = if remaining.abs() < 1.0 {
            state.scroll_target = None;
            target
        } else {
            current + remaining * SMOOTH_STEP
        };
        state.layout.scroll_to(next);
        state.dirty = true;
        true
    }

    /// Visibility of the observed pages, if an observer is connected.
    pub fn intersections(&self) -> Option<(ObserverHandle, Vec<IntersectionEntry>)> {
        let state = self.state.lock();
        let (handle, pages) = state.observer.as_ref()?;
        let entries = state
            .layout
            .intersections()
            .into_iter()
            .filter(|entry| pages.contains(&entry.page))
            .collect();
        Some((*handle, entries))
    }

    pub fn link_at(&self, x: f32, y: f32) -> Option<LinkHit> {
        let state = self.state.lock();
        let (page, local_x, local_y) = state.layout.locate(x, y)?;
        let surface = state.surfaces.iter().find(|s| s.number == page)?;
        let index = surface.overlay.hit_test(local_x, local_y)?;
        let region = surface.overlay.region(index)?;
        Some(LinkHit {
            page,
            generation: surface.generation,
            target: region.target.clone(),
        })
    }

    pub fn take_external(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().external)
    }

    /// Returns the visible slices when something changed since the last call.
    pub fn take_frame(&self) -> Option<Vec<FrameSlice>> {
        let mut state = self.state.lock();
        if !state.dirty {
            return None;
        }
        state.dirty = false;
        let slices = state.layout.visible_slices();
        let frame = slices
            .iter()
            .filter_map(|slice| {
                let surface = state.surfaces.iter().find(|s| s.number == slice.number)?;
                Some(crop(surface, slice))
            })
            .collect();
        Some(frame)
    }

    fn apply_scroll(state: &mut HostState, command: ScrollCommand) {
        let Some(offset) = state.layout.page_offset(command.page) else {
            trace!(page = command.page, "scroll target not attached yet");
            state.pending_page = Some(command.page);
            return;
        };
        state.pending_page = None;
        match command.behavior {
            ScrollBehavior::Instant => {
                state.scroll_target = None;
                state.layout.scroll_to(offset);
            }
            ScrollBehavior::Smooth => state.scroll_target = Some(offset),
        }
        state.dirty = true;
    }
}

impl ViewerHost for TerminalHost {
    fn container_width(&self) -> f32 {
        self.state.lock().container_width
    }

    fn clear_pages(&self) {
        let mut state = self.state.lock();
        state.surfaces.clear();
        state.layout.clear();
        state.observer = None;
        state.scroll_target = None;
        state.pending_page = None;
        state.dirty = true;
    }

    fn attach_page(&self, surface: PageSurface) {
        let mut state = self.state.lock();
        state.layout.push(surface.number, surface.width, surface.height);
        let number = surface.number;
        state.surfaces.push(surface);
        if state.pending_page == Some(number) {
            Self::apply_scroll(
                &mut state,
                ScrollCommand {
                    page: number,
                    behavior: ScrollBehavior::Instant,
                },
            );
        }
        state.dirty = true;
    }

    fn observe_pages(&self, handle: ObserverHandle, pages: &[usize]) {
        self.state.lock().observer = Some((handle, pages.to_vec()));
    }

    fn scroll_to_page(&self, command: ScrollCommand) {
        let mut state = self.state.lock();
        Self::apply_scroll(&mut state, command);
    }

    fn open_external(&self, url: &str) {
        debug!(url, "external link requested");
        self.state.lock().external.push(url.to_string());
    }
}

fn crop(surface: &PageSurface, slice: &VisibleSlice) -> FrameSlice {
    let stride = surface.image.width as usize * 4;
    let start = (slice.source_top as usize * stride).min(surface.image.pixels.len());
    let end = (start + slice.source_height as usize * stride).min(surface.image.pixels.len());
    let pixels = surface.image.pixels[start..end].to_vec();
    let height = if stride == 0 { 0 } else { (pixels.len() / stride) as u32 };
    FrameSlice {
        number: slice.number,
        left: slice.left,
        screen_top: slice.screen_top,
        image: RenderImage {
            width: surface.image.width,
            height,
            pixels,
        },
    }
}
