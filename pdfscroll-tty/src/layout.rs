use pdfscroll_core::IntersectionEntry;

/// Vertical position of one attached page inside the scroll canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlot {
    pub number: usize,
    pub top: f32,
    pub width: u32,
    pub height: u32,
}

impl PageSlot {
    fn bottom(&self) -> f32 {
        self.top + self.height as f32
    }
}

/// The part of a page that falls inside the viewport, in page pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleSlice {
    pub number: usize,
    pub left: f32,
    pub screen_top: f32,
    pub source_top: u32,
    pub source_height: u32,
}

/// Pages stacked top to bottom with a fixed gap, scrolled by a pixel offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollLayout {
    slots: Vec<PageSlot>,
    gap: f32,
    offset: f32,
    viewport_width: f32,
    viewport_height: f32,
}

impl ScrollLayout {
    pub const DEFAULT_GAP: f32 = 16.0;

    pub fn new(gap: f32) -> Self {
        Self {
            slots: Vec::new(),
            gap: gap.max(0.0),
            offset: 0.0,
            viewport_width: 0.0,
            viewport_height: 0.0,
        }
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn viewport_height(&self) -> f32 {
        self.viewport_height
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport_width = width.max(0.0);
        self.viewport_height = height.max(0.0);
        self.offset = self.clamp_offset(self.offset);
    }

    /// Drops every slot. The offset is kept so a re-render can restore
    /// the position explicitly.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn push(&mut self, number: usize, width: u32, height: u32) {
        let top = match self.slots.last() {
            Some(last) => last.bottom() + self.gap,
            None => 0.0,
        };
        self.slots.push(PageSlot {
            number,
            top,
            width,
            height,
        });
    }

    pub fn total_height(&self) -> f32 {
        self.slots.last().map(PageSlot::bottom).unwrap_or(0.0)
    }

    pub fn max_offset(&self) -> f32 {
        (self.total_height() - self.viewport_height).max(0.0)
    }

    fn clamp_offset(&self, offset: f32) -> f32 {
        if offset.is_nan() {
            return 0.0;
        }
        offset.clamp(0.0, self.max_offset())
    }

    pub fn scroll_by(&mut self, delta: f32) -> bool {
        self.scroll_to(self.offset + delta)
    }

    pub fn scroll_to(&mut self, offset: f32) -> bool {
        let next = self.clamp_offset(offset);
        let moved = (next - self.offset).abs() > f32::EPSILON;
        self.offset = next;
        moved
    }

    /// Offset that puts the top of `page` at the top of the viewport.
    pub fn page_offset(&self, page: usize) -> Option<f32> {
        self.slots
            .iter()
            .find(|slot| slot.number == page)
            .map(|slot| self.clamp_offset(slot.top))
    }

    /// Fraction of each page that lies inside the viewport.
    pub fn intersections(&self) -> Vec<IntersectionEntry> {
        let view_top = self.offset;
        let view_bottom = self.offset + self.viewport_height;
        self.slots
            .iter()
            .map(|slot| {
                let visible = (slot.bottom().min(view_bottom) - slot.top.max(view_top)).max(0.0);
                let ratio = if slot.height == 0 {
                    0.0
                } else {
                    visible / slot.height as f32
                };
                IntersectionEntry {
                    page: slot.number,
                    ratio,
                }
            })
            .collect()
    }

    pub fn visible_slices(&self) -> Vec<VisibleSlice> {
        let view_top = self.offset;
        let view_bottom = self.offset + self.viewport_height;
        self.slots
            .iter()
            .filter(|slot| slot.bottom() > view_top && slot.top < view_bottom)
            .map(|slot| {
                let start = slot.top.max(view_top);
                let end = slot.bottom().min(view_bottom);
                let source_top = (start - slot.top).floor() as u32;
                let source_height = ((end - start).ceil() as u32).min(slot.height - source_top);
                VisibleSlice {
                    number: slot.number,
                    left: self.left_of(slot),
                    screen_top: start - view_top,
                    source_top,
                    source_height,
                }
            })
            .collect()
    }

    /// Maps a viewport point to a page and a point in that page's pixels.
    pub fn locate(&self, x: f32, y: f32) -> Option<(usize, f32, f32)> {
        let canvas_y = y + self.offset;
        self.slots.iter().find_map(|slot| {
            let local_x = x - self.left_of(slot);
            let local_y = canvas_y - slot.top;
            let inside = local_x >= 0.0
                && local_x <= slot.width as f32
                && local_y >= 0.0
                && local_y <= slot.height as f32;
            inside.then_some((slot.number, local_x, local_y))
        })
    }

    fn left_of(&self, slot: &PageSlot) -> f32 {
        ((self.viewport_width - slot.width as f32) / 2.0).max(0.0).floor()
    }
}

impl Default for ScrollLayout {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GAP)
    }
}
