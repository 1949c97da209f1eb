use std::collections::BTreeMap;

use tracing::trace;

/// Identifies one observation session. A handle becomes invalid as soon as
/// the tracker is disconnected or re-observes a new set of surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle {
    pub generation: u64,
    id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub page: usize,
    /// Visible fraction of the page surface inside the scroll viewport.
    pub ratio: f32,
}

#[derive(Debug)]
pub struct PageVisibilityTracker {
    threshold: f32,
    handle: Option<ObserverHandle>,
    next_id: u64,
    ratios: BTreeMap<usize, f32>,
}

impl Default for PageVisibilityTracker {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl PageVisibilityTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            handle: None,
            next_id: 1,
            ratios: BTreeMap::new(),
        }
    }

    pub fn handle(&self) -> Option<ObserverHandle> {
        self.handle
    }

    pub fn observed_pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.ratios.keys().copied()
    }

    pub fn observe<I>(&mut self, generation: u64, pages: I) -> ObserverHandle
    where
        I: IntoIterator<Item = usize>,
    {
        let handle = ObserverHandle {
            generation,
            id: self.next_id,
        };
        self.next_id += 1;
        self.ratios = pages.into_iter().map(|page| (page, 0.0)).collect();
        self.handle = Some(handle);
        handle
    }

    pub fn disconnect(&mut self) {
        self.handle = None;
        self.ratios.clear();
    }

    /// Feeds one batch of host notifications. Returns the topmost page whose
    /// ratio crossed the threshold from below in this batch.
    pub fn on_intersections(
        &mut self,
        handle: ObserverHandle,
        entries: &[IntersectionEntry],
    ) -> Option<usize> {
        if self.handle != Some(handle) {
            trace!(?handle, "dropping notification from stale observer");
            return None;
        }

        let mut crossed: Option<usize> = None;
        for entry in entries {
            let Some(previous) = self.ratios.get_mut(&entry.page) else {
                continue;
            };
            let was_visible = *previous >= self.threshold;
            *previous = entry.ratio;
            if !was_visible && entry.ratio >= self.threshold {
                crossed = Some(crossed.map_or(entry.page, |page| page.min(entry.page)));
            }
        }
        crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(page: usize, ratio: f32) -> IntersectionEntry {
        IntersectionEntry { page, ratio }
    }

    #[test]
    fn crossing_threshold_reports_page() {
        let mut tracker = PageVisibilityTracker::default();
        let handle = tracker.observe(1, 1..=3);
        assert_eq!(tracker.on_intersections(handle, &[entry(1, 0.9)]), Some(1));
        assert_eq!(
            tracker.on_intersections(handle, &[entry(1, 0.3), entry(2, 0.6)]),
            Some(2)
        );
    }

    #[test]
    fn staying_above_threshold_is_not_a_new_crossing() {
        let mut tracker = PageVisibilityTracker::default();
        let handle = tracker.observe(1, 1..=3);
        tracker.on_intersections(handle, &[entry(2, 0.7)]);
        assert_eq!(tracker.on_intersections(handle, &[entry(2, 0.8)]), None);
    }

    #[test]
    fn simultaneous_crossings_pick_topmost() {
        let mut tracker = PageVisibilityTracker::default();
        let handle = tracker.observe(4, 1..=6);
        let reported = tracker.on_intersections(
            handle,
            &[entry(5, 1.0), entry(3, 0.5), entry(4, 1.0)],
        );
        assert_eq!(reported, Some(3));
    }

    #[test]
    fn stale_handle_is_ignored() {
        let mut tracker = PageVisibilityTracker::default();
        let old = tracker.observe(1, 1..=2);
        let fresh = tracker.observe(2, 1..=2);
        assert_eq!(tracker.on_intersections(old, &[entry(1, 1.0)]), None);
        assert_eq!(tracker.on_intersections(fresh, &[entry(1, 1.0)]), Some(1));

        tracker.disconnect();
        assert_eq!(tracker.on_intersections(fresh, &[entry(2, 1.0)]), None);
    }

    #[test]
    fn unobserved_pages_are_ignored() {
        let mut tracker = PageVisibilityTracker::default();
        let handle = tracker.observe(1, [1, 2]);
        assert_eq!(tracker.on_intersections(handle, &[entry(7, 1.0)]), None);
    }
}
