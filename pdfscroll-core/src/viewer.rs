use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::annotations::{resolve_destination_page, LinkTarget};
use crate::config::ViewerConfig;
use crate::engine::{Document, DocumentEngine};
use crate::error::{NavigationError, ViewerError};
use crate::navigation::{NavigationController, ScrollCommand};
use crate::render::{PageSurface, PassOutcome, RenderOrchestrator};
use crate::scale::{PinchTracker, ResizeDebouncer, TouchPoint, ViewportScaler, WheelEvent};
use crate::source::DocumentSource;
use crate::visibility::{IntersectionEntry, ObserverHandle, PageVisibilityTracker};
use crate::DocumentInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerStatus {
    Loading,
    Ready,
    Error,
}

/// The view tree the session drives. Implementations must not call back
/// into the session from these methods.
pub trait ViewerHost: Send + Sync {
    /// Width available to the scroll container, in render pixels.
    fn container_width(&self) -> f32;
    fn clear_pages(&self);
    fn attach_page(&self, surface: PageSurface);
    /// Pages whose visibility the host should report through `handle`.
    fn observe_pages(&self, handle: ObserverHandle, pages: &[usize]);
    fn scroll_to_page(&self, command: ScrollCommand);
    fn open_external(&self, url: &str);
    fn status_changed(&self, _status: ViewerStatus) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkActivation {
    OpenedExternal { url: String },
    Navigated { page: usize },
    Absorbed,
}

/// One viewer bound to one host. All methods take `&self` so a render pass
/// can be awaited while input keeps flowing in.
pub struct ViewerSession {
    engine: Arc<dyn DocumentEngine>,
    host: Arc<dyn ViewerHost>,
    scaler: ViewportScaler,
    orchestrator: RenderOrchestrator,
    tracker: Mutex<PageVisibilityTracker>,
    navigation: Mutex<NavigationController>,
    document: Mutex<Option<Arc<dyn Document>>>,
    source: Mutex<Option<DocumentSource>>,
    scale: Mutex<f32>,
    status: Mutex<ViewerStatus>,
    pinch: Mutex<PinchTracker>,
    resize: Mutex<ResizeDebouncer>,
    loads: AtomicU64,
}

impl ViewerSession {
    pub fn new(
        engine: Arc<dyn DocumentEngine>,
        host: Arc<dyn ViewerHost>,
        config: &ViewerConfig,
    ) -> Self {
        Self {
            engine,
            host,
            scaler: ViewportScaler::new(config.scale, config.wheel_zoom_divisor),
            orchestrator: RenderOrchestrator::new(),
            tracker: Mutex::new(PageVisibilityTracker::new(config.visibility.threshold)),
            navigation: Mutex::new(NavigationController::new()),
            document: Mutex::new(None),
            source: Mutex::new(None),
            scale: Mutex::new(1.0),
            status: Mutex::new(ViewerStatus::Loading),
            pinch: Mutex::new(PinchTracker::new()),
            resize: Mutex::new(ResizeDebouncer::new(config.timing.resize_debounce)),
            loads: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ViewerStatus {
        *self.status.lock()
    }

    pub fn scale(&self) -> f32 {
        *self.scale.lock()
    }

    pub fn generation(&self) -> u64 {
        self.orchestrator.generation()
    }

    pub fn is_rendering(&self) -> bool {
        self.orchestrator.is_rendering()
    }

    pub fn document_info(&self) -> Option<DocumentInfo> {
        self.document.lock().as_ref().map(|doc| doc.info().clone())
    }

    pub fn source(&self) -> Option<DocumentSource> {
        self.source.lock().clone()
    }

    pub fn current_page(&self) -> usize {
        self.navigation.lock().current_page()
    }

    pub fn page_count(&self) -> usize {
        self.navigation.lock().page_count()
    }

    pub fn page_input_text(&self) -> String {
        self.navigation.lock().input_text().to_string()
    }

    pub fn is_page_input_focused(&self) -> bool {
        self.navigation.lock().is_input_focused()
    }

    pub fn indicator(&self) -> String {
        self.navigation.lock().indicator()
    }

    fn set_status(&self, status: ViewerStatus) {
        let changed = {
            let mut current = self.status.lock();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed {
            self.host.status_changed(status);
        }
    }

    fn current_document(&self) -> Option<Arc<dyn Document>> {
        self.document.lock().clone()
    }

    /// Opens `source` and replaces the current document. The caller renders
    /// afterwards. A newer `load` started while this one waits wins.
    #[instrument(skip(self), fields(url = %source.url))]
    pub async fn load(&self, source: DocumentSource) -> Result<(), ViewerError> {
        let ticket = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_status(ViewerStatus::Loading);
        self.orchestrator.invalidate();

        let document = match self.engine.open(&source).await {
            Ok(document) => document,
            Err(source_err) => {
                if self.loads.load(Ordering::SeqCst) == ticket {
                    warn!(error = ?source_err, "document load failed");
                    self.set_status(ViewerStatus::Error);
                }
                return Err(ViewerError::Load {
                    url: source.url.to_string(),
                    source: source_err,
                });
            }
        };
        if self.loads.load(Ordering::SeqCst) != ticket {
            debug!("discarding superseded document load");
            return Ok(());
        }

        let page_count = document.page_count();
        self.navigation.lock().reset(page_count);
        self.tracker.lock().disconnect();
        *self.document.lock() = Some(Arc::clone(&document));
        *self.source.lock() = Some(source);

        match self.fit_scale(document.as_ref()).await {
            Some(fit) => {
                *self.scale.lock() = self.scaler.clamp_scale(fit);
            }
            None => warn!("could not measure first page; keeping current scale"),
        }
        self.orchestrator.invalidate();
        self.set_status(ViewerStatus::Ready);
        info!(pages = page_count, scale = self.scale(), "document loaded");
        Ok(())
    }

    async fn fit_scale(&self, document: &dyn Document) -> Option<f32> {
        if document.page_count() == 0 {
            return None;
        }
        let page = match document.page(1).await {
            Ok(page) => page,
            Err(err) => {
                debug!(error = ?err, "first page unavailable for fit computation");
                return None;
            }
        };
        let (native_width, _) = page.size();
        Some(
            self.scaler
                .compute_fit_scale(self.host.container_width(), native_width),
        )
    }

    /// Runs one render pass of the current document at the live scale.
    pub async fn render(&self) -> Result<PassOutcome, ViewerError> {
        let document = self.current_document().ok_or(ViewerError::NoDocument)?;
        let scale = self.scale();
        let restore = || self.current_page();
        let result = self
            .orchestrator
            .render_all(
                document.as_ref(),
                scale,
                self.host.as_ref(),
                &self.tracker,
                &restore,
            )
            .await;
        match &result {
            Ok(PassOutcome::Done { .. }) => self.set_status(ViewerStatus::Ready),
            Ok(_) => {}
            Err(_) => self.set_status(ViewerStatus::Error),
        }
        result
    }

    /// Applies a clamped scale. Returns `true` when the value changed and a
    /// new render pass is required.
    pub fn set_scale(&self, raw: f32) -> bool {
        let next = self.scaler.clamp_scale(raw);
        {
            let mut scale = self.scale.lock();
            if (*scale - next).abs() <= f32::EPSILON {
                return false;
            }
            *scale = next;
        }
        debug!(scale = next, "scale changed");
        self.orchestrator.invalidate();
        true
    }

    pub fn wheel(&self, event: WheelEvent) -> bool {
        match self.scaler.wheel(self.scale(), event) {
            Some(next) => self.set_scale(next),
            None => false,
        }
    }

    pub fn pinch_begin(&self, touches: &[TouchPoint]) -> bool {
        let scale = self.scale();
        self.pinch.lock().begin(touches, scale)
    }

    pub fn pinch_update(&self, touches: &[TouchPoint]) -> bool {
        self.pinch.lock().update(&self.scaler, touches)
    }

    pub fn pinch_end(&self) {
        self.pinch.lock().end();
    }

    /// Flushes at most one coalesced pinch scale.
    pub fn animation_frame(&self) -> bool {
        let pending = self.pinch.lock().take_frame();
        match pending {
            Some(next) => self.set_scale(next),
            None => false,
        }
    }

    pub fn notify_resize(&self, now: Instant) {
        self.resize.lock().notify(now);
    }

    pub fn resize_deadline(&self) -> Option<Instant> {
        self.resize.lock().deadline()
    }

    pub fn resize_due(&self, now: Instant) -> bool {
        self.resize.lock().poll(now)
    }

    /// Recomputes the fit scale for the current container width.
    pub async fn refit(&self) -> bool {
        let Some(document) = self.current_document() else {
            return false;
        };
        match self.fit_scale(document.as_ref()).await {
            Some(fit) => self.set_scale(fit),
            None => false,
        }
    }

    pub fn on_intersections(
        &self,
        handle: ObserverHandle,
        entries: &[IntersectionEntry],
    ) -> Option<usize> {
        let page = self.tracker.lock().on_intersections(handle, entries)?;
        self.navigation.lock().on_scroll_observed_page(page);
        Some(page)
    }

    pub fn focus_page_input(&self) {
        self.navigation.lock().focus_input();
    }

    pub fn edit_page_input(&self, text: &str) {
        self.navigation.lock().edit_input(text);
    }

    pub fn cancel_page_input(&self) {
        self.navigation.lock().cancel_input();
    }

    pub fn blur_page_input(&self) -> Option<usize> {
        let result = self.navigation.lock().blur_input();
        self.issue(result)
    }

    pub fn commit_page_input(&self, text: &str) -> Option<usize> {
        let result = self.navigation.lock().commit_page_input(text);
        self.issue(result)
    }

    pub fn jump_to(&self, page: usize, animated: bool) {
        let command = self.navigation.lock().jump_to(page, animated);
        self.host.scroll_to_page(command);
    }

    fn issue(&self, result: Result<ScrollCommand, NavigationError>) -> Option<usize> {
        match result {
            Ok(command) => {
                self.host.scroll_to_page(command);
                Some(command.page)
            }
            Err(err) => {
                debug!(%err, "page input reverted");
                None
            }
        }
    }

    /// Activates a hit-region of the surface rendered in `generation`.
    /// Internal-link failures are absorbed.
    pub async fn activate_link(&self, generation: u64, target: &LinkTarget) -> LinkActivation {
        match target {
            LinkTarget::External { url } => {
                self.host.open_external(url);
                LinkActivation::OpenedExternal { url: url.clone() }
            }
            LinkTarget::Internal { dest } => {
                let result = match self.current_document() {
                    Some(_) if !self.orchestrator.is_current(generation) => {
                        Err(NavigationError::StaleRegion)
                    }
                    Some(document) => resolve_destination_page(document.as_ref(), dest).await,
                    None => return LinkActivation::Absorbed,
                };
                let page = match result {
                    Ok(page) if self.orchestrator.is_current(generation) => page,
                    Ok(_) => {
                        debug!("document changed while resolving link");
                        return LinkActivation::Absorbed;
                    }
                    Err(err) => {
                        debug!(%err, "internal link absorbed");
                        return LinkActivation::Absorbed;
                    }
                };
                self.jump_to(page, true);
                LinkActivation::Navigated { page }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use url::Url;

    use crate::engine::{DestinationEntry, DestinationRef, PageRef};
    use crate::navigation::ScrollBehavior;
    use crate::testing::{FakeDocument, FakeEngine, HostEvent, RecordingHost};
    use crate::visibility::IntersectionEntry;

    fn source() -> DocumentSource {
        DocumentSource::new(Url::parse("file:///tmp/plan.pdf").unwrap(), None)
    }

    fn session(doc: FakeDocument, width: f32) -> (ViewerSession, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::new(width));
        let session = ViewerSession::new(
            Arc::new(FakeEngine::serving(doc)),
            host.clone(),
            &ViewerConfig::default(),
        );
        (session, host)
    }

    async fn loaded(pages: usize) -> (ViewerSession, Arc<RecordingHost>) {
        let (session, host) = session(FakeDocument::new(pages).with_link_on_every_page(), 260.0);
        session.load(source()).await.unwrap();
        session.render().await.unwrap();
        (session, host)
    }

    #[tokio::test]
    async fn load_computes_fit_scale_and_becomes_ready() {
        let (session, host) = session(FakeDocument::new(3), 260.0);
        session.load(source()).await.unwrap();

        assert_eq!(session.status(), ViewerStatus::Ready);
        assert_eq!(session.page_count(), 3);
        assert!((session.scale() - 2.0).abs() < 1e-6);
        assert_eq!(
            host.statuses(),
            vec![ViewerStatus::Ready],
            "initial Loading is not a change"
        );
    }

    #[tokio::test]
    async fn load_failure_enters_error_state() {
        let host = Arc::new(RecordingHost::new(800.0));
        let session = ViewerSession::new(
            Arc::new(FakeEngine::failing()),
            host.clone(),
            &ViewerConfig::default(),
        );
        let err = session.load(source()).await.unwrap_err();
        assert!(matches!(err, ViewerError::Load { .. }));
        assert_eq!(session.status(), ViewerStatus::Error);
        assert!(matches!(
            session.render().await,
            Err(ViewerError::NoDocument)
        ));
    }

    #[tokio::test]
    async fn render_failure_sets_error_status() {
        let (session, _host) = session(FakeDocument::new(4).failing_on(2), 800.0);
        session.load(source()).await.unwrap();
        assert!(session.render().await.is_err());
        assert_eq!(session.status(), ViewerStatus::Error);
    }

    #[tokio::test]
    async fn successful_pass_clears_earlier_render_failure() {
        let (session, host) = session(FakeDocument::new(3).failing_once_on(2), 800.0);
        session.load(source()).await.unwrap();
        assert!(session.render().await.is_err());
        assert_eq!(session.status(), ViewerStatus::Error);

        assert!(session.set_scale(1.7));
        let outcome = session.render().await.unwrap();

        assert!(matches!(outcome, PassOutcome::Done { pages: 3, .. }));
        assert_eq!(session.status(), ViewerStatus::Ready);
        assert_eq!(
            host.statuses(),
            vec![ViewerStatus::Ready, ViewerStatus::Error, ViewerStatus::Ready]
        );
    }

    #[tokio::test]
    async fn typed_page_beyond_count_scrolls_once_to_last_page() {
        let (session, host) = loaded(10).await;
        host.take_events();

        session.focus_page_input();
        session.edit_page_input("15");
        assert_eq!(session.blur_page_input(), Some(10));

        assert_eq!(session.page_input_text(), "10");
        assert_eq!(session.current_page(), 10);
        assert_eq!(
            host.scroll_commands(),
            vec![ScrollCommand {
                page: 10,
                behavior: ScrollBehavior::Smooth
            }]
        );
    }

    #[tokio::test]
    async fn bad_input_never_blanks_or_scrolls() {
        let (session, host) = loaded(10).await;
        host.take_events();

        assert_eq!(session.commit_page_input("abc"), None);
        assert_eq!(session.page_input_text(), "1");
        assert_eq!(session.commit_page_input("0"), Some(1));
        assert_eq!(session.commit_page_input("-3"), Some(1));
        assert!(!session.page_input_text().is_empty());
        assert_eq!(host.scroll_commands().len(), 2);
    }

    #[tokio::test]
    async fn navigation_does_not_trigger_render() {
        let (session, host) = loaded(5).await;
        let generation = session.generation();
        session.commit_page_input("4");
        session.jump_to(2, true);
        assert_eq!(session.generation(), generation);
        assert_eq!(host.clear_count(), 1);
    }

    #[tokio::test]
    async fn external_link_never_changes_current_page() {
        let (session, host) = loaded(5).await;
        session.jump_to(3, false);
        host.take_events();

        let activation = session
            .activate_link(
                session.generation(),
                &LinkTarget::External {
                    url: "https://example.org/plan".into(),
                },
            )
            .await;

        assert_eq!(
            activation,
            LinkActivation::OpenedExternal {
                url: "https://example.org/plan".into()
            }
        );
        assert_eq!(session.current_page(), 3);
        assert_eq!(
            host.events(),
            vec![HostEvent::OpenedExternal("https://example.org/plan".into())]
        );
    }

    #[tokio::test]
    async fn internal_link_sets_page_and_scrolls_exactly_once() {
        let (session, host) = loaded(5).await;
        host.take_events();

        let surfaces = host.surfaces();
        let region = surfaces[0].overlay.region(0).unwrap().clone();
        let activation = session
            .activate_link(surfaces[0].generation, &region.target)
            .await;

        assert_eq!(activation, LinkActivation::Navigated { page: 2 });
        assert_eq!(session.current_page(), 2);
        assert_eq!(
            host.scroll_commands(),
            vec![ScrollCommand {
                page: 2,
                behavior: ScrollBehavior::Smooth
            }]
        );
    }

    #[tokio::test]
    async fn unresolvable_internal_link_is_absorbed() {
        let (session, host) = loaded(5).await;
        host.take_events();

        let activation = session
            .activate_link(
                session.generation(),
                &LinkTarget::Internal {
                    dest: DestinationRef::Named("nowhere".into()),
                },
            )
            .await;

        assert_eq!(activation, LinkActivation::Absorbed);
        assert_eq!(session.current_page(), 1);
        assert!(host.scroll_commands().is_empty());
    }

    #[tokio::test]
    async fn stale_region_is_absorbed_after_scale_change() {
        let (session, host) = loaded(5).await;
        let generation = host.surfaces()[0].generation;
        assert!(session.set_scale(2.5));
        host.take_events();

        let activation = session
            .activate_link(
                generation,
                &LinkTarget::Internal {
                    dest: DestinationRef::Explicit(vec![DestinationEntry::Page(
                        PageRef::Index(3),
                    )]),
                },
            )
            .await;
        assert_eq!(activation, LinkActivation::Absorbed);
        assert!(host.scroll_commands().is_empty());
    }

    #[tokio::test]
    async fn scroll_observation_updates_page_without_scrolling() {
        let (session, host) = loaded(5).await;
        let handle = host.last_handle().unwrap();
        host.take_events();

        let page = session.on_intersections(
            handle,
            &[
                IntersectionEntry { page: 1, ratio: 0.2 },
                IntersectionEntry { page: 2, ratio: 0.8 },
            ],
        );

        assert_eq!(page, Some(2));
        assert_eq!(session.current_page(), 2);
        assert_eq!(session.indicator(), "2 / 5");
        assert!(host.scroll_commands().is_empty());
    }

    #[tokio::test]
    async fn render_restores_remembered_page_without_animation() {
        let (session, host) = loaded(6).await;
        session.jump_to(4, true);
        assert!(session.set_scale(1.0));
        host.take_events();

        session.render().await.unwrap();
        assert_eq!(
            host.scroll_commands(),
            vec![ScrollCommand {
                page: 4,
                behavior: ScrollBehavior::Instant
            }]
        );
    }

    #[tokio::test]
    async fn double_resize_within_window_refits_and_renders_once() {
        let (session, host) = loaded(3).await;
        let clears_before = host.clear_count();
        let start = Instant::now();

        host.set_container_width(560.0);
        session.notify_resize(start);
        session.notify_resize(start + Duration::from_millis(80));

        let mut refits = 0;
        for offset in [100, 200, 239, 241, 400, 800] {
            if session.resize_due(start + Duration::from_millis(offset)) {
                refits += 1;
                if session.refit().await {
                    session.render().await.unwrap();
                }
            }
        }

        assert_eq!(refits, 1);
        assert_eq!(host.clear_count(), clears_before + 1);
        assert!((session.scale() - 5.0_f32.min(2.2)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn wheel_zoom_requires_modifier() {
        let (session, _host) = loaded(2).await;
        let before = session.scale();
        assert!(!session.wheel(WheelEvent {
            delta_y: -100.0,
            zoom_modifier: false
        }));
        assert_eq!(session.scale(), before);
        assert!(session.wheel(WheelEvent {
            delta_y: 100.0,
            zoom_modifier: true
        }));
        assert!(session.scale() < before);
    }

    #[tokio::test]
    async fn pinch_is_flushed_once_per_frame() {
        let (session, _host) = session(FakeDocument::new(2), 160.0);
        session.load(source()).await.unwrap();
        assert!((session.scale() - 1.0).abs() < 1e-6);

        assert!(session.pinch_begin(&[TouchPoint::new(0.0, 0.0), TouchPoint::new(100.0, 0.0)]));
        session.pinch_update(&[TouchPoint::new(0.0, 0.0), TouchPoint::new(120.0, 0.0)]);
        session.pinch_update(&[TouchPoint::new(0.0, 0.0), TouchPoint::new(150.0, 0.0)]);
        let generation = session.generation();

        assert!(session.animation_frame());
        assert!((session.scale() - 1.5).abs() < 1e-5);
        assert_eq!(session.generation(), generation + 1);
        assert!(!session.animation_frame());
        session.pinch_end();
    }

    #[tokio::test]
    async fn second_load_replaces_document() {
        let (session, host) = loaded(5).await;
        session.jump_to(4, false);
        let first = session.document_info().unwrap().id;

        session
            .load(DocumentSource::new(
                Url::parse("file:///tmp/other.pdf").unwrap(),
                Some("other.pdf".into()),
            ))
            .await
            .unwrap();

        assert_ne!(session.document_info().unwrap().id, first);
        assert_eq!(session.current_page(), 1);
        assert_eq!(session.source().unwrap().display_name(), "other.pdf");
        assert_eq!(session.status(), ViewerStatus::Ready);
        assert!(session.render().await.is_ok());
        assert_eq!(host.clear_count(), 2);
    }
}
