//! Fake engine and recording host shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::engine::{
    Annotation, AnnotationKind, Destination, DestinationEntry, DestinationRef, DocRect, Document,
    DocumentEngine, Page, PageRef, TextContent, TextItem, Viewport,
};
use crate::navigation::ScrollCommand;
use crate::render::PageSurface;
use crate::source::DocumentSource;
use crate::viewer::{ViewerHost, ViewerStatus};
use crate::visibility::ObserverHandle;
use crate::{document_id_for_source, DocumentInfo, DocumentMetadata, RenderImage};

pub(crate) const PAGE_WIDTH: f32 = 100.0;
pub(crate) const PAGE_HEIGHT: f32 = 150.0;

#[derive(Clone)]
pub(crate) struct FakeDocument {
    info: DocumentInfo,
    yields: usize,
    fail_on: Option<(usize, Arc<AtomicUsize>)>,
    links: bool,
}

impl FakeDocument {
    pub(crate) fn new(page_count: usize) -> Self {
        let source = Url::parse("file:///tmp/fake.pdf").unwrap();
        Self {
            info: DocumentInfo {
                id: document_id_for_source(&source),
                source,
                page_count,
                metadata: DocumentMetadata::default(),
            },
            yields: 0,
            fail_on: None,
            links: false,
        }
    }

    pub(crate) fn with_yielding_renders(mut self, yields: usize) -> Self {
        self.yields = yields;
        self
    }

    pub(crate) fn failing_on(mut self, page: usize) -> Self {
        self.fail_on = Some((page, Arc::new(AtomicUsize::new(usize::MAX))));
        self
    }

    /// Fails only the first fetch of `page`.
    pub(crate) fn failing_once_on(mut self, page: usize) -> Self {
        self.fail_on = Some((page, Arc::new(AtomicUsize::new(1))));
        self
    }

    fn take_failure(&self, number: usize) -> bool {
        match &self.fail_on {
            Some((page, remaining)) if *page == number => remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok(),
            _ => false,
        }
    }

    /// Every page links to the next one, the last page back to the first.
    pub(crate) fn with_link_on_every_page(mut self) -> Self {
        self.links = true;
        self
    }

    fn for_source(&self, url: &Url) -> Self {
        let mut doc = self.clone();
        doc.info.id = document_id_for_source(url);
        doc.info.source = url.clone();
        doc
    }
}

#[async_trait]
impl Document for FakeDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    async fn page(&self, number: usize) -> Result<Arc<dyn Page>> {
        if number == 0 || number > self.info.page_count {
            return Err(anyhow!("page {number} out of range"));
        }
        Ok(Arc::new(FakePage {
            number,
            page_count: self.info.page_count,
            yields: self.yields,
            fail: self.take_failure(number),
            link: self.links,
        }))
    }

    async fn resolve_destination(&self, _name: &str) -> Result<Option<Destination>> {
        Ok(None)
    }

    async fn page_index_of(&self, _page_ref: &PageRef) -> Result<usize> {
        Err(anyhow!("fake document has no object references"))
    }
}

struct FakePage {
    number: usize,
    page_count: usize,
    yields: usize,
    fail: bool,
    link: bool,
}

#[async_trait]
impl Page for FakePage {
    fn size(&self) -> (f32, f32) {
        (PAGE_WIDTH, PAGE_HEIGHT)
    }

    async fn render(&self, viewport: &Viewport) -> Result<RenderImage> {
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
        if self.fail {
            return Err(anyhow!("raster failed"));
        }
        let (width, height) = viewport.pixel_size();
        Ok(RenderImage::blank(width, height))
    }

    async fn text_content(&self) -> Result<TextContent> {
        Ok(TextContent {
            items: vec![
                TextItem {
                    text: format!("Page {}", self.number),
                    rect: DocRect::new(10.0, 130.0, 60.0, 140.0),
                },
                TextItem {
                    text: "  ".into(),
                    rect: DocRect::new(0.0, 0.0, 1.0, 1.0),
                },
            ],
        })
    }

    async fn annotations(&self) -> Result<Vec<Annotation>> {
        if !self.link {
            return Ok(Vec::new());
        }
        Ok(vec![Annotation {
            rect: DocRect::new(10.0, 10.0, 60.0, 20.0),
            kind: AnnotationKind::InternalLink {
                dest: DestinationRef::Explicit(vec![
                    DestinationEntry::Page(PageRef::Index(self.number % self.page_count)),
                    DestinationEntry::Name("Fit".into()),
                ]),
            },
        }])
    }
}

pub(crate) struct FakeEngine {
    template: Option<FakeDocument>,
}

impl FakeEngine {
    pub(crate) fn serving(template: FakeDocument) -> Self {
        Self {
            template: Some(template),
        }
    }

    pub(crate) fn failing() -> Self {
        Self { template: None }
    }
}

#[async_trait]
impl DocumentEngine for FakeEngine {
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn Document>> {
        match &self.template {
            Some(template) => Ok(Arc::new(template.for_source(&source.url))),
            None => Err(anyhow!("cannot open {}", source.url)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HostEvent {
    Cleared,
    Attached { page: usize, generation: u64 },
    Observed { handle: ObserverHandle, pages: Vec<usize> },
    Scrolled(ScrollCommand),
    OpenedExternal(String),
    Status(ViewerStatus),
}

pub(crate) struct RecordingHost {
    width: Mutex<f32>,
    events: Mutex<Vec<HostEvent>>,
    surfaces: Mutex<Vec<PageSurface>>,
}

impl RecordingHost {
    pub(crate) fn new(width: f32) -> Self {
        Self {
            width: Mutex::new(width),
            events: Mutex::new(Vec::new()),
            surfaces: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_container_width(&self, width: f32) {
        *self.width.lock() = width;
    }

    pub(crate) fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn take_events(&self) -> Vec<HostEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub(crate) fn surfaces(&self) -> Vec<PageSurface> {
        self.surfaces.lock().clone()
    }

    pub(crate) fn attached_pages(&self) -> Vec<usize> {
        self.surfaces.lock().iter().map(|s| s.number).collect()
    }

    pub(crate) fn clear_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| **event == HostEvent::Cleared)
            .count()
    }

    pub(crate) fn scroll_commands(&self) -> Vec<ScrollCommand> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                HostEvent::Scrolled(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn statuses(&self) -> Vec<ViewerStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                HostEvent::Status(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn last_handle(&self) -> Option<ObserverHandle> {
        self.events.lock().iter().rev().find_map(|event| match event {
            HostEvent::Observed { handle, .. } => Some(*handle),
            _ => None,
        })
    }
}

impl ViewerHost for RecordingHost {
    fn container_width(&self) -> f32 {
        *self.width.lock()
    }

    fn clear_pages(&self) {
        self.surfaces.lock().clear();
        self.events.lock().push(HostEvent::Cleared);
    }

    fn attach_page(&self, surface: PageSurface) {
        self.events.lock().push(HostEvent::Attached {
            page: surface.number,
            generation: surface.generation,
        });
        self.surfaces.lock().push(surface);
    }

    fn observe_pages(&self, handle: ObserverHandle, pages: &[usize]) {
        self.events.lock().push(HostEvent::Observed {
            handle,
            pages: pages.to_vec(),
        });
    }

    fn scroll_to_page(&self, command: ScrollCommand) {
        self.events.lock().push(HostEvent::Scrolled(command));
    }

    fn open_external(&self, url: &str) {
        self.events.lock().push(HostEvent::OpenedExternal(url.to_string()));
    }

    fn status_changed(&self, status: ViewerStatus) {
        self.events.lock().push(HostEvent::Status(status));
    }
}
