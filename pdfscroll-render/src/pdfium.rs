use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfscroll_core::{
    document_id_for_source, Annotation, AnnotationKind, Destination, DestinationEntry,
    DestinationRef, DocRect, Document, DocumentEngine, DocumentInfo, DocumentMetadata,
    DocumentSource, Page, PageRef, RenderImage, TextContent, TextItem, Viewport,
};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{local_path, PDFIUM_LIBRARY_ENV};

pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentEngine for PdfiumEngine {
    #[instrument(skip(self), fields(url = %source.url))]
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn Document>> {
        let path = local_path(&source.url)?;
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let shared = Arc::new(SharedDocument::open(Arc::clone(&self.pdfium), absolute)?);
        let (info, page_sizes) = shared.describe(&source.url)?;
        debug!(pages = info.page_count, "document opened");
        Ok(Arc::new(PdfiumDocument {
            shared,
            info,
            page_sizes,
        }))
    }
}

/// Owns the pdfium document for every page handle cut from it.
struct SharedDocument {
    document: Mutex<PdfDocument<'static>>,
    path: PathBuf,
    _pdfium: Arc<Pdfium>,
}

impl SharedDocument {
    fn open(pdfium: Arc<Pdfium>, path: PathBuf) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. `document` is declared
        // before `_pdfium`, so it drops first and the borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(Self {
            document: Mutex::new(document),
            path,
            _pdfium: pdfium,
        })
    }

    fn describe(&self, source: &Url) -> Result<(DocumentInfo, Vec<(f32, f32)>)> {
        let document = self.document.lock();
        let page_sizes: Vec<(f32, f32)> = document
            .pages()
            .iter()
            .map(|page| (page.width().value, page.height().value))
            .collect();
        let title = document
            .metadata()
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().to_owned());

        let info = DocumentInfo {
            id: document_id_for_source(source),
            source: source.clone(),
            page_count: page_sizes.len(),
            metadata: DocumentMetadata { title },
        };
        Ok((info, page_sizes))
    }

    fn with_page<R, F>(&self, number: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index: PdfPageIndex = number
            .checked_sub(1)
            .and_then(|index| index.try_into().ok())
            .ok_or_else(|| anyhow!("page {} is out of supported range", number))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range in {:?}", number, self.path))?;
        f(&page)
    }
}

struct PdfiumDocument {
    shared: Arc<SharedDocument>,
    info: DocumentInfo,
    page_sizes: Vec<(f32, f32)>,
}

#[async_trait]
impl Document for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    async fn page(&self, number: usize) -> Result<Arc<dyn Page>> {
        let size = number
            .checked_sub(1)
            .and_then(|index| self.page_sizes.get(index))
            .copied()
            .ok_or_else(|| anyhow!("page {} out of range 1..={}", number, self.info.page_count))?;
        Ok(Arc::new(PdfiumPage {
            shared: Arc::clone(&self.shared),
            number,
            size,
        }))
    }

    async fn resolve_destination(&self, name: &str) -> Result<Option<Destination>> {
        // pdfium resolves named destinations while reading link actions, so a name that
        // survives to this point has no target.
        debug!(name, "named destination not present");
        Ok(None)
    }

    async fn page_index_of(&self, page_ref: &PageRef) -> Result<usize> {
        match page_ref {
            PageRef::Index(index) if *index < self.info.page_count => Ok(*index),
            PageRef::Index(index) => Err(anyhow!("page index {} out of range", index)),
            PageRef::Object { num, gen } => Err(anyhow!(
                "object reference {} {} R cannot be resolved by pdfium",
                num,
                gen
            )),
        }
    }
}

struct PdfiumPage {
    shared: Arc<SharedDocument>,
    number: usize,
    size: (f32, f32),
}

#[async_trait]
impl Page for PdfiumPage {
    fn size(&self) -> (f32, f32) {
        self.size
    }

    /// Rasterizes on the blocking pool so the event loop keeps running
    /// while pdfium works.
    #[instrument(skip(self, viewport), fields(page = self.number, scale = viewport.scale))]
    async fn render(&self, viewport: &Viewport) -> Result<RenderImage> {
        let shared = Arc::clone(&self.shared);
        let number = self.number;
        let scale = viewport.scale.max(0.1);
        tokio::task::spawn_blocking(move || {
            shared.with_page(number, |page| {
                let config = PdfRenderConfig::new().scale_page_by_factor(scale);
                let bitmap = page
                    .render_with_config(&config)
                    .with_context(|| format!("failed to render page {}", number))?;
                let image = bitmap.as_image().to_rgba8();
                Ok(RenderImage {
                    width: u32::try_from(bitmap.width()).unwrap_or_default(),
                    height: u32::try_from(bitmap.height()).unwrap_or_default(),
                    pixels: image.into_raw(),
                })
            })
        })
        .await
        .with_context(|| format!("render task for page {} did not complete", number))?
    }

    async fn text_content(&self) -> Result<TextContent> {
        self.shared.with_page(self.number, |page| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", self.number))?;
            let items = text
                .segments()
                .iter()
                .map(|segment| TextItem {
                    text: segment.text(),
                    rect: doc_rect(&segment.bounds()),
                })
                .collect();
            Ok(TextContent { items })
        })
    }

    async fn annotations(&self) -> Result<Vec<Annotation>> {
        self.shared.with_page(self.number, |page| {
            let mut annotations = Vec::new();
            for link in page.links().iter() {
                let rect = match link.rect() {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(?err, page = self.number, "failed to resolve link rectangle");
                        continue;
                    }
                };
                annotations.push(Annotation {
                    rect: doc_rect(&rect),
                    kind: link_kind(&link),
                });
            }
            Ok(annotations)
        })
    }
}

fn doc_rect(rect: &PdfRect) -> DocRect {
    DocRect::new(
        rect.left().value,
        rect.bottom().value,
        rect.right().value,
        rect.top().value,
    )
}

fn link_kind(link: &PdfLink<'_>) -> AnnotationKind {
    if let Some(action) = link.action() {
        match action.action_type() {
            PdfActionType::GoToDestinationInSameDocument => {
                if let Some(local) = action.as_local_destination_action() {
                    if let Ok(destination) = local.destination() {
                        if let Ok(page_index) = destination.page_index() {
                            return page_link(page_index as usize);
                        }
                    }
                }
            }
            PdfActionType::Uri => {
                if let Some(uri_action) = action.as_uri_action() {
                    if let Ok(url) = uri_action.uri() {
                        if !url.is_empty() {
                            return AnnotationKind::ExternalLink { url };
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(destination) = link.destination() {
        if let Ok(page_index) = destination.page_index() {
            return page_link(page_index as usize);
        }
    }

    AnnotationKind::Other {
        subtype: "Link".into(),
    }
}

fn page_link(index: usize) -> AnnotationKind {
    AnnotationKind::InternalLink {
        dest: DestinationRef::Explicit(vec![DestinationEntry::Page(PageRef::Index(index))]),
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match std::env::var(PDFIUM_LIBRARY_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(Path::new(&path)) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load Pdfium from {}={}: {}", PDFIUM_LIBRARY_ENV, path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {} ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
