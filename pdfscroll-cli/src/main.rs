use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal;
use directories::ProjectDirs;
use pdfscroll_core::{DocumentEngine, DocumentInfo, DocumentSource, ViewerConfig, ViewerSession};
use pdfscroll_render::PdfEngine;
use pdfscroll_tty::{
    write_status_line, CellSize, EventMapper, FrameSlice, KittyRenderer, StatusLine,
    TerminalHost, UiEvent, WHEEL_NOTCH,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

/// Rows scrolled per arrow key or wheel notch.
const ROWS_PER_STEP: f32 = 3.0;

#[derive(Debug, Parser)]
#[command(
    name = "pdfscroll",
    version,
    about = "Continuous-scroll PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// PDF file or URL. Defaults to the configured document url, then to
    /// `<location>/raw`.
    document: Option<String>,

    /// Display name shown in the status line
    #[arg(long)]
    filename: Option<String>,

    /// Config file to use instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base url relative document urls resolve against
    #[arg(long)]
    location: Option<Url>,
}

struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfscroll", "pdfscroll")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config = load_config(args.config.as_deref())?;
    let source = resolve_source(&args, &config)?;
    info!(url = %source.url, "opening document");

    let engine: Arc<dyn DocumentEngine> = Arc::new(PdfEngine::new()?);

    let _terminal = TerminalGuard::new()?;
    let (columns, rows) = terminal::size()?;
    let mut cell = CellSize::query();
    let (width, height) = canvas_size(columns, rows, cell);
    let host = Arc::new(TerminalHost::new(width, height));
    let session = Arc::new(ViewerSession::new(engine, host.clone(), &config));

    let mut renderer = KittyRenderer::new(io::stdout());
    renderer.clear_all()?;

    match session.load(source.clone()).await {
        Ok(()) => spawn_render(&session),
        Err(err) => warn!(error = ?err, "document failed to load"),
    }
    let title = status_title(&source, session.document_info().as_ref());

    let mut mapper = EventMapper::new();
    let mut status_row = rows.saturating_sub(1);
    let mut last_label = String::new();
    let mut notice: Option<String> = None;

    'main: loop {
        while event::poll(Duration::ZERO)? {
            let ui_event = mapper.map_event(event::read()?);
            match ui_event {
                UiEvent::Quit => break 'main,
                UiEvent::Resize { columns, rows } => {
                    cell = CellSize::query();
                    let (width, height) = canvas_size(columns, rows, cell);
                    host.set_viewport(width, height);
                    status_row = rows.saturating_sub(1);
                    session.notify_resize(Instant::now());
                    renderer.clear_all()?;
                }
                other => handle_event(other, &session, &host, cell),
            }
        }

        if session.animation_frame() {
            spawn_render(&session);
        }
        if session.resize_due(Instant::now()) {
            spawn_refit(&session);
        }
        host.tick();
        if let Some((handle, entries)) = host.intersections() {
            if let Some(page) = session.on_intersections(handle, &entries) {
                debug!(page, "current page changed by scrolling");
            }
        }
        for url in host.take_external() {
            notice = Some(open_external(&url, |url| open::that(url)));
        }

        let frame = host.take_frame();
        if let Some(slices) = &frame {
            draw_frame(&mut renderer, slices, cell)?;
        }

        let indicator = session.indicator();
        let page_input = session
            .is_page_input_focused()
            .then(|| session.page_input_text());
        let line = StatusLine {
            title: &title,
            status: session.status(),
            indicator: &indicator,
            page_input: page_input.as_deref(),
            scale: session.scale(),
            notice: notice.as_deref(),
        };
        let label = line.label();
        if frame.is_some() || label != last_label {
            write_status_line(renderer.writer(), status_row, &line)?;
            last_label = label;
        }

        let pause = frame_pause(
            config.timing.frame_interval,
            session.resize_deadline(),
            Instant::now(),
        );
        tokio::time::sleep(pause).await;
    }

    renderer.delete_all()?;
    renderer.clear_all()?;
    renderer.writer().flush()?;
    Ok(())
}

fn handle_event(
    ui_event: UiEvent,
    session: &Arc<ViewerSession>,
    host: &Arc<TerminalHost>,
    cell: CellSize,
) {
    match ui_event {
        UiEvent::ScrollRows(rows) => {
            host.scroll_by(rows as f32 * ROWS_PER_STEP * cell.height);
        }
        UiEvent::ScrollScreens(screens) => {
            host.scroll_by(screens as f32 * host.viewport_height() * 0.9);
        }
        UiEvent::Wheel(wheel) if wheel.zoom_modifier => {
            if session.wheel(wheel) {
                spawn_render(session);
            }
        }
        UiEvent::Wheel(wheel) => {
            host.scroll_by(wheel.delta_y / WHEEL_NOTCH * ROWS_PER_STEP * cell.height);
        }
        UiEvent::ZoomBy { factor } => {
            if session.set_scale(session.scale() * factor) {
                spawn_render(session);
            }
        }
        UiEvent::FitWidth => spawn_refit(session),
        UiEvent::FirstPage => session.jump_to(1, true),
        UiEvent::LastPage => session.jump_to(session.page_count(), true),
        UiEvent::Click { column, row } => {
            let (x, y) = cell.to_pixels(column, row);
            if let Some(hit) = host.link_at(x, y) {
                let session = Arc::clone(session);
                tokio::spawn(async move {
                    let activation = session.activate_link(hit.generation, &hit.target).await;
                    debug!(?activation, page = hit.page, "link activated");
                });
            }
        }
        UiEvent::PageInputFocus => session.focus_page_input(),
        UiEvent::PageInputChanged { text } => {
            if !session.is_page_input_focused() {
                session.focus_page_input();
            }
            session.edit_page_input(&text);
        }
        UiEvent::PageInputSubmit { text } => {
            session.edit_page_input(&text);
            if session.blur_page_input().is_none() {
                debug!(%text, "page input rejected");
            }
        }
        UiEvent::PageInputCancel => session.cancel_page_input(),
        UiEvent::Resize { .. } | UiEvent::Quit | UiEvent::None => {}
    }
}

fn spawn_render(session: &Arc<ViewerSession>) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        match session.render().await {
            Ok(outcome) => debug!(?outcome, "render pass finished"),
            Err(err) => warn!(error = ?err, "render pass failed"),
        }
    });
}

fn spawn_refit(session: &Arc<ViewerSession>) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        if session.refit().await {
            if let Err(err) = session.render().await {
                warn!(error = ?err, "render after refit failed");
            }
        }
    });
}

fn draw_frame(
    renderer: &mut KittyRenderer<io::Stdout>,
    slices: &[FrameSlice],
    cell: CellSize,
) -> Result<()> {
    renderer.begin_sync_update()?;
    renderer.delete_all()?;
    renderer.clear_all()?;
    for slice in slices {
        let (column, row) = cell.to_cell(slice.left, slice.screen_top);
        let params = cell.span(slice.image.width, slice.image.height);
        let image_id = u32::try_from(slice.number).unwrap_or(u32::MAX);
        renderer.draw_at(&slice.image, image_id, column, row, params)?;
    }
    renderer.end_sync_update()
}

/// Sleeps a frame, or less when a debounced resize falls due sooner.
fn frame_pause(
    frame_interval: Duration,
    resize_deadline: Option<Instant>,
    now: Instant,
) -> Duration {
    match resize_deadline {
        Some(deadline) => frame_interval.min(deadline.saturating_duration_since(now)),
        None => frame_interval,
    }
}

/// Configured filename first, then the document's own title.
fn status_title(source: &DocumentSource, info: Option<&DocumentInfo>) -> String {
    let named = source.display_name().trim();
    if !named.is_empty() {
        return named.to_string();
    }
    info.and_then(|info| info.metadata.title.as_deref())
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Hands `url` to the desktop opener and returns the status-line notice.
fn open_external<F>(url: &str, launch: F) -> String
where
    F: FnOnce(&str) -> io::Result<()>,
{
    match launch(url) {
        Ok(()) => {
            info!(%url, "external link opened");
            format!("Opened {url}")
        }
        Err(err) => {
            warn!(%url, error = %err, "failed to open external link");
            format!("Link: {url}")
        }
    }
}

/// Pixel size of the scroll canvas; the bottom row is kept for the status line.
fn canvas_size(columns: u16, rows: u16, cell: CellSize) -> (f32, f32) {
    (
        columns as f32 * cell.width,
        rows.saturating_sub(1) as f32 * cell.height,
    )
}

fn load_config(explicit: Option<&Path>) -> Result<ViewerConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match ViewerConfig::default_path() {
            Some(path) => path,
            None => return Ok(ViewerConfig::default()),
        },
    };
    ViewerConfig::load(&path)
}

fn resolve_source(args: &Args, config: &ViewerConfig) -> Result<DocumentSource> {
    let filename = args.filename.clone().or_else(|| config.filename.clone());
    if let Some(raw) = args.document.as_deref() {
        let path = Path::new(raw);
        if path.exists() {
            return DocumentSource::from_path(path, filename);
        }
    }
    let location = match &args.location {
        Some(location) => location.clone(),
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            Url::from_directory_path(&cwd)
                .map_err(|_| anyhow!("cannot express {:?} as a file url", cwd))?
        }
    };
    let configured = args.document.as_deref().or(config.document_url.as_deref());
    DocumentSource::resolve(configured, filename.as_deref(), &location)
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfscroll.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the viewer, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(document: Option<&str>, location: Option<&str>) -> Args {
        Args {
            document: document.map(str::to_owned),
            filename: None,
            config: None,
            location: location.map(|raw| Url::parse(raw).unwrap()),
        }
    }

    fn info_titled(title: Option<&str>) -> DocumentInfo {
        let url = Url::parse("file:///tmp/week-3.pdf").unwrap();
        DocumentInfo {
            id: pdfscroll_core::document_id_for_source(&url),
            source: url,
            page_count: 1,
            metadata: pdfscroll_core::DocumentMetadata {
                title: title.map(str::to_owned),
            },
        }
    }

    #[test]
    fn status_title_prefers_filename_then_pdf_title() {
        let url = Url::parse("file:///tmp/week-3.pdf").unwrap();
        let named = DocumentSource::new(url.clone(), Some("Week 3".into()));
        let unnamed = DocumentSource::new(url, None);

        assert_eq!(status_title(&named, Some(&info_titled(Some("Plan")))), "Week 3");
        assert_eq!(status_title(&unnamed, Some(&info_titled(Some(" Plan ")))), "Plan");
        assert_eq!(status_title(&unnamed, Some(&info_titled(None))), "");
        assert_eq!(status_title(&unnamed, None), "");
    }

    #[test]
    fn frame_pause_wakes_for_pending_resize() {
        let now = Instant::now();
        let frame = Duration::from_millis(16);
        assert_eq!(frame_pause(frame, None, now), frame);
        assert_eq!(
            frame_pause(frame, Some(now + Duration::from_millis(5)), now),
            Duration::from_millis(5)
        );
        assert_eq!(frame_pause(frame, Some(now + Duration::from_secs(1)), now), frame);
        assert_eq!(frame_pause(frame, Some(now), now + frame), Duration::ZERO);
    }

    #[test]
    fn external_link_notice_reflects_launch_result() {
        let mut launched = Vec::new();
        let notice = open_external("https://example.org", |url| {
            launched.push(url.to_string());
            Ok(())
        });
        assert_eq!(notice, "Opened https://example.org");
        assert_eq!(launched, vec!["https://example.org".to_string()]);

        let notice = open_external("https://example.org", |_| {
            Err(io::Error::new(io::ErrorKind::NotFound, "no opener"))
        });
        assert_eq!(notice, "Link: https://example.org");
    }

    #[test]
    fn canvas_reserves_status_row() {
        let cell = CellSize {
            width: 10.0,
            height: 20.0,
        };
        assert_eq!(canvas_size(80, 25, cell), (800.0, 480.0));
        assert_eq!(canvas_size(80, 0, cell), (800.0, 0.0));
    }

    #[test]
    fn existing_path_becomes_file_source_named_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("week-3.pdf");
        fs::write(&file, b"%PDF-1.7").unwrap();

        let source = resolve_source(
            &args(Some(file.to_str().unwrap()), None),
            &ViewerConfig::default(),
        )
        .unwrap();
        assert_eq!(source.url.scheme(), "file");
        assert_eq!(source.display_name(), "week-3.pdf");
    }

    #[test]
    fn missing_document_falls_back_to_raw_endpoint() {
        let source = resolve_source(
            &args(None, Some("https://example.org/viewer/42/")),
            &ViewerConfig::default(),
        )
        .unwrap();
        assert_eq!(source.url.as_str(), "https://example.org/viewer/42/raw");
    }

    #[test]
    fn configured_url_is_used_when_no_argument_given() {
        let config = ViewerConfig {
            document_url: Some("files/notes.pdf".into()),
            filename: Some("Notes".into()),
            ..ViewerConfig::default()
        };
        let source =
            resolve_source(&args(None, Some("https://example.org/viewer/")), &config).unwrap();
        assert_eq!(source.url.as_str(), "https://example.org/viewer/files/notes.pdf");
        assert_eq!(source.display_name(), "Notes");
    }

    #[test]
    fn args_parse_positional_document_and_flags() {
        let parsed = Args::try_parse_from([
            "pdfscroll",
            "notes.pdf",
            "--filename",
            "Notes",
            "--location",
            "https://example.org/viewer/",
        ])
        .unwrap();
        assert_eq!(parsed.document.as_deref(), Some("notes.pdf"));
        assert_eq!(parsed.filename.as_deref(), Some("Notes"));
        assert!(parsed.config.is_none());
    }
}
