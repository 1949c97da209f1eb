use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use png::{BitDepth, ColorType, Encoder};
use pdfscroll_core::{RenderImage, ViewerStatus};

mod host;
mod input;
mod layout;

pub use host::{FrameSlice, LinkHit, TerminalHost};
pub use input::{EventMapper, InputMode, UiEvent, WHEEL_NOTCH};
pub use layout::{PageSlot, ScrollLayout, VisibleSlice};

/// Pixel size of one terminal cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f32,
    pub height: f32,
}

impl CellSize {
    /// Used when the terminal does not report its pixel size.
    pub const FALLBACK: CellSize = CellSize {
        width: 8.0,
        height: 16.0,
    };

    pub fn from_window(columns: u16, rows: u16, width_px: u16, height_px: u16) -> Self {
        if columns == 0 || rows == 0 || width_px == 0 || height_px == 0 {
            return Self::FALLBACK;
        }
        Self {
            width: width_px as f32 / columns as f32,
            height: height_px as f32 / rows as f32,
        }
    }

    pub fn query() -> Self {
        match crossterm::terminal::window_size() {
            Ok(size) => Self::from_window(size.columns, size.rows, size.width, size.height),
            Err(_) => Self::FALLBACK,
        }
    }

    pub fn to_cell(&self, x: f32, y: f32) -> (u16, u16) {
        (
            (x / self.width).floor().clamp(0.0, u16::MAX as f32) as u16,
            (y / self.height).floor().clamp(0.0, u16::MAX as f32) as u16,
        )
    }

    pub fn to_pixels(&self, column: u16, row: u16) -> (f32, f32) {
        (
            (column as f32 + 0.5) * self.width,
            (row as f32 + 0.5) * self.height,
        )
    }

    pub fn span(&self, width_px: u32, height_px: u32) -> DrawParams {
        DrawParams::clamped(
            (width_px as f32 / self.width).ceil() as u32,
            (height_px as f32 / self.height).ceil() as u32,
        )
    }
}

pub struct KittyRenderer<W: Write> {
    writer: W,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and places it at the given cell. Each page keeps its
    /// own image id so slices of different pages can share the screen.
    pub fn draw_at(
        &mut self,
        image: &RenderImage,
        image_id: u32,
        column: u16,
        row: u16,
        params: DrawParams,
    ) -> Result<()> {
        if image.width == 0 || image.height == 0 {
            return Ok(());
        }
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        crossterm::queue!(&mut self.writer, cursor::MoveTo(column, row))?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p=1,c={},r={},s={},v={},z=-1,m={}",
                    image_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    u8::from(more)
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", u8::from(more))?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }
        Ok(())
    }

    /// Removes every image placement and frees the image data.
    pub fn delete_all(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update so the terminal paints everything at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::queue!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// What the bottom row shows.
pub struct StatusLine<'a> {
    pub title: &'a str,
    pub status: ViewerStatus,
    pub indicator: &'a str,
    pub page_input: Option<&'a str>,
    pub scale: f32,
    pub notice: Option<&'a str>,
}

impl StatusLine<'_> {
    pub fn label(&self) -> String {
        let position = match self.page_input {
            Some(text) => format!("[{}_] / {}", text, total_of(self.indicator)),
            None => self.indicator.to_string(),
        };
        let state = match self.status {
            ViewerStatus::Loading => "Loading PDF...",
            ViewerStatus::Ready => "",
            ViewerStatus::Error => "Unable to load PDF",
        };
        let mut label = format!("{}  {}  {:.0}%", self.title, position, self.scale * 100.0);
        if !state.is_empty() {
            label.push_str("  ");
            label.push_str(state);
        }
        if let Some(notice) = self.notice {
            label.push_str("  ");
            label.push_str(notice);
        }
        label
    }
}

fn total_of(indicator: &str) -> &str {
    indicator
        .rsplit_once(" / ")
        .map(|(_, total)| total)
        .unwrap_or(indicator)
}

pub fn write_status_line<W: Write>(writer: &mut W, row: u16, line: &StatusLine<'_>) -> io::Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, row),
        Clear(ClearType::CurrentLine),
        SetAttribute(Attribute::Reverse),
        Print(line.label()),
        SetAttribute(Attribute::Reset)
    )?;
    writer.flush()
}
