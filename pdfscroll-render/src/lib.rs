use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use url::Url;

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumEngine;

#[cfg(feature = "pdf")]
pub type PdfEngine = PdfiumEngine;

/// Environment variable naming an explicit pdfium shared library to bind.
pub const PDFIUM_LIBRARY_ENV: &str = "PDFSCROLL_PDFIUM_LIBRARY_PATH";

/// The engine reads local files only; fetching remote bytes is the host's job.
pub fn local_path(url: &Url) -> Result<PathBuf> {
    if url.scheme() != "file" {
        bail!(
            "unsupported document scheme {:?}; only file urls can be opened",
            url.scheme()
        );
    }
    url.to_file_path()
        .map_err(|_| anyhow!("{} does not name a local file", url))
}
