use std::path::Path;

use anyhow::{anyhow, Context, Result};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub url: Url,
    pub filename: Option<String>,
}

impl DocumentSource {
    pub fn new(url: Url, filename: Option<String>) -> Self {
        Self { url, filename }
    }

    /// `<origin><path without one trailing slash>/raw`; query and fragment are dropped.
    pub fn fallback_url(location: &Url) -> Url {
        let path = location.path();
        let base = path.strip_suffix('/').unwrap_or(path);
        let mut url = location.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.set_path(&format!("{base}/raw"));
        url
    }

    /// Picks the configured URL (absolute, or relative to `location`) and
    /// falls back to [`DocumentSource::fallback_url`] when none is configured.
    pub fn resolve(
        configured_url: Option<&str>,
        filename: Option<&str>,
        location: &Url,
    ) -> Result<Self> {
        let url = match configured_url.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => match Url::parse(raw) {
                Ok(url) => url,
                Err(url::ParseError::RelativeUrlWithoutBase) => location
                    .join(raw)
                    .with_context(|| format!("invalid document url {raw:?}"))?,
                Err(err) => return Err(anyhow!("invalid document url {raw:?}: {err}")),
            },
            None => Self::fallback_url(location),
        };
        Ok(Self {
            url,
            filename: filename.map(str::to_owned),
        })
    }

    pub fn from_path(path: &Path, filename: Option<String>) -> Result<Self> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| anyhow!("cannot express {:?} as a file url", absolute))?;
        let filename = filename.or_else(|| {
            absolute
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
        });
        Ok(Self { url, filename })
    }

    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("")
    }
}
