use tracing::debug;

use crate::error::NavigationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    /// Animated scroll, used for user-driven navigation.
    Smooth,
    /// Immediate positioning, used after structural rebuilds.
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollCommand {
    pub page: usize,
    pub behavior: ScrollBehavior,
}

/// Owns the current page and the page-number input field text.
#[derive(Debug)]
pub struct NavigationController {
    current_page: usize,
    page_count: usize,
    input_text: String,
    input_focused: bool,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationController {
    pub fn new() -> Self {
        Self {
            current_page: 1,
            page_count: 0,
            input_text: "1".to_string(),
            input_focused: false,
        }
    }

    pub fn reset(&mut self, page_count: usize) {
        self.page_count = page_count;
        self.current_page = 1;
        self.input_text = "1".to_string();
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    pub fn is_input_focused(&self) -> bool {
        self.input_focused
    }

    pub fn indicator(&self) -> String {
        format!("{} / {}", self.current_page, self.page_count)
    }

    pub fn focus_input(&mut self) {
        self.input_focused = true;
    }

    pub fn edit_input(&mut self, text: &str) {
        self.input_text.clear();
        self.input_text.push_str(text);
    }

    /// Leaving the field commits whatever was typed.
    pub fn blur_input(&mut self) -> Result<ScrollCommand, NavigationError> {
        self.input_focused = false;
        let typed = self.input_text.clone();
        self.commit_page_input(&typed)
    }

    pub fn cancel_input(&mut self) {
        self.input_focused = false;
        self.sync_input();
    }

    pub fn commit_page_input(&mut self, text: &str) -> Result<ScrollCommand, NavigationError> {
        let Some(value) = parse_page_number(text) else {
            self.sync_input();
            return Err(NavigationError::InvalidInput {
                input: text.to_string(),
            });
        };
        if self.page_count == 0 {
            self.sync_input();
            return Err(NavigationError::PageOutOfRange {
                page: value.max(0) as usize,
                page_count: 0,
            });
        }

        let page = value.clamp(1, self.page_count as i64) as usize;
        debug!(input = text, page, "committing page input");
        self.current_page = page;
        self.input_text = page.to_string();
        Ok(ScrollCommand {
            page,
            behavior: ScrollBehavior::Smooth,
        })
    }

    /// Scroll observation is an effect of scrolling, so it never scrolls.
    pub fn on_scroll_observed_page(&mut self, page: usize) {
        if page == 0 || page > self.page_count {
            return;
        }
        self.current_page = page;
        if !self.input_focused {
            self.sync_input();
        }
    }

    pub fn jump_to(&mut self, page: usize, animated: bool) -> ScrollCommand {
        let page = page.clamp(1, self.page_count.max(1));
        self.current_page = page;
        if !self.input_focused {
            self.sync_input();
        }
        ScrollCommand {
            page,
            behavior: if animated {
                ScrollBehavior::Smooth
            } else {
                ScrollBehavior::Instant
            },
        }
    }

    fn sync_input(&mut self) {
        self.input_text = self.current_page.to_string();
    }
}

/// Integer-prefix parse: optional sign followed by at least one digit;
/// anything after the digits is ignored. Overflow saturates.
fn parse_page_number(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: &str = {
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        &rest[..end]
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}
