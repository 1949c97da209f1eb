use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use pdfscroll_core::WheelEvent;

/// Wheel delta reported per mouse wheel notch, in the same units a browser
/// reports `deltaY` for one line-mode notch.
pub const WHEEL_NOTCH: f32 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Plain scroll of the page canvas, in cell rows.
    ScrollRows(i32),
    ScrollScreens(i32),
    Wheel(WheelEvent),
    ZoomBy { factor: f32 },
    FitWidth,
    FirstPage,
    LastPage,
    Click { column: u16, row: u16 },
    PageInputFocus,
    PageInputChanged { text: String },
    PageInputSubmit { text: String },
    PageInputCancel,
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    PageInput,
}

/// Turns terminal events into viewer inputs. While the page field has
/// focus, keys edit the field instead of scrolling.
#[derive(Debug, Default)]
pub struct EventMapper {
    mode: InputMode,
    buffer: String,
}

impl EventMapper {
    pub const ZOOM_STEP: f32 = 1.1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Text typed into the page field, when it has focus.
    pub fn pending_input(&self) -> Option<&str> {
        match self.mode {
            InputMode::PageInput => Some(&self.buffer),
            InputMode::Normal => None,
        }
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => match self.mode {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::PageInput => self.map_key_page_input(key),
            },
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, key: KeyEvent) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                self.mode = InputMode::PageInput;
                self.buffer = c.to_string();
                UiEvent::PageInputChanged {
                    text: self.buffer.clone(),
                }
            }
            (KeyCode::Char(':'), _) | (KeyCode::Char('p'), KeyModifiers::NONE) => {
                self.mode = InputMode::PageInput;
                self.buffer.clear();
                UiEvent::PageInputFocus
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => UiEvent::ScrollRows(1),
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => UiEvent::ScrollRows(-1),
            (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::ScrollScreens(1)
            }
            (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::ScrollScreens(-1)
            }
            (KeyCode::PageDown, _) | (KeyCode::Char(' '), KeyModifiers::NONE) => {
                UiEvent::ScrollScreens(1)
            }
            (KeyCode::PageUp, _) => UiEvent::ScrollScreens(-1),
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => UiEvent::FirstPage,
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => UiEvent::LastPage,
            (KeyCode::Char('+'), _) => UiEvent::ZoomBy {
                factor: Self::ZOOM_STEP,
            },
            (KeyCode::Char('-'), _) => UiEvent::ZoomBy {
                factor: 1.0 / Self::ZOOM_STEP,
            },
            (KeyCode::Char('='), _) => UiEvent::FitWidth,
            _ => UiEvent::None,
        }
    }

    fn map_key_page_input(&mut self, key: KeyEvent) -> UiEvent {
        match key.code {
            KeyCode::Esc => {
                self.leave_page_input();
                UiEvent::PageInputCancel
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.buffer);
                self.mode = InputMode::Normal;
                UiEvent::PageInputSubmit { text }
            }
            KeyCode::Backspace => {
                self.buffer.pop();
                UiEvent::PageInputChanged {
                    text: self.buffer.clone(),
                }
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.leave_page_input();
                UiEvent::PageInputCancel
            }
            KeyCode::Char(c) => {
                self.buffer.push(c);
                UiEvent::PageInputChanged {
                    text: self.buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let zoom_modifier = mouse.modifiers.contains(KeyModifiers::CONTROL);
        match mouse.kind {
            MouseEventKind::ScrollDown => UiEvent::Wheel(WheelEvent {
                delta_y: WHEEL_NOTCH,
                zoom_modifier,
            }),
            MouseEventKind::ScrollUp => UiEvent::Wheel(WheelEvent {
                delta_y: -WHEEL_NOTCH,
                zoom_modifier,
            }),
            MouseEventKind::Down(MouseButton::Left) if self.mode == InputMode::Normal => {
                UiEvent::Click {
                    column: mouse.column,
                    row: mouse.row,
                }
            }
            _ => UiEvent::None,
        }
    }

    fn leave_page_input(&mut self) {
        self.buffer.clear();
        self.mode = InputMode::Normal;
    }
}
