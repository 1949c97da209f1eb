use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaleLimits {
    pub min: f32,
    pub max: f32,
    pub fit_min: f32,
    pub fit_max: f32,
    /// Horizontal space kept free around a page when fitting to width.
    pub padding: f32,
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self {
            min: 0.6,
            max: 2.8,
            fit_min: 0.6,
            fit_max: 2.2,
            padding: 60.0,
        }
    }
}

impl ScaleLimits {
    /// Orders each pair of bounds and keeps the fit range inside the zoom range.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let finite_or = |value: f32, fallback: f32| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };

        let mut min = finite_or(self.min, defaults.min);
        let mut max = finite_or(self.max, defaults.max);
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }

        let mut fit_min = finite_or(self.fit_min, defaults.fit_min).clamp(min, max);
        let mut fit_max = finite_or(self.fit_max, defaults.fit_max).clamp(min, max);
        if fit_min > fit_max {
            std::mem::swap(&mut fit_min, &mut fit_max);
        }

        let padding = if self.padding.is_finite() {
            self.padding.max(0.0)
        } else {
            defaults.padding
        };

        Self {
            min,
            max,
            fit_min,
            fit_max,
            padding,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub delta_y: f32,
    /// Ctrl (or the platform's zoom-intent key) held during the wheel event.
    pub zoom_modifier: bool,
}

#[derive(Debug, Clone)]
pub struct ViewportScaler {
    limits: ScaleLimits,
    wheel_divisor: f32,
}

impl Default for ViewportScaler {
    fn default() -> Self {
        Self::new(ScaleLimits::default(), 300.0)
    }
}

impl ViewportScaler {
    pub fn new(limits: ScaleLimits, wheel_divisor: f32) -> Self {
        Self {
            limits: limits.normalized(),
            wheel_divisor,
        }
    }

    pub fn limits(&self) -> &ScaleLimits {
        &self.limits
    }

    pub fn compute_fit_scale(&self, container_width: f32, native_page_width: f32) -> f32 {
        let available = container_width - self.limits.padding;
        if !(available > 0.0) || !(native_page_width > 0.0) {
            return 1.0;
        }
        (available / native_page_width).clamp(self.limits.fit_min, self.limits.fit_max)
    }

    pub fn clamp_scale(&self, raw: f32) -> f32 {
        if raw.is_nan() {
            return self.limits.min;
        }
        raw.clamp(self.limits.min, self.limits.max)
    }

    pub fn apply_gesture_delta(&self, start_scale: f32, ratio: f32) -> f32 {
        self.clamp_scale(start_scale * ratio)
    }

    pub fn apply_wheel_delta(&self, current_scale: f32, delta_y: f32) -> f32 {
        let factor = (-delta_y / self.wheel_divisor).exp();
        self.clamp_scale(current_scale * factor)
    }

    /// `None` when the wheel should scroll instead of zoom.
    pub fn wheel(&self, current_scale: f32, event: WheelEvent) -> Option<f32> {
        if !event.zoom_modifier {
            return None;
        }
        Some(self.apply_wheel_delta(current_scale, event.delta_y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub x: f32,
    pub y: f32,
}

impl TouchPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

fn touch_distance(touches: &[TouchPoint]) -> Option<f32> {
    match touches {
        [first, second] => Some((first.x - second.x).hypot(first.y - second.y)),
        _ => None,
    }
}

/// Two-finger pinch state. Scale updates are held until the next animation
/// frame so a burst of move events produces a single emitted scale.
#[derive(Debug, Default)]
pub struct PinchTracker {
    active: bool,
    start_distance: f32,
    start_scale: f32,
    pending: Option<f32>,
}

impl PinchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn begin(&mut self, touches: &[TouchPoint], current_scale: f32) -> bool {
        let Some(distance) = touch_distance(touches) else {
            return false;
        };
        if !(distance > 0.0) {
            return false;
        }
        self.active = true;
        self.start_distance = distance;
        self.start_scale = current_scale;
        true
    }

    pub fn update(&mut self, scaler: &ViewportScaler, touches: &[TouchPoint]) -> bool {
        if !self.active {
            return false;
        }
        let Some(distance) = touch_distance(touches) else {
            return false;
        };
        let ratio = distance / self.start_distance;
        self.pending = Some(scaler.apply_gesture_delta(self.start_scale, ratio));
        true
    }

    /// Called once per animation frame.
    pub fn take_frame(&mut self) -> Option<f32> {
        self.pending.take()
    }

    pub fn end(&mut self) {
        self.active = false;
    }
}

/// Trailing-edge debounce for resize notifications.
#[derive(Debug)]
pub struct ResizeDebouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl ResizeDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn notify(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
