//! Turns element queries into device actions.
//!
//! [`resolve_tap_target`] maps a text or resource-id selector to a tap point, and
//! [`ScrollSearch`] drives the bounded dump → search → scroll loop one [`ScrollSearch::step`]
//! at a time so callers and tests control pacing through a [`Sleeper`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::adb::transport::{DeviceTransport, SwipeGesture};
use crate::app::cancel::{CancelToken, OpContext};
use crate::app::config::InteractionSettings;
use crate::app::error::{AppError, ErrorCode};
use crate::app::ui::geometry::Point;
use crate::app::ui::hierarchy::{parse_hierarchy, ElementRecord};
use crate::app::ui::metrics::ScreenMetrics;
use crate::app::ui::query::{find_by_id, find_by_text, ElementSummary};

const SLEEP_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TapTarget {
    pub point: Point,
    pub element: ElementSummary,
    pub description: String,
}

fn selector(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolves a selector to the center of the matched element.
///
/// `by_text` wins over `by_resource_id` and uses the first partial match. A match without
/// bounds is `ERR_ELEMENT_NOT_FOUND`; inverted bounds still produce a center.
pub fn resolve_tap_target(
    elements: &[ElementRecord],
    by_text: Option<&str>,
    by_resource_id: Option<&str>,
    trace_id: &str,
) -> Result<TapTarget, AppError> {
    let by_text = selector(by_text);
    let by_resource_id = selector(by_resource_id);

    let (candidate, criteria) = match (by_text, by_resource_id) {
        (Some(text), _) => (
            find_by_text(elements, text, true).first().copied(),
            format!("text '{text}'"),
        ),
        (None, Some(resource_id)) => (
            find_by_id(elements, resource_id),
            format!("resource id '{resource_id}'"),
        ),
        (None, None) => {
            return Err(AppError::invalid_argument(
                "Either text or resource_id is required",
                trace_id,
            ))
        }
    };

    let element = candidate.ok_or_else(|| {
        AppError::element_not_found(format!("No element matched {criteria}"), trace_id)
    })?;
    let point = element.center().ok_or_else(|| {
        AppError::element_not_found(
            format!(
                "Element matched {criteria} but has no bounds: {}",
                element.describe()
            ),
            trace_id,
        )
    })?;

    Ok(TapTarget {
        point,
        element: ElementSummary::from(element),
        description: element.describe(),
    })
}

/// Waits between scroll attempts. Returns `false` when cancelled before the full duration.
pub trait Sleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Real-time sleeper that wakes periodically to observe cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if cancel.is_cancelled() {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        !cancel.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Down,
    Up,
}

/// Vertical swipe through the horizontal center of the screen.
///
/// Scrolling down drags from `scroll_start_ratio` to `scroll_end_ratio` of the height;
/// scrolling up drags the other way.
pub fn scroll_gesture(
    metrics: &ScreenMetrics,
    direction: ScrollDirection,
    settings: &InteractionSettings,
) -> SwipeGesture {
    let height = f64::from(metrics.height_px);
    let x = (metrics.width_px / 2) as i32;
    let low = (height * settings.scroll_start_ratio) as i32;
    let high = (height * settings.scroll_end_ratio) as i32;
    let (start_y, end_y) = match direction {
        ScrollDirection::Down => (low, high),
        ScrollDirection::Up => (high, low),
    };
    SwipeGesture {
        start: Point::new(x, start_y),
        end: Point::new(x, end_y),
        duration_ms: settings.swipe_duration_ms,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScrollState {
    Searching {
        attempts: u32,
    },
    Found {
        attempts: u32,
        element: ElementSummary,
        /// `None` when the matching element carries no bounds.
        point: Option<Point>,
    },
    Exhausted {
        attempts: u32,
    },
    TransportError {
        attempts: u32,
        error: AppError,
    },
    Cancelled {
        attempts: u32,
    },
}

impl ScrollState {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Searching { attempts }
            | Self::Found { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::TransportError { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Searching { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Searching { .. } => "searching",
            Self::Found { .. } => "found",
            Self::Exhausted { .. } => "exhausted",
            Self::TransportError { .. } => "transport_error",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Bounded scroll-until-found search.
///
/// Performs at most `max_iterations` dump-and-search attempts and scrolls only between
/// attempts, never after the last one. Transport failures end the search immediately.
#[derive(Debug, Clone)]
pub struct ScrollSearch {
    query: String,
    max_iterations: u32,
    gesture: SwipeGesture,
    settle: Duration,
    scrolls: u32,
    state: ScrollState,
}

impl ScrollSearch {
    pub fn new(
        query: &str,
        max_iterations: u32,
        gesture: SwipeGesture,
        settle: Duration,
        trace_id: &str,
    ) -> Result<Self, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::invalid_argument("text is required", trace_id));
        }
        if max_iterations == 0 {
            return Err(AppError::invalid_argument(
                "max_iterations must be at least 1",
                trace_id,
            ));
        }
        Ok(Self {
            query: query.to_string(),
            max_iterations,
            gesture,
            settle,
            scrolls: 0,
            state: ScrollState::Searching { attempts: 0 },
        })
    }

    pub fn state(&self) -> &ScrollState {
        &self.state
    }

    pub fn scrolls(&self) -> u32 {
        self.scrolls
    }

    fn failure(attempts: u32, error: AppError) -> ScrollState {
        if error.code == ErrorCode::Cancelled {
            ScrollState::Cancelled { attempts }
        } else {
            ScrollState::TransportError { attempts, error }
        }
    }

    /// Advances one attempt. Terminal states are returned unchanged.
    pub fn step<T, S>(
        &mut self,
        transport: &T,
        serial: &str,
        sleeper: &S,
        ctx: &OpContext,
    ) -> &ScrollState
    where
        T: DeviceTransport + ?Sized,
        S: Sleeper + ?Sized,
    {
        let attempts = match self.state {
            ScrollState::Searching { attempts } => attempts,
            _ => return &self.state,
        };
        if ctx.cancel.is_cancelled() {
            self.state = ScrollState::Cancelled { attempts };
            return &self.state;
        }

        let dump = match transport.capture_hierarchy_dump(serial, ctx) {
            Ok(dump) => dump,
            Err(err) => {
                self.state = Self::failure(attempts, err);
                return &self.state;
            }
        };
        let attempts = attempts + 1;
        let elements = parse_hierarchy(&dump);
        let matches = find_by_text(&elements, &self.query, true);
        debug!(
            trace_id = %ctx.trace_id,
            serial = %serial,
            attempt = attempts,
            nodes = elements.len(),
            matches = matches.len(),
            "scroll search attempt"
        );

        self.state = if let Some(first) = matches.first() {
            ScrollState::Found {
                attempts,
                element: ElementSummary::from(*first),
                point: first.center(),
            }
        } else if attempts >= self.max_iterations {
            ScrollState::Exhausted { attempts }
        } else if let Err(err) = transport.send_swipe(serial, &self.gesture, ctx) {
            Self::failure(attempts, err)
        } else {
            self.scrolls += 1;
            if sleeper.sleep(self.settle, &ctx.cancel) {
                ScrollState::Searching { attempts }
            } else {
                ScrollState::Cancelled { attempts }
            }
        };
        &self.state
    }

    /// Steps until a terminal state is reached.
    pub fn run<T, S>(
        &mut self,
        transport: &T,
        serial: &str,
        sleeper: &S,
        ctx: &OpContext,
    ) -> &ScrollState
    where
        T: DeviceTransport + ?Sized,
        S: Sleeper + ?Sized,
    {
        while !self.state.is_terminal() {
            self.step(transport, serial, sleeper, ctx);
        }
        info!(
            trace_id = %ctx.trace_id,
            serial = %serial,
            outcome = self.state.name(),
            attempts = self.state.attempts(),
            scrolls = self.scrolls,
            "scroll search finished"
        );
        &self.state
    }
}
