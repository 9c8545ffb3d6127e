use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::app::adb::transport::{AdbTransport, DeviceTransport, SwipeGesture};
use crate::app::cancel::{resolve_trace_id, CancelToken, OpContext};
use crate::app::config::{AppConfig, InteractionSettings};
use crate::app::error::AppError;
use crate::app::models::{
    CommandResponse, ElementMatches, GestureResult, HierarchySnapshot, KeyPressResult,
    ScrollOutcome, TapResult, TextInputResult,
};
use crate::app::scheduler::TaskScheduler;
use crate::app::state::OperationRegistry;
use crate::app::ui::geometry::Point;
use crate::app::ui::hierarchy::{parse_hierarchy, parse_hierarchy_report};
use crate::app::ui::metrics::ScreenMetrics;
use crate::app::ui::planner::{
    resolve_tap_target, scroll_gesture, ScrollDirection, ScrollSearch, ScrollState, Sleeper,
    ThreadSleeper,
};
use crate::app::ui::query::{
    all_visible_text, clickable_elements, find_by_id, find_by_text, summarize, ElementSummary,
    VisibleText,
};


const KEYMAP: &[(&str, &str)] = &[
    ("HOME", "3"),
    ("BACK", "4"),
    ("VOLUME_UP", "24"),
    ("VOLUME_DOWN", "25"),
    ("POWER", "26"),
    ("TAB", "61"),
    ("SPACE", "62"),
    ("ENTER", "66"),
    ("DEL", "67"),
    ("DELETE", "67"),
    ("MENU", "82"),
    ("SEARCH", "84"),
    ("PAGE_UP", "92"),
    ("PAGE_DOWN", "93"),
    ("APP_SWITCH", "187"),
    ("RECENT_APPS", "187"),
    ("ESC", "111"),
    ("ESCAPE", "111"),
];

const MAX_CLEAR_LENGTH: u32 = 500;

/// Maps a named key to its keycode. Unknown names and raw numbers pass through unchanged.
pub fn resolve_keycode(key: &str) -> String {
    let key = key.trim();
    let upper = key.to_uppercase();
    KEYMAP
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, code)| (*code).to_string())
        .unwrap_or_else(|| key.to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_argument(
            format!("{field} is required"),
            trace_id,
        ));
    }
    Ok(())
}

fn ensure_on_screen(point: Point, field: &str, trace_id: &str) -> Result<(), AppError> {
    if point.x < 0 || point.y < 0 {
        return Err(AppError::invalid_argument(
            format!("{field} must not be negative, got {point}"),
            trace_id,
        ));
    }
    Ok(())
}

fn ensure_duration(duration_ms: u32, trace_id: &str) -> Result<u32, AppError> {
    if duration_ms == 0 {
        return Err(AppError::invalid_argument(
            "duration_ms must be positive",
            trace_id,
        ));
    }
    Ok(duration_ms)
}

/// Element-driven device interaction.
///
/// Every operation validates its inputs, then holds the device lock from its first capture
/// to its last gesture and registers its cancel token so [`Inspector::cancel_operation`] can
/// stop it from another thread.
pub struct Inspector<T, S = ThreadSleeper> {
    transport: T,
    sleeper: S,
    settings: InteractionSettings,
    scheduler: Arc<TaskScheduler>,
    operations: OperationRegistry,
    operation_timeout: Option<Duration>,
}

impl Inspector<AdbTransport> {
    pub fn from_config(config: &AppConfig, trace_id: &str) -> Result<Self, AppError> {
        let transport = AdbTransport::from_settings(&config.adb, trace_id)?;
        info!(
            trace_id = %trace_id,
            adb = %transport.program(),
            max_parallel_devices = config.scheduler.max_parallel_devices,
            "inspector ready"
        );
        Ok(Self::new(
            transport,
            config.interaction.clone(),
            Arc::new(TaskScheduler::new(config.scheduler.max_parallel_devices)),
        ))
    }
}

impl<T: DeviceTransport> Inspector<T> {
    pub fn new(transport: T, settings: InteractionSettings, scheduler: Arc<TaskScheduler>) -> Self {
        Self {
            transport,
            sleeper: ThreadSleeper,
            settings,
            scheduler,
            operations: OperationRegistry::new(),
            operation_timeout: None,
        }
    }
}

impl<T: DeviceTransport, S: Sleeper> Inspector<T, S> {
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Inspector<T, S2> {
        Inspector {
            transport: self.transport,
            sleeper,
            settings: self.settings,
            scheduler: self.scheduler,
            operations: self.operations,
            operation_timeout: self.operation_timeout,
        }
    }

    /// Gives every operation that is not handed its own token a deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    fn fresh_token(&self) -> CancelToken {
        self.operation_timeout
            .map(CancelToken::with_timeout)
            .unwrap_or_default()
    }

    fn run<R>(
        &self,
        operation: &'static str,
        serial: &str,
        trace_id: &str,
        cancel: Option<CancelToken>,
        work: impl FnOnce(&OpContext) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        ensure_non_empty(serial, "serial", trace_id)?;
        let ctx = OpContext::with_cancel(trace_id, cancel.unwrap_or_else(|| self.fresh_token()));
        let _registration = self.operations.register(serial, ctx.cancel.clone());

        let started = Instant::now();
        let result = self
            .scheduler
            .run_exclusive(serial, trace_id, || work(&ctx));
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(
                trace_id = %trace_id,
                serial = %serial,
                operation,
                elapsed_ms,
                "operation completed"
            ),
            Err(err) => warn!(
                trace_id = %trace_id,
                serial = %serial,
                operation,
                elapsed_ms,
                code = %err.code,
                error = %err.error,
                "operation failed"
            ),
        }
        result
    }

    fn capture_metrics(&self, serial: &str, ctx: &OpContext) -> Result<ScreenMetrics, AppError> {
        let raw = self.transport.capture_screen_metrics_raw(serial, ctx)?;
        Ok(ScreenMetrics::from_raw(&raw))
    }

    /// Metrics usable for gesture planning: a screen size must have been reported.
    fn capture_gesture_metrics(
        &self,
        serial: &str,
        ctx: &OpContext,
    ) -> Result<ScreenMetrics, AppError> {
        let metrics = self.capture_metrics(serial, ctx)?;
        if metrics.width_px == 0 || metrics.height_px == 0 {
            return Err(AppError::transport_failure(
                "Device did not report a screen size",
                &ctx.trace_id,
            ));
        }
        Ok(metrics)
    }

    fn swipe(
        &self,
        serial: &str,
        action: &str,
        gesture: SwipeGesture,
        ctx: &OpContext,
    ) -> Result<GestureResult, AppError> {
        self.transport.send_swipe(serial, &gesture, ctx)?;
        Ok(GestureResult {
            serial: serial.to_string(),
            action: action.to_string(),
            start: gesture.start,
            end: gesture.end,
            duration_ms: gesture.duration_ms,
        })
    }

    pub fn get_ui_hierarchy(
        &self,
        serial: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<HierarchySnapshot>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let data = self.run("get_ui_hierarchy", serial, &trace_id, None, |ctx| {
            let xml = self.transport.capture_hierarchy_dump(serial, ctx)?;
            let report = parse_hierarchy_report(&xml);
            Ok(HierarchySnapshot {
                serial: serial.to_string(),
                captured_at: Utc::now().to_rfc3339(),
                element_count: report.elements.len(),
                degraded: report.degraded,
                xml,
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn get_clickable_elements(
        &self,
        serial: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<Vec<ElementSummary>>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let data = self.run("get_clickable_elements", serial, &trace_id, None, |ctx| {
            let elements = parse_hierarchy(&self.transport.capture_hierarchy_dump(serial, ctx)?);
            Ok(summarize(&clickable_elements(&elements)))
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn find_element_by_text(
        &self,
        serial: &str,
        text: &str,
        partial: bool,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<ElementMatches>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_non_empty(text, "text", &trace_id)?;
        let data = self.run("find_element_by_text", serial, &trace_id, None, |ctx| {
            let elements = parse_hierarchy(&self.transport.capture_hierarchy_dump(serial, ctx)?);
            Ok(ElementMatches {
                query: text.to_string(),
                partial,
                elements: summarize(&find_by_text(&elements, text, partial)),
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn find_element_by_id(
        &self,
        serial: &str,
        resource_id: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<Option<ElementSummary>>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_non_empty(resource_id, "resource_id", &trace_id)?;
        let data = self.run("find_element_by_id", serial, &trace_id, None, |ctx| {
            let elements = parse_hierarchy(&self.transport.capture_hierarchy_dump(serial, ctx)?);
            Ok(find_by_id(&elements, resource_id).map(ElementSummary::from))
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn get_all_text_on_screen(
        &self,
        serial: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<Vec<VisibleText>>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let data = self.run("get_all_text_on_screen", serial, &trace_id, None, |ctx| {
            let elements = parse_hierarchy(&self.transport.capture_hierarchy_dump(serial, ctx)?);
            Ok(all_visible_text(&elements))
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn get_screen_specs(
        &self,
        serial: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<ScreenMetrics>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let data = self.run("get_screen_specs", serial, &trace_id, None, |ctx| {
            self.capture_metrics(serial, ctx)
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn tap(
        &self,
        serial: &str,
        point: Point,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<TapResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_on_screen(point, "tap point", &trace_id)?;
        let data = self.run("tap", serial, &trace_id, None, |ctx| {
            self.transport.send_tap(serial, point, ctx)?;
            Ok(TapResult {
                serial: serial.to_string(),
                point,
                element: None,
                description: format!("tap at {point}"),
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    /// Resolves the element on a fresh dump and taps its center without releasing the device.
    pub fn tap_element(
        &self,
        serial: &str,
        text: Option<&str>,
        resource_id: Option<&str>,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<TapResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let data = self.run("tap_element", serial, &trace_id, None, |ctx| {
            let elements = parse_hierarchy(&self.transport.capture_hierarchy_dump(serial, ctx)?);
            let target = resolve_tap_target(&elements, text, resource_id, &ctx.trace_id)?;
            self.transport.send_tap(serial, target.point, ctx)?;
            Ok(TapResult {
                serial: serial.to_string(),
                point: target.point,
                element: Some(target.element),
                description: target.description,
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn long_press(
        &self,
        serial: &str,
        point: Point,
        duration_ms: Option<u32>,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<GestureResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_on_screen(point, "press point", &trace_id)?;
        let duration_ms = ensure_duration(
            duration_ms.unwrap_or(self.settings.long_press_ms),
            &trace_id,
        )?;
        let gesture = SwipeGesture {
            start: point,
            end: point,
            duration_ms,
        };
        let data = self.run("long_press", serial, &trace_id, None, |ctx| {
            self.swipe(serial, "long_press", gesture, ctx)
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn double_tap(
        &self,
        serial: &str,
        point: Point,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<TapResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_on_screen(point, "tap point", &trace_id)?;
        let interval = Duration::from_millis(self.settings.double_tap_interval_ms);
        let data = self.run("double_tap", serial, &trace_id, None, |ctx| {
            self.transport.send_tap(serial, point, ctx)?;
            if !self.sleeper.sleep(interval, &ctx.cancel) {
                return Err(AppError::cancelled(
                    "Double tap cancelled after the first tap",
                    &ctx.trace_id,
                ));
            }
            self.transport.send_tap(serial, point, ctx)?;
            Ok(TapResult {
                serial: serial.to_string(),
                point,
                element: None,
                description: format!("double tap at {point}"),
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn swipe_between(
        &self,
        serial: &str,
        start: Point,
        end: Point,
        duration_ms: Option<u32>,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<GestureResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_on_screen(start, "swipe start", &trace_id)?;
        ensure_on_screen(end, "swipe end", &trace_id)?;
        let duration_ms = ensure_duration(
            duration_ms.unwrap_or(self.settings.swipe_duration_ms),
            &trace_id,
        )?;
        let gesture = SwipeGesture {
            start,
            end,
            duration_ms,
        };
        let data = self.run("swipe", serial, &trace_id, None, |ctx| {
            self.swipe(serial, "swipe", gesture, ctx)
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn scroll(
        &self,
        serial: &str,
        direction: ScrollDirection,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<GestureResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let data = self.run("scroll", serial, &trace_id, None, |ctx| {
            let metrics = self.capture_gesture_metrics(serial, ctx)?;
            let gesture = scroll_gesture(&metrics, direction, &self.settings);
            let action = match direction {
                ScrollDirection::Down => "scroll_down",
                ScrollDirection::Up => "scroll_up",
            };
            self.swipe(serial, action, gesture, ctx)
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    /// Scrolls down until `text` appears, at most `max_scrolls` dumps (configured default
    /// otherwise).
    ///
    /// `Found` and `Exhausted` are successful responses. A transport failure or
    /// cancellation is returned as an error.
    pub fn scroll_to_text(
        &self,
        serial: &str,
        text: &str,
        max_scrolls: Option<u32>,
        cancel: Option<CancelToken>,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<ScrollOutcome>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_non_empty(text, "text", &trace_id)?;
        let max_iterations = max_scrolls.unwrap_or(self.settings.scroll_max_iterations);
        if max_iterations == 0 {
            return Err(AppError::invalid_argument(
                "max_scrolls must be at least 1",
                &trace_id,
            ));
        }
        let settle = Duration::from_millis(self.settings.scroll_settle_ms);

        let data = self.run("scroll_to_text", serial, &trace_id, cancel, |ctx| {
            let metrics = self.capture_gesture_metrics(serial, ctx)?;
            let gesture = scroll_gesture(&metrics, ScrollDirection::Down, &self.settings);
            let mut search =
                ScrollSearch::new(text, max_iterations, gesture, settle, &ctx.trace_id)?;
            let state = search
                .run(&self.transport, serial, &self.sleeper, ctx)
                .clone();
            match state {
                ScrollState::TransportError { error, .. } => Err(error),
                ScrollState::Cancelled { attempts } => Err(AppError::cancelled(
                    format!("Scroll search cancelled after {attempts} attempt(s)"),
                    &ctx.trace_id,
                )),
                outcome => Ok(ScrollOutcome {
                    serial: serial.to_string(),
                    query: text.to_string(),
                    scrolls: search.scrolls(),
                    outcome,
                }),
            }
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn press_key(
        &self,
        serial: &str,
        key: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<KeyPressResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_non_empty(key, "key", &trace_id)?;
        let keycode = resolve_keycode(key);
        let data = self.run("press_key", serial, &trace_id, None, |ctx| {
            self.transport.send_key(serial, &keycode, ctx)?;
            Ok(KeyPressResult {
                serial: serial.to_string(),
                key: key.trim().to_string(),
                keycode: keycode.clone(),
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    pub fn input_text(
        &self,
        serial: &str,
        text: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<TextInputResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        if text.is_empty() {
            return Err(AppError::invalid_argument("text is required", &trace_id));
        }
        if text.chars().any(char::is_control) {
            return Err(AppError::invalid_argument(
                "text must not contain control characters; send ENTER or TAB with press_key",
                &trace_id,
            ));
        }
        let data = self.run("input_text", serial, &trace_id, None, |ctx| {
            self.transport.send_text(serial, text, ctx)?;
            Ok(TextInputResult {
                serial: serial.to_string(),
                length: text.chars().count(),
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    /// Moves the cursor to the end of the focused field and deletes up to `length` characters.
    pub fn clear_text_field(
        &self,
        serial: &str,
        length: u32,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<TextInputResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        if !(1..=MAX_CLEAR_LENGTH).contains(&length) {
            return Err(AppError::invalid_argument(
                format!("length must be between 1 and {MAX_CLEAR_LENGTH}"),
                &trace_id,
            ));
        }
        let data = self.run("clear_text_field", serial, &trace_id, None, |ctx| {
            self.transport.send_key(serial, "KEYCODE_MOVE_END", ctx)?;
            for _ in 0..length {
                self.transport.send_key(serial, "KEYCODE_DEL", ctx)?;
            }
            Ok(TextInputResult {
                serial: serial.to_string(),
                length: length as usize,
            })
        })?;
        Ok(CommandResponse { trace_id, data })
    }

    /// Signals every queued or running operation on `serial`. Does not wait for the device lock.
    pub fn cancel_operation(
        &self,
        serial: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<usize>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_non_empty(serial, "serial", &trace_id)?;
        let cancelled = self.operations.cancel(serial);
        info!(trace_id = %trace_id, serial = %serial, cancelled, "cancel requested");
        Ok(CommandResponse {
            trace_id,
            data: cancelled,
        })
    }
}
