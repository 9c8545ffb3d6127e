use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::adb::locator::{resolve_adb_program, validate_adb_program};
use crate::app::adb::runner::run_adb;
use crate::app::cancel::OpContext;
use crate::app::config::AdbSettings;
use crate::app::error::AppError;
use crate::app::ui::geometry::Point;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwipeGesture {
    pub start: Point,
    pub end: Point,
    pub duration_ms: u32,
}

/// Boundary to the device: raw text in, gestures out.
///
/// Implementations never retry; each call is one attempt bounded by the command timeout and
/// the context's cancel token.
pub trait DeviceTransport: Send + Sync {
    fn capture_hierarchy_dump(&self, serial: &str, ctx: &OpContext) -> Result<String, AppError>;

    /// `wm size` output followed by `wm density` output.
    fn capture_screen_metrics_raw(&self, serial: &str, ctx: &OpContext)
        -> Result<String, AppError>;

    fn send_tap(&self, serial: &str, point: Point, ctx: &OpContext) -> Result<(), AppError>;

    fn send_swipe(
        &self,
        serial: &str,
        gesture: &SwipeGesture,
        ctx: &OpContext,
    ) -> Result<(), AppError>;

    fn send_key(&self, serial: &str, keycode: &str, ctx: &OpContext) -> Result<(), AppError>;

    fn send_text(&self, serial: &str, text: &str, ctx: &OpContext) -> Result<(), AppError>;
}

pub struct AdbTransport {
    program: String,
    /// Arguments placed before `-s <serial>`, e.g. `-H host -P port`.
    base_args: Vec<String>,
    timeout: Duration,
}

impl AdbTransport {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout,
        }
    }

    pub fn with_base_args(mut self, base_args: Vec<String>) -> Self {
        self.base_args = base_args;
        self
    }

    pub fn from_settings(settings: &AdbSettings, trace_id: &str) -> Result<Self, AppError> {
        let program = resolve_adb_program(&settings.command_path);
        validate_adb_program(&program, trace_id)?;
        let mut base_args = Vec::new();
        if !settings.server_host.trim().is_empty() {
            base_args.push("-H".to_string());
            base_args.push(settings.server_host.trim().to_string());
        }
        if let Some(port) = settings.server_port {
            base_args.push("-P".to_string());
            base_args.push(port.to_string());
        }
        Ok(Self::new(program, Duration::from_secs(settings.command_timeout_sec))
            .with_base_args(base_args))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn device_args(&self, serial: &str, tail: &[&str]) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("-s".to_string());
        args.push(serial.to_string());
        args.extend(tail.iter().map(|item| item.to_string()));
        args
    }

    fn shell(&self, serial: &str, tail: &[&str], ctx: &OpContext) -> Result<String, AppError> {
        let mut command = vec!["shell"];
        command.extend_from_slice(tail);
        let args = self.device_args(serial, &command);
        run_adb(&self.program, &args, self.timeout, ctx)
            .map(|output| output.stdout)
            .inspect_err(|err| {
                warn!(trace_id = %ctx.trace_id, serial = %serial, error = %err, "adb shell failed");
            })
    }
}

/// Characters the device shell would expand, split on, or treat as a comment.
const SHELL_ACTIVE: &[char] = &[
    '&', '<', '>', '(', ')', ';', '|', '"', '\'', '`', '$', '\\', '*', '?', '[', ']', '~', '#',
    '{', '}', '!', '%',
];

/// Escapes text for `input text`: spaces become `%s`, shell-active characters get a backslash.
///
/// Control characters cannot be escaped for the device shell (a newline ends the command), so
/// they are rejected.
pub fn escape_input_text(text: &str, trace_id: &str) -> Result<String, AppError> {
    if let Some(ch) = text.chars().find(|ch| ch.is_control()) {
        return Err(AppError::invalid_argument(
            format!("text must not contain control characters, got {:?}", ch),
            trace_id,
        ));
    }
    let mut escaped = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' => escaped.push_str("%s"),
            ch if SHELL_ACTIVE.contains(&ch) => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    Ok(escaped)
}

impl DeviceTransport for AdbTransport {
    fn capture_hierarchy_dump(&self, serial: &str, ctx: &OpContext) -> Result<String, AppError> {
        let args = self.device_args(serial, &["exec-out", "uiautomator", "dump", "/dev/tty"]);
        let output = run_adb(&self.program, &args, self.timeout, ctx).inspect_err(|err| {
            warn!(
                trace_id = %ctx.trace_id,
                serial = %serial,
                error = %err,
                "uiautomator dump failed"
            );
        })?;
        if !output.stdout.contains("<hierarchy") && !output.stdout.contains("<node") {
            return Err(AppError::transport_failure(
                format!("UI dump failed: {}", output.stdout.trim()),
                &ctx.trace_id,
            ));
        }
        Ok(output.stdout)
    }

    fn capture_screen_metrics_raw(
        &self,
        serial: &str,
        ctx: &OpContext,
    ) -> Result<String, AppError> {
        let size = self.shell(serial, &["wm", "size"], ctx)?;
        let density = self.shell(serial, &["wm", "density"], ctx)?;
        Ok(format!("{}\n{}", size.trim_end(), density.trim_end()))
    }

    fn send_tap(&self, serial: &str, point: Point, ctx: &OpContext) -> Result<(), AppError> {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        self.shell(serial, &["input", "tap", &x, &y], ctx).map(|_| ())
    }

    fn send_swipe(
        &self,
        serial: &str,
        gesture: &SwipeGesture,
        ctx: &OpContext,
    ) -> Result<(), AppError> {
        let coords = [
            gesture.start.x.to_string(),
            gesture.start.y.to_string(),
            gesture.end.x.to_string(),
            gesture.end.y.to_string(),
            gesture.duration_ms.to_string(),
        ];
        let mut tail = vec!["input", "swipe"];
        tail.extend(coords.iter().map(String::as_str));
        self.shell(serial, &tail, ctx).map(|_| ())
    }

    fn send_key(&self, serial: &str, keycode: &str, ctx: &OpContext) -> Result<(), AppError> {
        self.shell(serial, &["input", "keyevent", keycode], ctx)
            .map(|_| ())
    }

    fn send_text(&self, serial: &str, text: &str, ctx: &OpContext) -> Result<(), AppError> {
        let escaped = escape_input_text(text, &ctx.trace_id)?;
        self.shell(serial, &["input", "text", &escaped], ctx)
            .map(|_| ())
    }
}
