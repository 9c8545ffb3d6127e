use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use adb_ui_query::app::cancel::resolve_trace_id;
use adb_ui_query::app::commands::Inspector;
use adb_ui_query::app::config::{load_config, load_config_from_path};
use adb_ui_query::app::error::AppError;
use adb_ui_query::app::logging::init_logging;
use adb_ui_query::app::models::CommandResponse;
use adb_ui_query::app::ui::geometry::Point;
use adb_ui_query::app::ui::planner::ScrollDirection;
use serde::Serialize;

const USAGE: &str = "Usage: ui-query [--serial SERIAL] [--config PATH] [--timeout-sec N] <command>\n\
Commands:\n  \
  hierarchy\n  \
  clickable\n  \
  find-text <query> [--exact]\n  \
  find-id <resource-id>\n  \
  texts\n  \
  specs\n  \
  tap <x> <y>\n  \
  tap-element (--text <text> | --id <resource-id>)\n  \
  scroll <up|down>\n  \
  scroll-to <text> [--max N]\n  \
  key <name|code>\n  \
  text <value>\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Request {
    Hierarchy,
    Clickable,
    FindText { query: String, exact: bool },
    FindId(String),
    Texts,
    Specs,
    Tap(Point),
    TapElement { text: Option<String>, id: Option<String> },
    Scroll(ScrollDirection),
    ScrollTo { text: String, max: Option<u32> },
    Key(String),
    Text(String),
}

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    config: Option<PathBuf>,
    timeout_sec: Option<u64>,
    request: Request,
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("{what} must be a number, got '{value}'"))
}

/// Subcommand that accepts each command-specific flag.
const FLAG_OWNERS: &[(&str, &str)] = &[
    ("--exact", "find-text"),
    ("--text", "tap-element"),
    ("--id", "tap-element"),
    ("--max", "scroll-to"),
];

/// Number of positional operands each command takes.
fn operand_count(command: &str) -> usize {
    match command {
        "find-text" | "find-id" | "scroll" | "scroll-to" | "key" | "text" => 1,
        "tap" => 2,
        _ => 0,
    }
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut serial: Option<String> = None;
    let mut config: Option<PathBuf> = None;
    let mut timeout_sec: Option<u64> = None;
    let mut exact = false;
    let mut text: Option<String> = None;
    let mut id: Option<String> = None;
    let mut max: Option<u32> = None;
    let mut positionals: Vec<String> = Vec::new();
    let mut command_flags: Vec<&'static str> = Vec::new();

    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        if let Some((flag, _)) = FLAG_OWNERS.iter().find(|(flag, _)| *flag == arg) {
            command_flags.push(*flag);
        }
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--config" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--timeout-sec" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--timeout-sec requires a value".to_string())?;
                let secs = parse_number::<u64>(&value, "--timeout-sec")?;
                if secs == 0 {
                    return Err("--timeout-sec must be positive".to_string());
                }
                timeout_sec = Some(secs);
            }
            "--exact" => {
                exact = true;
            }
            "--text" => {
                text = Some(
                    it.next()
                        .ok_or_else(|| "--text requires a value".to_string())?,
                );
            }
            "--id" => {
                id = Some(
                    it.next()
                        .ok_or_else(|| "--id requires a value".to_string())?,
                );
            }
            "--max" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--max requires a value".to_string())?;
                max = Some(parse_number::<u32>(&value, "--max")?);
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => return Err(format!("Unknown arg: {other}")),
            _ => positionals.push(arg),
        }
    }

    let mut positionals = positionals.into_iter();
    let command = positionals.next().ok_or_else(|| USAGE.to_string())?;
    let operands: Vec<String> = positionals.collect();
    let operand = |position: usize, name: &str| {
        operands
            .get(position)
            .cloned()
            .ok_or_else(|| format!("{command} requires <{name}>"))
    };

    let request = match command.as_str() {
        "hierarchy" => Request::Hierarchy,
        "clickable" => Request::Clickable,
        "find-text" => Request::FindText {
            query: operand(0, "query")?,
            exact,
        },
        "find-id" => Request::FindId(operand(0, "resource-id")?),
        "texts" => Request::Texts,
        "specs" => Request::Specs,
        "tap" => Request::Tap(Point::new(
            parse_number(&operand(0, "x")?, "x")?,
            parse_number(&operand(1, "y")?, "y")?,
        )),
        "tap-element" => {
            if text.is_none() && id.is_none() {
                return Err("tap-element requires --text or --id".to_string());
            }
            Request::TapElement { text, id }
        }
        "scroll" => match operand(0, "direction")?.as_str() {
            "down" => Request::Scroll(ScrollDirection::Down),
            "up" => Request::Scroll(ScrollDirection::Up),
            other => return Err(format!("scroll direction must be up or down, got '{other}'")),
        },
        "scroll-to" => Request::ScrollTo {
            text: operand(0, "text")?,
            max,
        },
        "key" => Request::Key(operand(0, "name|code")?),
        "text" => Request::Text(operand(0, "value")?),
        other => return Err(format!("Unknown command: {other}\n{USAGE}")),
    };

    for flag in &command_flags {
        let owner = FLAG_OWNERS
            .iter()
            .find(|(name, _)| name == flag)
            .map(|(_, owner)| *owner);
        if owner != Some(command.as_str()) {
            return Err(format!("{flag} is not valid for {command}"));
        }
    }
    if operands.len() > operand_count(&command) {
        return Err(format!(
            "Unexpected arg for {command}: {}",
            operands[operand_count(&command)]
        ));
    }

    Ok(Args {
        serial,
        config,
        timeout_sec,
        request,
    })
}

fn emit<T: Serialize>(response: CommandResponse<T>) -> Result<(), AppError> {
    let payload = serde_json::to_string_pretty(&response).map_err(|err| {
        AppError::system(format!("Failed to serialize response: {err}"), &response.trace_id)
    })?;
    println!("{payload}");
    Ok(())
}

fn run(args: Args, trace_id: &str) -> Result<(), AppError> {
    let config = match &args.config {
        Some(path) => load_config_from_path(path, trace_id)?,
        None => load_config(trace_id)?,
    };
    init_logging(&config.logging);

    let serial = args
        .serial
        .or_else(|| {
            std::env::var("ANDROID_SERIAL")
                .ok()
                .filter(|s| !s.trim().is_empty())
        })
        .ok_or_else(|| {
            AppError::invalid_argument(
                "No device serial: pass --serial or set ANDROID_SERIAL",
                trace_id,
            )
        })?;

    let mut inspector = Inspector::from_config(&config, trace_id)?;
    if let Some(secs) = args.timeout_sec {
        inspector = inspector.with_operation_timeout(Duration::from_secs(secs));
    }
    let trace = Some(trace_id.to_string());

    match args.request {
        Request::Hierarchy => emit(inspector.get_ui_hierarchy(&serial, trace)?),
        Request::Clickable => emit(inspector.get_clickable_elements(&serial, trace)?),
        Request::FindText { query, exact } => {
            emit(inspector.find_element_by_text(&serial, &query, !exact, trace)?)
        }
        Request::FindId(resource_id) => {
            emit(inspector.find_element_by_id(&serial, &resource_id, trace)?)
        }
        Request::Texts => emit(inspector.get_all_text_on_screen(&serial, trace)?),
        Request::Specs => emit(inspector.get_screen_specs(&serial, trace)?),
        Request::Tap(point) => emit(inspector.tap(&serial, point, trace)?),
        Request::TapElement { text, id } => emit(inspector.tap_element(
            &serial,
            text.as_deref(),
            id.as_deref(),
            trace,
        )?),
        Request::Scroll(direction) => emit(inspector.scroll(&serial, direction, trace)?),
        Request::ScrollTo { text, max } => {
            emit(inspector.scroll_to_text(&serial, &text, max, None, trace)?)
        }
        Request::Key(key) => emit(inspector.press_key(&serial, &key, trace)?),
        Request::Text(value) => emit(inspector.input_text(&serial, &value, trace)?),
    }
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let trace_id = resolve_trace_id(None);
    match run(args, &trace_id) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string());
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Result<Args, String> {
        parse_args(items.iter().map(|item| item.to_string()))
    }

    #[test]
    fn parses_global_flags_around_the_command() {
        let parsed = args(&[
            "--serial",
            "emulator-5554",
            "find-text",
            "Sign in",
            "--exact",
            "--timeout-sec",
            "9",
        ])
        .expect("args");
        assert_eq!(parsed.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(parsed.timeout_sec, Some(9));
        assert_eq!(
            parsed.request,
            Request::FindText {
                query: "Sign in".to_string(),
                exact: true
            }
        );
    }

    #[test]
    fn parses_tap_coordinates() {
        let parsed = args(&["tap", "200", "225"]).expect("args");
        assert_eq!(parsed.request, Request::Tap(Point::new(200, 225)));
        assert!(args(&["tap", "200"]).unwrap_err().contains("<y>"));
        assert!(args(&["tap", "x", "1"]).unwrap_err().contains("number"));
    }

    #[test]
    fn tap_element_needs_a_selector() {
        assert!(args(&["tap-element"]).is_err());
        let parsed = args(&["tap-element", "--id", "button_submit"]).expect("args");
        assert_eq!(
            parsed.request,
            Request::TapElement {
                text: None,
                id: Some("button_submit".to_string())
            }
        );
    }

    #[test]
    fn parses_scroll_commands() {
        let parsed = args(&["scroll-to", "Settings", "--max", "4"]).expect("args");
        assert_eq!(
            parsed.request,
            Request::ScrollTo {
                text: "Settings".to_string(),
                max: Some(4)
            }
        );
        assert_eq!(
            args(&["scroll", "up"]).expect("args").request,
            Request::Scroll(ScrollDirection::Up)
        );
        assert!(args(&["scroll", "left"]).is_err());
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(args(&[]).is_err());
        assert!(args(&["hierarchy", "--bogus"]).unwrap_err().contains("Unknown arg"));
        assert!(args(&["wiggle"]).unwrap_err().contains("Unknown command"));
        assert!(args(&["--timeout-sec", "0", "specs"]).is_err());
        assert!(args(&["--serial"]).is_err());
    }

    #[test]
    fn rejects_flags_for_other_commands() {
        assert!(args(&["hierarchy", "--exact"])
            .unwrap_err()
            .contains("--exact is not valid for hierarchy"));
        assert!(args(&["find-id", "submit", "--max", "3"])
            .unwrap_err()
            .contains("--max"));
        assert!(args(&["scroll-to", "Settings", "--text", "x"])
            .unwrap_err()
            .contains("--text"));
        assert!(args(&["find-text", "Sign in", "--id", "button"])
            .unwrap_err()
            .contains("--id"));
        assert!(args(&["find-text", "Sign in", "--exact"]).is_ok());
        assert!(args(&["tap-element", "--text", "Submit"]).is_ok());
    }

    #[test]
    fn rejects_extra_operands() {
        assert!(args(&["specs", "now"])
            .unwrap_err()
            .contains("Unexpected arg for specs: now"));
        assert!(args(&["tap", "1", "2", "3"]).unwrap_err().contains("3"));
        assert!(args(&["text", "hello world"]).is_ok());
    }
}
