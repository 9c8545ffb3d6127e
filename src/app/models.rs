use serde::{Deserialize, Serialize};

use crate::app::ui::geometry::Point;
use crate::app::ui::hierarchy::ParseDegraded;
use crate::app::ui::planner::ScrollState;
use crate::app::ui::query::ElementSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchySnapshot {
    pub serial: String,
    /// RFC 3339, UTC.
    pub captured_at: String,
    pub element_count: usize,
    pub degraded: Vec<ParseDegraded>,
    pub xml: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementMatches {
    pub query: String,
    pub partial: bool,
    pub elements: Vec<ElementSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TapResult {
    pub serial: String,
    pub point: Point,
    /// Present when the point was resolved from an element.
    pub element: Option<ElementSummary>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GestureResult {
    pub serial: String,
    pub action: String,
    pub start: Point,
    pub end: Point,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPressResult {
    pub serial: String,
    pub key: String,
    pub keycode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextInputResult {
    pub serial: String,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub serial: String,
    pub query: String,
    pub scrolls: u32,
    pub outcome: ScrollState,
}

impl ScrollOutcome {
    pub fn found(&self) -> bool {
        matches!(self.outcome, ScrollState::Found { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_outcome_flattens_state_tag() {
        let outcome = ScrollOutcome {
            serial: "ABC".to_string(),
            query: "Settings".to_string(),
            scrolls: 2,
            outcome: ScrollState::Exhausted { attempts: 3 },
        };
        let value = serde_json::to_value(&outcome).expect("json");
        assert_eq!(value["outcome"]["state"], "exhausted");
        assert_eq!(value["scrolls"], 2);
        assert!(!outcome.found());
    }

    #[test]
    fn command_response_wraps_payload() {
        let response = CommandResponse {
            trace_id: "trace-1".to_string(),
            data: KeyPressResult {
                serial: "ABC".to_string(),
                key: "BACK".to_string(),
                keycode: "4".to_string(),
            },
        };
        let value = serde_json::to_value(&response).expect("json");
        assert_eq!(value["trace_id"], "trace-1");
        assert_eq!(value["data"]["keycode"], "4");
    }
}
