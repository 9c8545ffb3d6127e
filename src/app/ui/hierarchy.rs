use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::ui::geometry::{Bounds, Point, Size};

/// One `node` of a hierarchy dump, in document order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ElementRecord {
    pub index: usize,
    /// Number of enclosing `node` elements. Not used by queries.
    pub depth: usize,
    pub text: Option<String>,
    pub content_desc: Option<String>,
    pub resource_id: Option<String>,
    pub class_name: Option<String>,
    pub clickable: bool,
    pub bounds: Option<Bounds>,
}

impl ElementRecord {
    pub fn center(&self) -> Option<Point> {
        self.bounds.map(|bounds| bounds.center())
    }

    pub fn size(&self) -> Option<Size> {
        self.bounds.map(|bounds| bounds.size())
    }

    /// Last `.` segment of the class name, e.g. `Button` for `android.widget.Button`.
    pub fn simple_class_name(&self) -> Option<&str> {
        self.class_name
            .as_deref()
            .and_then(|name| name.rsplit('.').next())
            .filter(|name| !name.is_empty())
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![format!(
            "#{} {}",
            self.index,
            self.simple_class_name().unwrap_or("node")
        )];
        if let Some(resource_id) = &self.resource_id {
            parts.push(format!("id={resource_id}"));
        }
        if let Some(text) = &self.text {
            parts.push(format!("text=\"{text}\""));
        }
        if let Some(desc) = &self.content_desc {
            parts.push(format!("desc=\"{desc}\""));
        }
        match &self.bounds {
            Some(bounds) => parts.push(bounds.to_string()),
            None => parts.push("no bounds".to_string()),
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    MalformedAttribute,
    UnterminatedValue,
    UnterminatedTag,
    InvalidBounds,
    MissingBounds,
}

/// Informational note that a node was only partially understood.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseDegraded {
    pub node_index: usize,
    pub reason: DegradeReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchyParse {
    pub elements: Vec<ElementRecord>,
    pub degraded: Vec<ParseDegraded>,
}

struct ScannedTag<'a> {
    name: &'a str,
    attrs: Vec<(&'a str, &'a str)>,
    self_closing: bool,
    defects: Vec<DegradeReason>,
    end: usize,
}

fn bounds_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+),(\d+)\]\[(\d+),(\d+)\]$").ok())
        .as_ref()
}

/// Accepts only the exact `[a,b][c,d]` form; anything else (including overflow) is `None`.
pub fn parse_bounds(value: &str) -> Option<Bounds> {
    let caps = bounds_re()?.captures(value)?;
    let coord = |group: usize| caps[group].parse::<i32>().ok();
    Some(Bounds::new(coord(1)?, coord(2)?, coord(3)?, coord(4)?))
}

fn first_attr<'a>(attrs: &[(&'a str, &'a str)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(attr_name, _)| *attr_name == name)
        .map(|(_, value)| *value)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn skip_whitespace(bytes: &[u8], mut cursor: usize) -> usize {
    while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
        cursor += 1;
    }
    cursor
}

/// Scans one start tag. `start` points just past the `<`.
fn scan_start_tag(xml: &str, start: usize) -> ScannedTag<'_> {
    let bytes = xml.as_bytes();
    let mut cursor = start;
    while cursor < bytes.len() {
        let ch = bytes[cursor];
        if ch == b'/' || ch == b'>' || ch.is_ascii_whitespace() {
            break;
        }
        cursor += 1;
    }
    let name = &xml[start..cursor];
    let mut attrs = Vec::new();
    let mut defects = Vec::new();
    let mut self_closing = false;

    loop {
        cursor = skip_whitespace(bytes, cursor);
        if cursor >= bytes.len() {
            defects.push(DegradeReason::UnterminatedTag);
            break;
        }
        match bytes[cursor] {
            b'>' => {
                cursor += 1;
                break;
            }
            b'/' => {
                cursor += 1;
                if cursor < bytes.len() && bytes[cursor] == b'>' {
                    self_closing = true;
                    cursor += 1;
                    break;
                }
                defects.push(DegradeReason::MalformedAttribute);
                continue;
            }
            _ => {}
        }

        let name_start = cursor;
        while cursor < bytes.len() {
            let ch = bytes[cursor];
            if ch == b'=' || ch == b'>' || ch == b'/' || ch.is_ascii_whitespace() {
                break;
            }
            cursor += 1;
        }
        let attr_name = &xml[name_start..cursor];
        if attr_name.is_empty() {
            // stray '='
            cursor += 1;
            defects.push(DegradeReason::MalformedAttribute);
            continue;
        }

        cursor = skip_whitespace(bytes, cursor);
        if cursor >= bytes.len() {
            defects.push(DegradeReason::UnterminatedTag);
            break;
        }
        if bytes[cursor] != b'=' {
            defects.push(DegradeReason::MalformedAttribute);
            continue;
        }
        cursor = skip_whitespace(bytes, cursor + 1);
        if cursor >= bytes.len() {
            defects.push(DegradeReason::UnterminatedTag);
            break;
        }

        let quote = bytes[cursor];
        if quote != b'"' && quote != b'\'' {
            while cursor < bytes.len()
                && bytes[cursor] != b'>'
                && !bytes[cursor].is_ascii_whitespace()
            {
                cursor += 1;
            }
            defects.push(DegradeReason::MalformedAttribute);
            continue;
        }
        cursor += 1;
        let value_start = cursor;
        while cursor < bytes.len() && bytes[cursor] != quote {
            cursor += 1;
        }
        if cursor >= bytes.len() {
            defects.push(DegradeReason::UnterminatedValue);
            break;
        }
        attrs.push((attr_name, &xml[value_start..cursor]));
        cursor += 1;
    }

    ScannedTag {
        name,
        attrs,
        self_closing,
        defects,
        end: cursor.min(bytes.len()),
    }
}

fn build_record(
    index: usize,
    depth: usize,
    attrs: &[(&str, &str)],
    degraded: &mut Vec<ParseDegraded>,
) -> ElementRecord {
    let bounds = match first_attr(attrs, "bounds") {
        Some(raw) if !raw.is_empty() => {
            let parsed = parse_bounds(raw);
            if parsed.is_none() {
                degraded.push(ParseDegraded {
                    node_index: index,
                    reason: DegradeReason::InvalidBounds,
                });
            }
            parsed
        }
        _ => {
            degraded.push(ParseDegraded {
                node_index: index,
                reason: DegradeReason::MissingBounds,
            });
            None
        }
    };

    ElementRecord {
        index,
        depth,
        text: non_empty(first_attr(attrs, "text")),
        content_desc: non_empty(first_attr(attrs, "content-desc")),
        resource_id: non_empty(first_attr(attrs, "resource-id")),
        class_name: non_empty(first_attr(attrs, "class")),
        clickable: first_attr(attrs, "clickable") == Some("true"),
        bounds,
    }
}

/// Parses a uiautomator dump into element records plus degradation notes. Never fails.
///
/// Attribute values are kept exactly as they appear in the dump; entities are not decoded.
pub fn parse_hierarchy_report(xml: &str) -> HierarchyParse {
    let bytes = xml.as_bytes();
    let mut index: usize = 0;
    // one entry per open tag: whether it is a `node`
    let mut stack: Vec<bool> = Vec::new();
    let mut result = HierarchyParse::default();

    while index < bytes.len() {
        if bytes[index] != b'<' {
            index += 1;
            continue;
        }
        if index + 1 >= bytes.len() {
            break;
        }
        match bytes[index + 1] {
            b'/' => {
                index += 2;
                while index < bytes.len() && bytes[index] != b'>' {
                    index += 1;
                }
                index = (index + 1).min(bytes.len());
                stack.pop();
            }
            b'!' => {
                let rest = &xml[index..];
                let terminator = if rest.starts_with("<!--") { "-->" } else { ">" };
                index = match rest.find(terminator) {
                    Some(offset) => index + offset + terminator.len(),
                    None => bytes.len(),
                };
            }
            b'?' => {
                index = match xml[index..].find("?>") {
                    Some(offset) => index + offset + 2,
                    None => bytes.len(),
                };
            }
            _ => {
                let tag = scan_start_tag(xml, index + 1);
                index = tag.end.max(index + 1);
                let is_node = tag.name == "node";
                if is_node {
                    let node_index = result.elements.len();
                    let depth = stack.iter().filter(|open_is_node| **open_is_node).count();
                    for reason in &tag.defects {
                        result.degraded.push(ParseDegraded {
                            node_index,
                            reason: *reason,
                        });
                    }
                    let record = build_record(node_index, depth, &tag.attrs, &mut result.degraded);
                    result.elements.push(record);
                }
                if !tag.self_closing {
                    stack.push(is_node);
                }
            }
        }
    }

    if !result.degraded.is_empty() {
        debug!(
            nodes = result.elements.len(),
            degraded = result.degraded.len(),
            "hierarchy dump parsed with degraded nodes"
        );
    }
    result
}

pub fn parse_hierarchy(xml: &str) -> Vec<ElementRecord> {
    parse_hierarchy_report(xml).elements
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" clickable="false" bounds="[0,0][1080,2400]">
    <node index="0" text="Submit" resource-id="com.app:id/button_submit" class="android.widget.Button" content-desc="" clickable="true" bounds="[100,200][300,250]" />
    <node index="1" text="Caf&#233; &amp; Bar 日本" class="android.widget.TextView" bounds="[0,300][1080,400]" />
  </node>
</hierarchy>"#;

    #[test]
    fn parses_nodes_in_document_order() {
        let elements = parse_hierarchy(SAMPLE);
        assert_eq!(elements.len(), 3);
        assert_eq!(
            elements.iter().map(|e| e.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(elements[0].depth, 0);
        assert_eq!(elements[1].depth, 1);
        assert_eq!(elements[2].depth, 1);
    }

    #[test]
    fn extracts_attributes_and_treats_empty_as_absent() {
        let elements = parse_hierarchy(SAMPLE);
        let root = &elements[0];
        assert_eq!(root.text, None);
        assert_eq!(root.resource_id, None);
        assert_eq!(root.class_name.as_deref(), Some("android.widget.FrameLayout"));
        assert!(!root.clickable);

        let button = &elements[1];
        assert_eq!(button.text.as_deref(), Some("Submit"));
        assert_eq!(button.content_desc, None);
        assert_eq!(button.resource_id.as_deref(), Some("com.app:id/button_submit"));
        assert!(button.clickable);
        assert_eq!(button.bounds, Some(Bounds::new(100, 200, 300, 250)));
        assert_eq!(button.simple_class_name(), Some("Button"));
    }

    #[test]
    fn keeps_entities_and_unicode_verbatim() {
        let elements = parse_hierarchy(SAMPLE);
        assert_eq!(elements[2].text.as_deref(), Some("Caf&#233; &amp; Bar 日本"));
    }

    #[test]
    fn clickable_requires_exact_literal() {
        let xml = r#"<node clickable="TRUE" bounds="[0,0][1,1]"/><node clickable="true " bounds="[0,0][1,1]"/><node clickable="true" bounds="[0,0][1,1]"/>"#;
        let elements = parse_hierarchy(xml);
        assert_eq!(
            elements.iter().map(|e| e.clickable).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[test]
    fn rejects_non_exact_bounds_without_failing() {
        let xml = r#"<node text="a" bounds="[0, 0][10,10]"/><node text="b" bounds="[-1,0][10,10]"/><node text="c" bounds="[0,0][99999999999,10]"/>"#;
        let report = parse_hierarchy_report(xml);
        assert_eq!(report.elements.len(), 3);
        assert!(report.elements.iter().all(|e| e.bounds.is_none()));
        assert_eq!(
            report
                .degraded
                .iter()
                .filter(|d| d.reason == DegradeReason::InvalidBounds)
                .count(),
            3
        );
    }

    #[test]
    fn passes_inverted_bounds_through() {
        let elements = parse_hierarchy(r#"<node text="x" bounds="[300,250][100,200]"/>"#);
        let bounds = elements[0].bounds.expect("bounds present");
        assert!(bounds.is_inverted());
        assert_eq!(elements[0].center(), Some(Point::new(200, 225)));
    }

    #[test]
    fn attributes_in_any_order_and_single_quotes() {
        let xml = "<node bounds='[1,2][3,4]' clickable='true' text='Go'></node>";
        let elements = parse_hierarchy(xml);
        assert_eq!(elements[0].text.as_deref(), Some("Go"));
        assert!(elements[0].clickable);
        assert_eq!(elements[0].bounds, Some(Bounds::new(1, 2, 3, 4)));
    }

    #[test]
    fn quoted_angle_brackets_do_not_end_the_tag() {
        let xml = r#"<node text="a > b" content-desc="x<y" bounds="[0,0][10,10]"/>"#;
        let elements = parse_hierarchy(xml);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text.as_deref(), Some("a > b"));
        assert_eq!(elements[0].content_desc.as_deref(), Some("x<y"));
    }

    #[test]
    fn malformed_attributes_keep_the_rest_of_the_node() {
        let xml = r#"<node checked text="Keep" clickable=true bounds="[0,0][10,10]"/><node text="Next"/>"#;
        let report = parse_hierarchy_report(xml);
        assert_eq!(report.elements.len(), 2);
        assert_eq!(report.elements[0].text.as_deref(), Some("Keep"));
        assert!(!report.elements[0].clickable);
        assert_eq!(report.elements[0].bounds, Some(Bounds::new(0, 0, 10, 10)));
        assert_eq!(report.elements[1].text.as_deref(), Some("Next"));
        assert!(report
            .degraded
            .iter()
            .any(|d| d.node_index == 0 && d.reason == DegradeReason::MalformedAttribute));
        assert!(report
            .degraded
            .iter()
            .any(|d| d.node_index == 1 && d.reason == DegradeReason::MissingBounds));
    }

    #[test]
    fn truncated_dump_yields_partial_record() {
        let xml = r#"<hierarchy><node text="Full" bounds="[0,0][5,5]"/><node text="Half" bounds="[0,0][5"#;
        let report = parse_hierarchy_report(xml);
        assert_eq!(report.elements.len(), 2);
        assert_eq!(report.elements[1].text.as_deref(), Some("Half"));
        assert_eq!(report.elements[1].bounds, None);
        assert!(report
            .degraded
            .iter()
            .any(|d| d.node_index == 1 && d.reason == DegradeReason::UnterminatedValue));
    }

    #[test]
    fn ignores_comments_and_trailing_tool_output() {
        let xml = "<!-- <node text=\"hidden\"/> --><node text=\"shown\"/>\nUI hierchary dumped to: /dev/tty\n";
        let elements = parse_hierarchy(xml);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text.as_deref(), Some("shown"));
    }

    #[test]
    fn empty_and_garbage_input_yield_nothing() {
        assert!(parse_hierarchy("").is_empty());
        assert!(
            parse_hierarchy("ERROR: null root node returned by UiTestAutomationBridge.").is_empty()
        );
        assert!(parse_hierarchy("<").is_empty());
        assert!(parse_hierarchy("<hierarchy rotation=\"0\"></hierarchy>").is_empty());
    }

    #[test]
    fn first_duplicate_attribute_wins() {
        let elements = parse_hierarchy(r#"<node text="first" text="second"/>"#);
        assert_eq!(elements[0].text.as_deref(), Some("first"));
    }

    #[test]
    fn describe_mentions_identity_and_geometry() {
        let elements = parse_hierarchy(SAMPLE);
        let description = elements[1].describe();
        assert!(description.contains("Button"));
        assert!(description.contains("button_submit"));
        assert!(description.contains("[100,200][300,250]"));
    }
}
