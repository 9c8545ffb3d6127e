use serde::{Deserialize, Serialize};

use crate::app::ui::geometry::{Bounds, Point, Size};
use crate::app::ui::hierarchy::ElementRecord;

/// Element plus its derived geometry, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementSummary {
    #[serde(flatten)]
    pub element: ElementRecord,
    pub center: Option<Point>,
    pub size: Option<Size>,
}

impl From<&ElementRecord> for ElementSummary {
    fn from(element: &ElementRecord) -> Self {
        Self {
            element: element.clone(),
            center: element.center(),
            size: element.size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisibleText {
    pub index: usize,
    pub text: String,
    pub bounds: Option<Bounds>,
    pub position: Option<Point>,
    pub element_type: Option<String>,
}

pub fn clickable_elements(elements: &[ElementRecord]) -> Vec<&ElementRecord> {
    elements.iter().filter(|element| element.clickable).collect()
}

fn field_matches(field: Option<&str>, query: &str, lowered_query: &str, partial: bool) -> bool {
    match field {
        Some(value) if partial => value.to_lowercase().contains(lowered_query),
        Some(value) => value == query,
        None => false,
    }
}

/// Matches `query` against `text` and `content_desc` independently.
///
/// Partial matching is a case-insensitive substring test; exact matching is case-sensitive
/// equality. Absent fields never match.
pub fn find_by_text<'a>(
    elements: &'a [ElementRecord],
    query: &str,
    partial: bool,
) -> Vec<&'a ElementRecord> {
    let lowered = query.to_lowercase();
    elements
        .iter()
        .filter(|element| {
            field_matches(element.text.as_deref(), query, &lowered, partial)
                || field_matches(element.content_desc.as_deref(), query, &lowered, partial)
        })
        .collect()
}

/// First element whose resource id contains `resource_id`, so `button_submit` finds
/// `com.app:id/button_submit`. Short names shared by several ids resolve to the earliest.
pub fn find_by_id<'a>(
    elements: &'a [ElementRecord],
    resource_id: &str,
) -> Option<&'a ElementRecord> {
    elements.iter().find(|element| {
        element
            .resource_id
            .as_deref()
            .is_some_and(|id| id.contains(resource_id))
    })
}

pub fn all_visible_text(elements: &[ElementRecord]) -> Vec<VisibleText> {
    elements
        .iter()
        .filter_map(|element| {
            let text = element.text.as_deref().filter(|t| !t.trim().is_empty())?;
            Some(VisibleText {
                index: element.index,
                text: text.to_string(),
                bounds: element.bounds,
                position: element.center(),
                element_type: element.simple_class_name().map(str::to_string),
            })
        })
        .collect()
}

pub fn summarize(elements: &[&ElementRecord]) -> Vec<ElementSummary> {
    elements.iter().map(|element| ElementSummary::from(*element)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ui::hierarchy::parse_hierarchy;

    const TWO_NODES: &str = r#"<hierarchy>
<node text="Submit" clickable="true" bounds="[100,200][300,250]" />
<node text="Welcome" bounds="[0,0][400,100]" />
</hierarchy>"#;

    const IDS: &str = r#"<hierarchy>
<node resource-id="com.app:id/header" text="Header" bounds="[0,0][10,10]" />
<node resource-id="com.app:id/button_submit" text="Send" class="android.widget.Button" bounds="[0,20][100,60]" />
<node resource-id="com.app:id/submit_container" bounds="[0,0][100,100]" />
<node content-desc="Home screen" class="android.view.View" bounds="[0,100][100,200]" />
<node text="   " class="android.widget.TextView" bounds="[0,200][100,300]" />
</hierarchy>"#;

    #[test]
    fn clickable_filter_returns_only_clickable_with_geometry() {
        let elements = parse_hierarchy(TWO_NODES);
        let clickable = clickable_elements(&elements);
        assert_eq!(clickable.len(), 1);
        assert_eq!(clickable[0].text.as_deref(), Some("Submit"));
        assert_eq!(clickable[0].center(), Some(Point::new(200, 225)));
        assert_eq!(clickable[0].size(), Some(Size { width: 200, height: 50 }));
    }

    #[test]
    fn partial_text_search_is_case_insensitive() {
        let elements = parse_hierarchy(TWO_NODES);
        let found = find_by_text(&elements, "submit", true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 0);
        assert!(find_by_text(&elements, "home", true).is_empty());
    }

    #[test]
    fn exact_text_search_is_case_sensitive() {
        let elements = parse_hierarchy(TWO_NODES);
        assert_eq!(find_by_text(&elements, "Submit", false).len(), 1);
        assert!(find_by_text(&elements, "submit", false).is_empty());
        assert!(find_by_text(&elements, "Subm", false).is_empty());
    }

    #[test]
    fn content_description_is_an_independent_candidate() {
        let elements = parse_hierarchy(IDS);
        let found = find_by_text(&elements, "home", true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 3);
        assert_eq!(find_by_text(&elements, "Home screen", false).len(), 1);
    }

    #[test]
    fn multiple_matches_keep_document_order() {
        let xml = r#"<node text="Item 2"/><node content-desc="item 1"/><node text="other"/><node text="ITEM 3"/>"#;
        let elements = parse_hierarchy(xml);
        let found = find_by_text(&elements, "item", true);
        assert_eq!(found.iter().map(|e| e.index).collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn find_by_id_matches_short_names() {
        let elements = parse_hierarchy(IDS);
        let found = find_by_id(&elements, "button_submit").expect("found");
        assert_eq!(found.resource_id.as_deref(), Some("com.app:id/button_submit"));
        assert!(find_by_id(&elements, "nonexistent").is_none());
    }

    #[test]
    fn find_by_id_takes_the_earliest_of_several_matches() {
        let elements = parse_hierarchy(IDS);
        let found = find_by_id(&elements, "submit").expect("found");
        assert_eq!(found.index, 1);
        assert!(find_by_id(&elements, "BUTTON_SUBMIT").is_none());
    }

    #[test]
    fn visible_text_skips_blank_and_simplifies_class() {
        let elements = parse_hierarchy(IDS);
        let texts = all_visible_text(&elements);
        assert_eq!(
            texts.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(),
            vec!["Header", "Send"]
        );
        assert_eq!(texts[1].element_type.as_deref(), Some("Button"));
        assert_eq!(texts[1].position, Some(Point::new(50, 40)));
        assert_eq!(texts[0].element_type, None);
    }

    #[test]
    fn empty_dump_gives_empty_results() {
        let elements = parse_hierarchy("");
        assert!(clickable_elements(&elements).is_empty());
        assert!(find_by_text(&elements, "anything", true).is_empty());
        assert!(find_by_text(&elements, "anything", false).is_empty());
        assert!(find_by_id(&elements, "anything").is_none());
        assert!(all_visible_text(&elements).is_empty());
    }

    #[test]
    fn summary_flattens_record_and_geometry() {
        let elements = parse_hierarchy(TWO_NODES);
        let summaries = summarize(&clickable_elements(&elements));
        let value = serde_json::to_value(&summaries[0]).expect("json");
        assert_eq!(value["text"], "Submit");
        assert_eq!(value["center"]["x"], 200);
        assert_eq!(value["size"]["height"], 50);
    }
}
