//! Pure DOM-to-sections extraction for one hall container.
//!
//! The container layout is a flat list: heading elements open a category,
//! `span` elements are menu items under the open category. The page renders a
//! literal "No Menu Available" child when a hall is closed.

use scraper::{ElementRef, Html};

use super::MenuSection;

pub const NO_MENU_MARKER: &str = "No Menu Available";

/// Parses a container's outer HTML and applies the placeholder-header fix.
pub fn sections(container_html: &str) -> Vec<MenuSection> {
    drop_placeholder_header(parse_container(container_html))
}

/// Folds the container's direct children, in document order, into sections.
///
/// Fold state is (accumulated sections, index of the open category). A
/// recurring category name resets that category's items in place, so the last
/// occurrence wins. Any child carrying the "No Menu Available" marker
/// short-circuits to the sentinel section, discarding everything accumulated.
pub fn parse_container(container_html: &str) -> Vec<MenuSection> {
    let fragment = Html::parse_fragment(container_html);
    let Some(container) = fragment.root_element().child_elements().next() else {
        return Vec::new();
    };

    let mut sections: Vec<MenuSection> = Vec::new();
    let mut current: Option<usize> = None;

    for child in container.child_elements() {
        let text = element_text(child);
        if text.is_empty() {
            continue;
        }

        if text.contains(NO_MENU_MARKER) {
            return vec![MenuSection::new(NO_MENU_MARKER)];
        }

        if is_heading(child) {
            match sections.iter().position(|s| s.category == text) {
                Some(index) => {
                    sections[index].items.clear();
                    current = Some(index);
                }
                None => {
                    sections.push(MenuSection::new(text));
                    current = Some(sections.len() - 1);
                }
            }
        } else if is_item(child) {
            if let Some(index) = current {
                sections[index].items.push(text);
            }
        }
    }

    sections
}

/// Drops the leading section whenever more than one was parsed. The page
/// always renders a stray date header before the first real category; with a
/// single section there is nothing to correct.
pub fn drop_placeholder_header(mut sections: Vec<MenuSection>) -> Vec<MenuSection> {
    if sections.len() > 1 {
        sections.remove(0);
    }
    sections
}

/// A container is extractable once it shows the closed-hall marker or at
/// least one heading or item child with real text.
pub fn is_stable(container_html: &str) -> bool {
    let fragment = Html::parse_fragment(container_html);
    let Some(container) = fragment.root_element().child_elements().next() else {
        return false;
    };

    let stable = container.child_elements().any(|child| {
        let text = element_text(child);
        if text.is_empty() {
            return false;
        }
        text.contains(NO_MENU_MARKER) || is_heading(child) || is_item(child)
    });
    stable
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn is_heading(element: ElementRef) -> bool {
    matches!(
        element.value().name(),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

fn is_item(element: ElementRef) -> bool {
    element.value().name() == "span"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(category: &str, items: &[&str]) -> MenuSection {
        MenuSection {
            category: category.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn first_of_many_sections_is_dropped() {
        let html = "<div id='u49'>\
            <h3>Wednesday, August 20</h3>\
            <h3>Entrees</h3><span>Roast Chicken</span><span>Tofu Stir Fry</span>\
            <h3>Sides</h3><span>Rice Pilaf</span>\
        </div>";

        assert_eq!(
            sections(html),
            vec![
                section("Entrees", &["Roast Chicken", "Tofu Stir Fry"]),
                section("Sides", &["Rice Pilaf"]),
            ]
        );
    }

    #[test]
    fn single_section_is_preserved() {
        let html = "<div><h3>Entrees</h3><span>Pancakes</span></div>";
        assert_eq!(sections(html), vec![section("Entrees", &["Pancakes"])]);
    }

    #[test]
    fn marker_short_circuits_regardless_of_other_content() {
        let html = "<div>\
            <h3>Entrees</h3><span>Pancakes</span>\
            <p>No Menu Available</p>\
            <h3>Sides</h3><span>Toast</span>\
        </div>";

        assert_eq!(sections(html), vec![section(NO_MENU_MARKER, &[])]);
    }

    #[test]
    fn marker_inside_heading_still_short_circuits() {
        let html = "<div><h3>No Menu Available</h3></div>";
        assert_eq!(sections(html), vec![section(NO_MENU_MARKER, &[])]);
    }

    #[test]
    fn empty_container_yields_no_sections() {
        assert_eq!(sections("<div></div>"), Vec::<MenuSection>::new());
        assert_eq!(sections(""), Vec::<MenuSection>::new());
    }

    #[test]
    fn blank_children_are_ignored() {
        let html = "<div><p>   </p><h3>Entrees</h3><span>  </span><span>Soup</span></div>";
        assert_eq!(sections(html), vec![section("Entrees", &["Soup"])]);
    }

    #[test]
    fn items_before_any_heading_are_ignored() {
        let html = "<div><span>Orphan</span><h3>Entrees</h3><span>Soup</span></div>";
        assert_eq!(sections(html), vec![section("Entrees", &["Soup"])]);
    }

    #[test]
    fn recurring_category_resets_its_items() {
        let html = "<div>\
            <h3>Date Header</h3>\
            <h3>Entrees</h3><span>Old Dish</span>\
            <h3>Entrees</h3><span>New Dish</span>\
        </div>";

        assert_eq!(sections(html), vec![section("Entrees", &["New Dish"])]);
    }

    #[test]
    fn placeholder_drop_is_a_noop_for_one_section() {
        let one = vec![section("Entrees", &["Soup"])];
        assert_eq!(drop_placeholder_header(one.clone()), one);

        let many = vec![section("Date", &[]), section("Entrees", &["Soup"])];
        assert_eq!(
            drop_placeholder_header(many),
            vec![section("Entrees", &["Soup"])]
        );
    }

    #[test]
    fn stability_requires_menu_content_or_marker() {
        assert!(!is_stable("<div></div>"));
        assert!(!is_stable("<div><p>loading...</p></div>"));
        assert!(is_stable("<div><h3>Entrees</h3></div>"));
        assert!(is_stable("<div><em>No Menu Available</em></div>"));
    }
}
