//! Removal of disallowed elements from page markup.
//!
//! Page content is an HTML fragment written by the worksheet editor. Some
//! editor widgets leave live markup behind that the editor cannot load back;
//! those elements are stripped together with their subtrees.

use crate::error::RepairError;
use crate::types::DEFAULT_DISALLOWED_SELECTOR;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static DEFAULT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(DEFAULT_DISALLOWED_SELECTOR).unwrap());

/// Result of sanitizing one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Whether any element was removed
    pub changed: bool,

    /// Serialized markup; the input itself when nothing changed
    pub html: String,

    /// Short description of each removed element
    pub removed: Vec<String>,
}

/// Strips elements matching a selector out of markup fragments.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    selector: Selector,
}

impl Sanitizer {
    /// Build a sanitizer removing elements that match `selector`.
    ///
    /// # Errors
    ///
    /// Returns `RepairError::InvalidSelector` if `selector` is not valid CSS.
    pub fn new(selector: &str) -> Result<Self, RepairError> {
        let selector = Selector::parse(selector)
            .map_err(|e| RepairError::InvalidSelector(format!("{selector}: {e}")))?;
        Ok(Self { selector })
    }

    /// Parse `fragment` leniently and remove every disallowed element.
    ///
    /// Malformed markup never fails; the parser recovers the way a browser
    /// would. Serialization after a removal may normalize the markup.
    pub fn sanitize(&self, fragment: &str) -> Sanitized {
        let mut document = Html::parse_fragment(fragment);

        let mut removed = Vec::new();
        let matched: Vec<_> = document
            .select(&self.selector)
            .map(|el| {
                removed.push(describe(&el));
                el.id()
            })
            .collect();

        if matched.is_empty() {
            return Sanitized {
                changed: false,
                html: fragment.to_string(),
                removed,
            };
        }

        for id in matched {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        Sanitized {
            changed: true,
            html: document.root_element().inner_html(),
            removed,
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            selector: DEFAULT_SELECTOR.clone(),
        }
    }
}

fn describe(el: &ElementRef<'_>) -> String {
    let element = el.value();
    format!(
        "{}[class=\"{}\"][data-js=\"{}\"][id=\"{}\"]",
        element.name(),
        element.attr("class").unwrap_or_default(),
        element.attr("data-js").unwrap_or_default(),
        element.attr("id").unwrap_or_default(),
    )
}
