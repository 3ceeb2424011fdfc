//! In-page scripts used for extraction and observation.

use serde::{Deserialize, Serialize};

/// Visible text budget returned by `browser.extract`.
pub const MAX_TEXT_CHARS: usize = 8_000;
const MAX_OBSERVED: usize = 60;

/// Page summary: title, URL, headings, visible text and links.
pub const EXTRACT_JS: &str = r#"(() => {
  const clip = (s, n) => (s || '').replace(/\s+/g, ' ').trim().slice(0, n);
  const headings = Array.from(document.querySelectorAll('h1, h2, h3'))
    .map(h => clip(h.innerText, 160)).filter(Boolean).slice(0, 40);
  const links = Array.from(document.querySelectorAll('a[href]'))
    .map(a => ({ text: clip(a.innerText, 80), href: a.href }))
    .filter(l => l.text).slice(0, 60);
  const text = document.body ? document.body.innerText : '';
  return { title: document.title, url: location.href, headings, links, text };
})()"#;

/// Visible interactive elements with a usable CSS selector each.
pub const OBSERVE_JS: &str = r#"(() => {
  const selectorOf = (el) => {
    if (el.id) return '#' + CSS.escape(el.id);
    const name = el.getAttribute('name');
    if (name) return el.tagName.toLowerCase() + '[name="' + name + '"]';
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1 && parts.length < 5) {
      if (node.id) { parts.unshift('#' + CSS.escape(node.id)); break; }
      let part = node.tagName.toLowerCase();
      const parent = node.parentElement;
      if (parent) {
        const same = Array.from(parent.children).filter(c => c.tagName === node.tagName);
        if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
      }
      parts.unshift(part);
      node = parent;
    }
    return parts.join(' > ');
  };
  const query = 'a[href], button, input, select, textarea, [role="button"], [role="link"], [onclick]';
  return Array.from(document.querySelectorAll(query))
    .filter(el => el.getClientRects().length > 0)
    .slice(0, 300)
    .map(el => ({
      selector: selectorOf(el),
      tag: el.tagName.toLowerCase(),
      text: (el.innerText || el.value || el.getAttribute('placeholder') ||
             el.getAttribute('aria-label') || el.getAttribute('title') || '')
             .replace(/\s+/g, ' ').trim().slice(0, 80),
    }));
})()"#;

/// One interactive element reported by [`OBSERVE_JS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedElement {
    pub selector: String,
    pub tag: String,
    #[serde(default)]
    pub text: String,
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "all", "any", "with", "that", "this", "find", "show", "page", "element",
    "elements", "where", "what",
];

/// Keeps elements mentioning a query keyword. When nothing matches the
/// full list is returned so the agent still sees the page.
pub fn filter_elements(elements: Vec<ObservedElement>, query: &str) -> Vec<ObservedElement> {
    let keywords: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect();

    let matches: Vec<ObservedElement> = if keywords.is_empty() {
        Vec::new()
    } else {
        elements
            .iter()
            .filter(|el| {
                let haystack = format!("{} {} {}", el.text, el.selector, el.tag).to_lowercase();
                keywords.iter().any(|k| haystack.contains(k.as_str()))
            })
            .cloned()
            .collect()
    };

    let mut chosen = if matches.is_empty() { elements } else { matches };
    chosen.truncate(MAX_OBSERVED);
    chosen
}

/// Truncates on a char boundary, marking the cut.
pub fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
