//! The Link Extractor (spec §4.10): a pure function from a revision's
//! wikitext to the link graph edges it contains.
//!
//! Four link classes are distinguished by bracket syntax:
//!   - `[[Page]]` → [`LinkType::Page`]
//!   - `{{Name}}` → [`LinkType::Template`]
//!   - `[[File:...]]` / `[[Image:...]]` → [`LinkType::File`]
//!   - `[[Category:...]]` → [`LinkType::Category`]
//!
//! Namespaced bracket links are classified by their prefix before falling
//! through to `page` — an interwiki or other-namespace link (`[[User:Alice]]`,
//! `[[w:en:Foo]]`) is still a `page` link, it just carries the prefix as part
//! of the target title, matching MediaWiki's own link-table semantics.
//!
//! ## Nested templates (spec §9 open question)
//!
//! Extraction is a single flat regex pass, not a wikitext parser: it does
//! not recurse into a template's own arguments to find templates nested
//! inside them. A template invocation whose argument contains another
//! template invocation (`{{Foo|{{Bar}}}}`) yields only the outer link
//! (`Foo`) — the inner `{{Bar}}` is consumed as part of the opaque
//! pipe-delimited remainder, not surfaced as a second template link. This
//! is a deliberate, documented policy choice, not an oversight.

use std::sync::LazyLock;

use regex::Regex;
use wikivault_types::{Link, LinkType};

static BRACKET_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[\s*([^\]|]+?)\s*(?:\|[^\]]*)?\]\]").unwrap());

static TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^}|]+?)\s*(?:\|[^}]*)?\}\}").unwrap());

/// Extract the link graph edges for `source_page_id` from `content`.
///
/// Pure function of the input text: calling this twice on the same content
/// yields the same set (spec §8's idempotence law). Order is not
/// significant; callers that need uniqueness should dedupe before calling
/// `replace_links_for_page`, since the `(source, target, type)` triple is
/// the repository's uniqueness key.
pub fn extract_links(source_page_id: u64, content: &str) -> Vec<Link> {
    let mut links = Vec::new();

    for caps in BRACKET_LINK.captures_iter(content) {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        let (link_type, target) = classify_bracket_target(raw);
        links.push(Link {
            source_page_id,
            target_title: target,
            link_type,
        });
    }

    for caps in TEMPLATE.captures_iter(content) {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        links.push(Link {
            source_page_id,
            target_title: raw.to_string(),
            link_type: LinkType::Template,
        });
    }

    dedupe(links)
}

fn classify_bracket_target(raw: &str) -> (LinkType, String) {
    if let Some(rest) = strip_prefix_ci(raw, "File:") {
        return (LinkType::File, rest.trim().to_string());
    }
    if let Some(rest) = strip_prefix_ci(raw, "Image:") {
        return (LinkType::File, rest.trim().to_string());
    }
    if let Some(rest) = strip_prefix_ci(raw, "Category:") {
        return (LinkType::Category, rest.trim().to_string());
    }
    (LinkType::Page, raw.to_string())
}

fn strip_prefix_ci<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    if raw.len() >= prefix.len() && raw[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&raw[prefix.len()..])
    } else {
        None
    }
}

fn dedupe(mut links: Vec<Link>) -> Vec<Link> {
    links.sort_by(|a, b| {
        a.source_page_id
            .cmp(&b.source_page_id)
            .then_with(|| a.link_type.as_str().cmp(b.link_type.as_str()))
            .then_with(|| a.target_title.cmp(&b.target_title))
    });
    links.dedup_by(|a, b| {
        a.source_page_id == b.source_page_id
            && a.link_type == b.link_type
            && a.target_title == b.target_title
    });
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_page_link() {
        let links = extract_links(1, "See [[Other Page]] for details.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_type, LinkType::Page);
        assert_eq!(links[0].target_title, "Other Page");
    }

    #[test]
    fn extracts_piped_page_link_using_target_not_display_text() {
        let links = extract_links(1, "[[Real Target|shown text]]");
        assert_eq!(links[0].target_title, "Real Target");
    }

    #[test]
    fn extracts_template_invocation() {
        let links = extract_links(1, "{{Infobox|name=x}} some text {{Stub}}");
        let mut templates: Vec<_> = links
            .iter()
            .filter(|l| l.link_type == LinkType::Template)
            .map(|l| l.target_title.as_str())
            .collect();
        templates.sort();
        assert_eq!(templates, vec!["Infobox", "Stub"]);
    }

    #[test]
    fn classifies_file_and_image_links() {
        let links = extract_links(1, "[[File:Cat.jpg|thumb]] and [[Image:Dog.png]]");
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.link_type == LinkType::File));
        let mut titles: Vec<_> = links.iter().map(|l| l.target_title.as_str()).collect();
        titles.sort();
        assert_eq!(titles, vec!["Cat.jpg", "Dog.png"]);
    }

    #[test]
    fn classifies_category_links() {
        let links = extract_links(1, "[[Category:Mammals]]");
        assert_eq!(links[0].link_type, LinkType::Category);
        assert_eq!(links[0].target_title, "Mammals");
    }

    #[test]
    fn namespaced_non_file_non_category_links_fall_through_to_page() {
        let links = extract_links(1, "[[User:Alice]] and [[w:en:Foo]]");
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.link_type == LinkType::Page));
    }

    #[test]
    fn nested_template_argument_is_not_recursed_into() {
        let links = extract_links(1, "{{Foo|{{Bar}}}}");
        let templates: Vec<_> = links
            .iter()
            .filter(|l| l.link_type == LinkType::Template)
            .map(|l| l.target_title.as_str())
            .collect();
        assert_eq!(templates, vec!["Foo"], "flat extraction only sees the outer invocation");
    }

    #[test]
    fn duplicate_links_are_deduped() {
        let links = extract_links(1, "[[Foo]] appears twice: [[Foo]]");
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn extraction_is_a_pure_function_of_its_input() {
        let content = "[[A]] {{B}} [[File:C.png]] [[Category:D]]";
        let first = extract_links(7, content);
        let second = extract_links(7, content);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_content_yields_no_links() {
        assert!(extract_links(1, "").is_empty());
    }

    proptest::proptest! {
        #[test]
        fn extraction_never_panics_on_arbitrary_text(s in ".{0,200}") {
            let _ = extract_links(1, &s);
        }
    }
}
