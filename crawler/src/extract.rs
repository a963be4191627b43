//! Visible text and outbound links from an HTML page.

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Elements whose contents are never visible text.
const SKIPPED: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: Url,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub text: String,
    pub links: Vec<Link>,
}

pub fn parse_page(html: &str, base: &Url) -> Page {
    let doc = Html::parse_document(html);
    let text = visible_text(doc.root_element());
    let anchors = Selector::parse("a[href]").expect("static selector");
    let links = doc
        .select(&anchors)
        .filter_map(|a| {
            let url = resolve_link(base, a.value().attr("href")?)?;
            Some(Link { url, text: visible_text(a) })
        })
        .collect();
    Page { text, links }
}

/// Text nodes under `root` in document order, one per line.
///
/// Walks with an explicit stack so deeply nested markup cannot exhaust the call stack.
pub fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Node::Element(el) if SKIPPED.contains(&el.name()) => continue,
            _ => {}
        }
        stack.extend(node.children().rev());
    }
    parts.join("\n")
}

/// Absolute http(s) URL for `href`, fragment stripped. None for quotes and other schemes.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    if href.contains('\'') {
        return None;
    }
    let mut url = base.join(href.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    if url.as_str().contains('\'') {
        return None;
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url { Url::parse("http://site.test/dir/page.html").unwrap() }

    #[test]
    fn text_skips_scripts_and_keeps_order() {
        let page = parse_page(
            "<html><head><title>T</title><script>var x = 1;</script></head>\
             <body><p>first <b>second</b></p><style>p{}</style><div>third</div></body></html>",
            &base(),
        );
        assert_eq!(page.text, "T\nfirst\nsecond\nthird");
    }

    #[test]
    fn links_are_resolved_and_filtered() {
        let page = parse_page(
            r#"<body>
                <a href="other.html#top">Other <i>page</i></a>
                <a href="/root">root</a>
                <a href="https://elsewhere.test/x">away</a>
                <a href="mailto:me@site.test">mail</a>
                <a href="javascript:void(0)">js</a>
                <a href="/it's">quoted</a>
                <a name="no-href">anchor</a>
            </body>"#,
            &base(),
        );
        let urls: Vec<&str> = page.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["http://site.test/dir/other.html", "http://site.test/root", "https://elsewhere.test/x"]);
        assert_eq!(page.links[0].text, "Other\npage");
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 2_000;
        let html = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let page = parse_page(&html, &base());
        assert_eq!(page.text, "deep");
    }
}
