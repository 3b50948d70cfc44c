use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
    string::FromUtf8Error,
};

use lol_html::{
    element,
    errors::{AttributeNameError, RewritingError},
    html_content::{Element, EndTag},
    HandlerResult, HtmlRewriter, Selector, Settings,
};
use thiserror::Error;
use url::Url;

use crate::{config::PageConfig, domain::Domain, matcher::is_blocked};

// hides references to blocked domains inside rendered html

const HIDE_STYLE: &str = "display:none !important";
const HIDDEN_MARKER: &str = "data-blok-hidden";

const GOOGLE_RESULTS: &[&str] = &[
    "div.g",
    "div[data-sokoban-container]",
    "div.MjjYud",
    "div.hlcw0c",
];
const BING_RESULTS: &[&str] = &["li.b_algo", ".b_results > .b_something"];
const YANDEX_RESULTS: &[&str] = &[".serp-item"];
const DUCKDUCKGO_RESULTS: &[&str] = &[".result", ".nrn-react-div"];
const GENERIC_RESULTS: &[&str] = &[
    ".result",
    ".searchResult",
    ".search-result",
    "article",
    ".item",
    ".listing",
    ".entry",
];

#[derive(Debug, Error)]
pub enum PageError {
    #[error("html rewrite failed: {0}")]
    Rewrite(#[from] RewritingError),
    #[error("rewritten page is not utf-8: {0}")]
    Encoding(#[from] FromUtf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Google,
    Bing,
    Yandex,
    DuckDuckGo,
    Generic,
}

impl SearchEngine {
    pub fn detect(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if host.contains("google") {
            SearchEngine::Google
        } else if host.contains("bing") {
            SearchEngine::Bing
        } else if host.contains("yandex") {
            SearchEngine::Yandex
        } else if host.contains("duckduckgo") {
            SearchEngine::DuckDuckGo
        } else {
            SearchEngine::Generic
        }
    }

    pub fn result_selectors(self) -> &'static [&'static str] {
        match self {
            SearchEngine::Google => GOOGLE_RESULTS,
            SearchEngine::Bing => BING_RESULTS,
            SearchEngine::Yandex => YANDEX_RESULTS,
            SearchEngine::DuckDuckGo => DUCKDUCKGO_RESULTS,
            SearchEngine::Generic => GENERIC_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredPage {
    pub html: String,
    pub hidden_results: usize,
    pub blocked_embeds: usize,
    pub removed_scripts: usize,
}

impl FilteredPage {
    pub fn changed(&self) -> bool {
        self.hidden_results + self.blocked_embeds + self.removed_scripts > 0
    }
}

#[derive(Debug, Clone)]
pub struct PageFilter {
    hide_embeds: bool,
    extra_selectors: Vec<String>,
}

impl PageFilter {
    pub fn from_config(config: &PageConfig) -> Self {
        let extra_selectors = config
            .extra_result_selectors
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| match s.parse::<Selector>() {
                Ok(_) if !s.is_empty() => true,
                _ => {
                    tracing::warn!(selector = %s, "ignoring invalid result selector");
                    false
                }
            })
            .collect();

        Self {
            hide_embeds: config.hide_embeds,
            extra_selectors,
        }
    }

    fn result_selectors(&self, engine: SearchEngine) -> Vec<String> {
        let mut selectors: Vec<String> = engine
            .result_selectors()
            .iter()
            .map(|s| s.to_string())
            .collect();
        selectors.extend(self.extra_selectors.iter().cloned());
        selectors.dedup();
        selectors
    }

    /// Rewrites `html` served from `page_url`, hiding result containers that
    /// link to blocked domains and neutralising embedded content from them.
    ///
    /// Running the filter on its own output changes nothing further.
    pub fn filter_html(
        &self,
        blocked: &[Domain],
        page_url: &str,
        html: &str,
    ) -> Result<FilteredPage, PageError> {
        let unchanged = FilteredPage {
            html: html.to_string(),
            hidden_results: 0,
            blocked_embeds: 0,
            removed_scripts: 0,
        };
        if blocked.is_empty() {
            return Ok(unchanged);
        }

        let base = Url::parse(page_url).ok();
        let engine = base
            .as_ref()
            .and_then(|url| url.host_str())
            .map(SearchEngine::detect)
            .unwrap_or(SearchEngine::Generic);
        let selectors = self.result_selectors(engine);

        let flagged = locate_blocked_results(&selectors, blocked, base.as_ref(), html)?;

        let hidden_results = Cell::new(0usize);
        let blocked_embeds = Cell::new(0usize);
        let removed_scripts = Cell::new(0usize);
        let seen: Vec<Cell<usize>> = selectors.iter().map(|_| Cell::new(0)).collect();

        let mut handlers = Vec::new();
        for (index, selector) in selectors.iter().enumerate() {
            let flagged = &flagged;
            let seen = &seen[index];
            let hidden_results = &hidden_results;
            handlers.push(element!(selector.as_str(), move |el| {
                let ordinal = seen.get();
                seen.set(ordinal + 1);
                if flagged.contains(&(index, ordinal)) && hide(el)? {
                    hidden_results.set(hidden_results.get() + 1);
                }
                Ok(())
            }));
        }

        if self.hide_embeds {
            let check = |raw: &str| is_blocked(blocked, &resolve(base.as_ref(), raw));
            let blocked_embeds = &blocked_embeds;

            for (selector, attribute, replacement) in [
                ("iframe[src]", "src", "about:blank"),
                ("object[data]", "data", ""),
                ("embed[src]", "src", ""),
                ("img[src]", "src", ""),
                ("video[src]", "src", ""),
                ("audio[src]", "src", ""),
            ] {
                handlers.push(element!(selector, move |el| {
                    let Some(source) = el.get_attribute(attribute) else {
                        return Ok(());
                    };
                    if source == replacement || !check(&source) {
                        return Ok(());
                    }
                    tracing::debug!(element = selector, source = %source, "blocked embedded content");
                    el.set_attribute(attribute, replacement)?;
                    hide(el)?;
                    blocked_embeds.set(blocked_embeds.get() + 1);
                    Ok(())
                }));
            }

            let removed_scripts = &removed_scripts;
            handlers.push(element!("script[src]", move |el| {
                if let Some(source) = el.get_attribute("src") {
                    if check(&source) {
                        tracing::debug!(source = %source, "removed script");
                        el.remove();
                        removed_scripts.set(removed_scripts.get() + 1);
                    }
                }
                Ok(())
            }));
        }

        let mut output = Vec::with_capacity(html.len());
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |chunk: &[u8]| output.extend_from_slice(chunk),
        );
        rewriter.write(html.as_bytes())?;
        rewriter.end()?;

        let page = FilteredPage {
            html: String::from_utf8(output)?,
            hidden_results: hidden_results.get(),
            blocked_embeds: blocked_embeds.get(),
            removed_scripts: removed_scripts.get(),
        };
        if page.changed() {
            tracing::info!(
                page = %page_url,
                hidden = page.hidden_results,
                embeds = page.blocked_embeds,
                scripts = page.removed_scripts,
                "filtered page"
            );
        }
        Ok(page)
    }
}

impl Default for PageFilter {
    fn default() -> Self {
        Self::from_config(&PageConfig::default())
    }
}

#[derive(Default)]
struct ResultScan {
    // per selector: ordinals of containers currently open
    open: Vec<Vec<usize>>,
    seen: Vec<usize>,
    flagged: HashSet<(usize, usize)>,
}

/// First pass: numbers every result container per selector and records
/// which ones enclose a link to a blocked domain.
fn locate_blocked_results(
    selectors: &[String],
    blocked: &[Domain],
    base: Option<&Url>,
    html: &str,
) -> Result<HashSet<(usize, usize)>, PageError> {
    let scan = Rc::new(RefCell::new(ResultScan {
        open: vec![Vec::new(); selectors.len()],
        seen: vec![0; selectors.len()],
        flagged: HashSet::new(),
    }));

    let mut handlers = Vec::new();
    for (index, selector) in selectors.iter().enumerate() {
        let container_scan = scan.clone();
        handlers.push(element!(selector.as_str(), move |el| {
            let ordinal = {
                let mut scan = container_scan.borrow_mut();
                let ordinal = scan.seen[index];
                scan.seen[index] += 1;
                scan.open[index].push(ordinal);
                ordinal
            };
            let closing = container_scan.clone();
            match el.end_tag_handlers() {
                Some(end_handlers) => end_handlers.push(Box::new(move |_end: &mut EndTag| -> HandlerResult {
                    closing.borrow_mut().open[index].pop();
                    Ok(())
                })),
                None => {
                    closing.borrow_mut().open[index].retain(|open| *open != ordinal);
                }
            }
            Ok(())
        }));

        let link_scan = scan.clone();
        let link_selector = format!("{selector} a[href]");
        handlers.push(element!(link_selector.as_str(), move |el| {
            let Some(href) = el.get_attribute("href") else {
                return Ok(());
            };
            if href.trim_start().to_ascii_lowercase().starts_with("javascript:") {
                return Ok(());
            }
            if is_blocked(blocked, &resolve(base, &href)) {
                // every enclosing container of this selector holds the link
                let mut scan = link_scan.borrow_mut();
                let open = scan.open[index].clone();
                scan.flagged.extend(open.into_iter().map(|container| (index, container)));
            }
            Ok(())
        }));
    }

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |_: &[u8]| {},
    );
    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    let flagged = std::mem::take(&mut scan.borrow_mut().flagged);
    Ok(flagged)
}

fn resolve(base: Option<&Url>, raw: &str) -> String {
    let raw = raw.trim();
    base.and_then(|base| base.join(raw).ok())
        .map(String::from)
        .unwrap_or_else(|| raw.to_string())
}

fn hide(el: &mut Element) -> Result<bool, AttributeNameError> {
    if el.has_attribute(HIDDEN_MARKER) {
        return Ok(false);
    }
    let style = match el.get_attribute("style") {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{}; {HIDE_STYLE}", existing.trim().trim_end_matches(';'))
        }
        _ => HIDE_STYLE.to_string(),
    };
    el.set_attribute("style", &style)?;
    el.set_attribute(HIDDEN_MARKER, "")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> Vec<Domain> {
        list.iter().map(|d| Domain::parse(d).unwrap()).collect()
    }

    #[test]
    fn detects_search_engines_by_host() {
        assert_eq!(SearchEngine::detect("www.google.com"), SearchEngine::Google);
        assert_eq!(SearchEngine::detect("www.bing.com"), SearchEngine::Bing);
        assert_eq!(SearchEngine::detect("yandex.ru"), SearchEngine::Yandex);
        assert_eq!(SearchEngine::detect("duckduckgo.com"), SearchEngine::DuckDuckGo);
        assert_eq!(SearchEngine::detect("news.example.org"), SearchEngine::Generic);
    }

    #[test]
    fn empty_block_list_leaves_page_alone() {
        let html = "<div class=\"g\"><a href=\"https://example.com\">x</a></div>";
        let page = PageFilter::default()
            .filter_html(&[], "https://www.google.com/search?q=x", html)
            .unwrap();
        assert_eq!(page.html, html);
        assert!(!page.changed());
    }

    #[test]
    fn hides_only_the_matching_google_result() {
        let html = concat!(
            "<div id=\"search\">",
            "<div class=\"g\"><h3><a href=\"https://news.example.com/story\">Story</a></h3></div>",
            "<div class=\"g\"><h3><a href=\"https://other.org/\">Other</a></h3></div>",
            "</div>"
        );
        let page = PageFilter::default()
            .filter_html(&domains(&["example.com"]), "https://www.google.com/search?q=x", html)
            .unwrap();

        assert_eq!(page.hidden_results, 1);
        assert!(page.html.contains(
            "<div class=\"g\" style=\"display:none !important\" data-blok-hidden=\"\"><h3><a href=\"https://news.example.com/story\">"
        ));
        assert!(page.html.contains("<div class=\"g\"><h3><a href=\"https://other.org/\">"));
    }

    #[test]
    fn nested_containers_flag_the_enclosing_one() {
        let html = concat!(
            "<article id=\"outer\"><article id=\"inner\"><a href=\"/ok\">ok</a></article>",
            "<a href=\"https://tracker.net/\">bad</a></article>"
        );
        let page = PageFilter::default()
            .filter_html(&domains(&["tracker.net"]), "https://blog.test/", html)
            .unwrap();
        assert_eq!(page.hidden_results, 1);
        assert!(page.html.contains("<article id=\"outer\" style="));
        assert!(page.html.contains("<article id=\"inner\"><a"));
    }

    #[test]
    fn link_in_inner_container_hides_every_enclosing_one() {
        let html = concat!(
            "<article id=\"outer\"><h2>Roundup</h2>",
            "<article id=\"inner\"><a href=\"https://tracker.net/x\">bad</a></article>",
            "<p>more</p></article>",
            "<article id=\"other\"><a href=\"/fine\">fine</a></article>"
        );
        let page = PageFilter::default()
            .filter_html(&domains(&["tracker.net"]), "https://blog.test/", html)
            .unwrap();
        assert_eq!(page.hidden_results, 2);
        assert!(page.html.contains("<article id=\"outer\" style=\"display:none !important\""));
        assert!(page.html.contains("<article id=\"inner\" style=\"display:none !important\""));
        assert!(page.html.contains("<article id=\"other\"><a"));
    }

    #[test]
    fn javascript_links_are_ignored() {
        let html = "<li class=\"b_algo\"><a href=\"javascript:go('example.com')\">x</a></li>";
        let page = PageFilter::default()
            .filter_html(&domains(&["example.com"]), "https://www.bing.com/search", html)
            .unwrap();
        assert_eq!(page.hidden_results, 0);
    }

    #[test]
    fn neutralises_embeds_and_scripts() {
        let html = concat!(
            "<iframe src=\"https://player.example.com/embed\"></iframe>",
            "<img src=\"//cdn.example.com/pixel.gif\">",
            "<img src=\"/local.png\">",
            "<script src=\"https://example.com/track.js\"></script>",
            "<video src=\"https://example.com/v.mp4\" style=\"width:100%;\"></video>"
        );
        let page = PageFilter::default()
            .filter_html(&domains(&["example.com"]), "https://blog.test/post", html)
            .unwrap();

        assert_eq!(page.blocked_embeds, 3);
        assert_eq!(page.removed_scripts, 1);
        assert!(page.html.contains("<iframe src=\"about:blank\" style=\"display:none !important\""));
        assert!(page.html.contains("<img src=\"/local.png\">"));
        assert!(page.html.contains("style=\"width:100%; display:none !important\""));
        assert!(!page.html.contains("track.js"));
    }

    #[test]
    fn embeds_can_be_left_untouched() {
        let config = PageConfig {
            hide_embeds: false,
            ..PageConfig::default()
        };
        let html = "<img src=\"https://example.com/a.png\">";
        let page = PageFilter::from_config(&config)
            .filter_html(&domains(&["example.com"]), "https://blog.test/", html)
            .unwrap();
        assert_eq!(page.html, html);
    }

    #[test]
    fn filtering_is_idempotent() {
        let html = concat!(
            "<div class=\"result\"><a href=\"https://example.com/\">r</a></div>",
            "<iframe src=\"https://example.com/\"></iframe>"
        );
        let filter = PageFilter::default();
        let blocked = domains(&["example.com"]);
        let once = filter
            .filter_html(&blocked, "https://duckduckgo.com/?q=x", html)
            .unwrap();
        let twice = filter
            .filter_html(&blocked, "https://duckduckgo.com/?q=x", &once.html)
            .unwrap();
        assert_eq!(twice.html, once.html);
        assert!(!twice.changed());
    }

    #[test]
    fn extra_selectors_are_validated() {
        let config = PageConfig {
            extra_result_selectors: vec!["div.card".into(), "div[".into(), " ".into()],
            ..PageConfig::default()
        };
        let filter = PageFilter::from_config(&config);
        assert_eq!(filter.extra_selectors, vec!["div.card".to_string()]);

        let html = "<div class=\"card\"><a href=\"https://example.com\">x</a></div>";
        let page = filter
            .filter_html(&domains(&["example.com"]), "https://portal.test/", html)
            .unwrap();
        assert_eq!(page.hidden_results, 1);
    }
}
