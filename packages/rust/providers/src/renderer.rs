//! Plain HTTP page renderer with readable-text extraction.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Node, Selector};
use tracing::debug;
use url::Url;

use briefwire_shared::{BriefwireError, Result};

use crate::PageRenderer;

const USER_AGENT: &str = concat!("briefwire/", env!("CARGO_PKG_VERSION"));

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "svg",
];

/// Fetches pages over HTTP and reduces them to readable text.
#[derive(Debug, Clone)]
pub struct HttpPageRenderer {
    client: Client,
}

impl HttpPageRenderer {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| BriefwireError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        let url = Url::parse(url)
            .map_err(|e| BriefwireError::validation(format!("invalid source URL '{url}': {e}")))?;
        debug!(%url, "rendering page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| BriefwireError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BriefwireError::Provider {
                status: status.as_u16(),
                message: format!("{url}: HTTP {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| BriefwireError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(extract_text(&body))
    }
}

/// Readable text of an HTML document, one block per line.
///
/// Prefers `<main>`, then `<article>`, then `[role=main]`, then `<body>`;
/// navigation, scripts and similar chrome are skipped.
pub fn extract_text(html: &str) -> String {
    static ROOT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
        ["main", "article", r#"[role="main"]"#, "body"]
            .iter()
            .map(|s| Selector::parse(s).expect("valid selector"))
            .collect()
    });

    let doc = Html::parse_document(html);
    let Some(root) = ROOT_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next())
    else {
        return String::new();
    };

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if skipped {
            continue;
        }
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}
