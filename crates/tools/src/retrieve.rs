//! Page retrieval tool: fetch a URL and hand its text to the model.

use serde_json::{json, Value};

use acre_domain::emit::UiStream;
use acre_domain::error::{Error, Result};
use acre_domain::ui::UiFragment;

use crate::registry::ResearchTool;

/// Ceiling on content handed back to the model, in characters.
const CONTENT_MAX_CHARS: usize = 20_000;

pub struct RetrieveTool {
    client: reqwest::Client,
}

impl RetrieveTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for RetrieveTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ResearchTool for RetrieveTool {
    fn name(&self) -> &'static str {
        "retrieve"
    }

    fn description(&self) -> &'static str {
        "Fetch the content of a specific web page by URL. Use after search \
         when a result needs to be read in full."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: Value, ui: &UiStream) -> Result<Value> {
        let url_str = arguments
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Other("retrieve: missing url argument".into()))?;

        let url = url::Url::parse(url_str)
            .map_err(|e| Error::Other(format!("retrieve: bad url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Other(format!(
                "retrieve: unsupported scheme {}",
                url.scheme()
            )));
        }

        tracing::debug!(url = %url, "retrieving page");

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http(format!("retrieve upstream HTTP {}", status.as_u16())));
        }

        let html = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        let title = extract_title(&html);
        let content = strip_markup(&html, CONTENT_MAX_CHARS);

        ui.append(UiFragment::RetrievedPagePanel {
            url: url.to_string(),
            title: title.clone(),
        })?;

        Ok(json!({"url": url.to_string(), "title": title, "content": content}))
    }
}

/// Case-insensitive search for an ASCII needle. Matching bytewise on the
/// original string keeps every returned offset valid for slicing it, which
/// `to_lowercase` does not guarantee (it can change byte lengths).
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < from + n.len() {
        return None;
    }
    (from..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

fn starts_with_ci(bytes: &[u8], prefix: &str) -> bool {
    let p = prefix.as_bytes();
    bytes.len() >= p.len() && bytes[..p.len()].eq_ignore_ascii_case(p)
}

fn extract_title(html: &str) -> Option<String> {
    let start = find_ci(html, "<title", 0)?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = find_ci(html, "</title>", open_end)?;
    let title = html[open_end..close].trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Crude tag stripper. Good enough for feeding text to a model; this is
/// not a renderer.
fn strip_markup(html: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    let mut skip_depth = 0usize;
    let mut count = 0usize;

    let mut i = 0;
    let bytes = html.as_bytes();
    while i < bytes.len() {
        if !in_tag && bytes[i] == b'<' {
            let rest = &bytes[i..];
            if starts_with_ci(rest, "<script") || starts_with_ci(rest, "<style") {
                skip_depth += 1;
            } else if starts_with_ci(rest, "</script") || starts_with_ci(rest, "</style") {
                skip_depth = skip_depth.saturating_sub(1);
            }
            in_tag = true;
        } else if in_tag && bytes[i] == b'>' {
            in_tag = false;
            // Tags are word boundaries: "<p>a</p><p>b</p>" must not glue
            // a to b. Runs of whitespace collapse below.
            out.push(' ');
        } else if !in_tag && skip_depth == 0 {
            // Advance by full chars, not bytes.
            let ch_start = i;
            let mut ch_end = i + 1;
            while ch_end < bytes.len() && !html.is_char_boundary(ch_end) {
                ch_end += 1;
            }
            out.push_str(&html[ch_start..ch_end]);
            count += 1;
            i = ch_end;
            if count >= max_chars {
                break;
            }
            continue;
        }
        i += 1;
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_extraction_handles_attributes_and_absence() {
        assert_eq!(
            extract_title(r#"<html><title lang="en"> Rent Watch </title></html>"#),
            Some("Rent Watch".to_string())
        );
        assert_eq!(extract_title("<html><body>no title</body></html>"), None);
    }

    #[test]
    fn markup_stripping_drops_tags_and_scripts() {
        let html = "<p>Rates <b>rose</b></p><script>var x = 1;</script><p>again</p>";
        assert_eq!(strip_markup(html, 1000), "Rates rose again");
    }

    #[test]
    fn tags_separate_words_they_sit_between() {
        assert_eq!(strip_markup("<li>one</li><li>two</li>", 1000), "one two");
    }

    #[test]
    fn non_ascii_casing_cannot_desync_offsets() {
        // 'İ' grows from two bytes to three under to_lowercase; offsets
        // found in a lowercased copy would slice mid-char here.
        let html = "<html><TITLE>İstanbul rents</TITLE><p>İzmir data</p></html>";
        assert_eq!(extract_title(html), Some("İstanbul rents".to_string()));
        assert_eq!(strip_markup(html, 1000), "İstanbul rents İzmir data");
    }
}
