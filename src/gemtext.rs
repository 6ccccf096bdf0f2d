//! Gemtext, the line-oriented markup of `text/gemini` documents.
//!
//! [`parse`] turns the lines of a document into a flat list of [`GemNode`]s, one per line,
//! except for preformatted blocks which become a single [`GemNode::CodeBlock`].
//! Parsing never fails: a line that is nothing else is [`GemNode::Text`].

use crate::url;
use serde::{Deserialize, Serialize};

/// Opens and closes a preformatted block.
pub const FENCE: &str = "```";

const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpeg", ".jpg"];

/// One semantic unit of a Gemtext document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GemNode {
    /// A heading, `#` to `###`.
    Header {
        /// 1, 2 or 3.
        level: u8,
        /// The heading text.
        text: String,
    },
    /// A plain line.
    Text {
        /// The line, verbatim.
        text: String,
    },
    /// A `*` list item.
    ListItem {
        /// The item text.
        text: String,
    },
    /// A `>` quote line.
    Quote {
        /// The quoted text.
        text: String,
    },
    /// A `=>` link line.
    Link {
        /// The link target, possibly relative.
        uri: String,
        /// The text to show. The URI itself if the line has no label.
        alt_text: String,
        /// Whether the target has a scheme other than `gemini`. Schemes are case-insensitive,
        /// so `GEMINI://host/` is not external.
        is_external: bool,
        /// Whether the target path looks like a PNG or JPEG image.
        is_image: bool,
    },
    /// A preformatted block, including its fence lines.
    CodeBlock {
        /// The raw lines, starting with the opening fence.
        lines: Vec<String>,
    },
}

fn is_external(uri: &str) -> bool {
    url::is_well_formed(uri)
        && url::scheme_of(uri).is_some_and(|scheme| !scheme.eq_ignore_ascii_case("gemini"))
}

fn is_image(uri: &str) -> bool {
    let path = uri.split(['?', '#']).next().unwrap_or_default();

    IMAGE_EXTENSIONS.iter().any(|extension| path.ends_with(extension))
}

impl GemNode {
    /// A link node, working out whether it is external and whether it is an image.
    pub fn link(uri: impl Into<String>, alt_text: impl Into<String>) -> Self {
        let uri = uri.into();

        Self::Link {
            is_external: is_external(&uri),
            is_image: is_image(&uri),
            alt_text: alt_text.into(),
            uri,
        }
    }

    /// Classify a single line outside of a preformatted block.
    pub fn from_line(line: &str) -> Self {
        if let Some(rest) = line.strip_prefix('*') {
            Self::ListItem { text: rest.trim_start().to_string() }
        } else if let Some(rest) = line.strip_prefix('>') {
            Self::Quote { text: rest.trim_start().to_string() }
        } else if let Some(rest) = line.strip_prefix("=>") {
            let rest = rest.trim_start();

            match rest.find(char::is_whitespace) {
                Some(split) => {
                    let (uri, alt_text) = rest.split_at(split);
                    Self::link(uri, alt_text.trim_start())
                }
                None => Self::link(rest, rest),
            }
        } else if line.starts_with('#') {
            let level = if line.starts_with("###") {
                3
            } else if line.starts_with("##") {
                2
            } else {
                1
            };

            Self::Header { level, text: line[usize::from(level)..].trim_start().to_string() }
        } else {
            Self::Text { text: line.to_string() }
        }
    }

    /// The text after the opening fence of a code block, if there is any.
    pub fn code_alt_text(&self) -> Option<&str> {
        match self {
            Self::CodeBlock { lines } => lines
                .first()
                .and_then(|fence| fence.strip_prefix(FENCE))
                .map(str::trim)
                .filter(|alt| !alt.is_empty()),
            _ => None,
        }
    }

    /// The Gemtext lines this node is written as.
    pub fn to_lines(&self) -> Vec<String> {
        let line = match self {
            Self::Header { level, text } => format!("{} {text}", "#".repeat(usize::from(*level))),
            Self::Text { text } => text.clone(),
            Self::ListItem { text } => format!("* {text}"),
            Self::Quote { text } => format!("> {text}"),
            Self::Link { uri, alt_text, .. } if uri == alt_text => format!("=> {uri}"),
            Self::Link { uri, alt_text, .. } => format!("=> {uri} {alt_text}"),
            Self::CodeBlock { lines } => return lines.clone(),
        };

        vec![line]
    }
}

#[derive(Debug)]
struct Segment {
    code: bool,
    lines: Vec<String>,
}

// Both fences of a block belong to the block. An unclosed fence runs to the end.
fn segments<I, S>(lines: I) -> Vec<Segment>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut segments: Vec<Segment> = Vec::new();
    let mut in_code = false;

    for line in lines {
        let line = line.as_ref();

        if line.starts_with(FENCE) {
            if in_code {
                if let Some(segment) = segments.last_mut() {
                    segment.lines.push(line.to_string());
                }
            } else {
                segments.push(Segment { code: true, lines: vec![line.to_string()] });
            }

            in_code = !in_code;
            continue;
        }

        match segments.last_mut() {
            Some(segment) if segment.code == in_code => segment.lines.push(line.to_string()),
            _ => segments.push(Segment { code: in_code, lines: vec![line.to_string()] }),
        }
    }

    segments
}

/// Parse the lines of a Gemtext document.
pub fn parse<I, S>(lines: I) -> Vec<GemNode>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments(lines)
        .into_iter()
        .flat_map(|segment| {
            if segment.code {
                vec![GemNode::CodeBlock { lines: segment.lines }]
            } else {
                segment.lines.iter().map(|line| GemNode::from_line(line)).collect()
            }
        })
        .collect()
}

/// Parse a whole Gemtext document. Both `\n` and `\r\n` line endings are accepted.
pub fn parse_str(text: &str) -> Vec<GemNode> {
    parse(text.lines())
}

/// Write nodes back out as Gemtext lines. Parsing the result gives the same nodes back,
/// although the text may differ from the input (spacing after markers, for instance).
pub fn render(nodes: &[GemNode]) -> Vec<String> {
    nodes.iter().flat_map(GemNode::to_lines).collect()
}

/// Serialize nodes as a pretty-printed JSON array, each node tagged with its `type`.
pub fn to_json(nodes: &[GemNode]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(text: &str) -> GemNode {
        GemNode::Text { text: text.to_string() }
    }

    fn code(lines: &[&str]) -> GemNode {
        GemNode::CodeBlock { lines: lines.iter().map(|line| line.to_string()).collect() }
    }

    #[test]
    fn document() {
        let nodes = parse([
            "# Title",
            "plain",
            "* item",
            "> quote",
            "=> gemini://x.y/ Link text",
            "```",
            "code line",
            "```",
        ]);

        assert_eq!(nodes, vec![
            GemNode::Header { level: 1, text: "Title".to_string() },
            text("plain"),
            GemNode::ListItem { text: "item".to_string() },
            GemNode::Quote { text: "quote".to_string() },
            GemNode::Link {
                uri: "gemini://x.y/".to_string(),
                alt_text: "Link text".to_string(),
                is_external: false,
                is_image: false,
            },
            code(&["```", "code line", "```"]),
        ]);
    }

    #[test]
    fn empty_document() {
        assert!(parse(Vec::<String>::new()).is_empty());
        assert!(parse_str("").is_empty());
    }

    #[test]
    fn headers() {
        assert_eq!(GemNode::from_line("###  Deep"), GemNode::Header { level: 3, text: "Deep".to_string() });
        assert_eq!(GemNode::from_line("##Middle"), GemNode::Header { level: 2, text: "Middle".to_string() });
        assert_eq!(GemNode::from_line("#"), GemNode::Header { level: 1, text: String::new() });
        assert_eq!(GemNode::from_line("#### Four"), GemNode::Header { level: 3, text: "# Four".to_string() });
    }

    #[test]
    fn markers_need_to_be_at_the_start() {
        assert_eq!(GemNode::from_line(" * not a list"), text(" * not a list"));
        assert_eq!(GemNode::from_line("a > b"), text("a > b"));
        assert_eq!(GemNode::from_line("= > nope"), text("= > nope"));
        assert_eq!(GemNode::from_line(""), text(""));
    }

    #[test]
    fn list_and_quote_trim_leading_space_only() {
        assert_eq!(GemNode::from_line("*\titem  "), GemNode::ListItem { text: "item  ".to_string() });
        assert_eq!(GemNode::from_line(">"), GemNode::Quote { text: String::new() });
        assert_eq!(GemNode::from_line("**bold**"), GemNode::ListItem { text: "*bold**".to_string() });
    }

    #[test]
    fn external_image_link() {
        assert_eq!(GemNode::from_line("=> https://example.com/a.png"), GemNode::Link {
            uri: "https://example.com/a.png".to_string(),
            alt_text: "https://example.com/a.png".to_string(),
            is_external: true,
            is_image: true,
        });
    }

    #[test]
    fn gemini_link() {
        assert_eq!(GemNode::from_line("=> gemini://site/page"), GemNode::Link {
            uri: "gemini://site/page".to_string(),
            alt_text: "gemini://site/page".to_string(),
            is_external: false,
            is_image: false,
        });
    }

    #[test]
    fn relative_links_are_internal() {
        let GemNode::Link { is_external, is_image, .. } = GemNode::from_line("=>/images/cat.jpg A cat") else {
            panic!("expected a link");
        };
        assert!(!is_external);
        assert!(is_image);
    }

    #[test]
    fn link_alt_text() {
        let alt = |line: &str| match GemNode::from_line(line) {
            GemNode::Link { alt_text, .. } => alt_text,
            other => panic!("expected a link, got {other:?}"),
        };

        assert_eq!(alt("=> gemini://a/ \t spaced  label"), "spaced  label");
        assert_eq!(alt("=> gemini://a/   "), "");
        assert_eq!(alt("=>gemini://a/"), "gemini://a/");
        assert_eq!(alt("=>"), "");
    }

    #[test]
    fn link_flags() {
        assert!(GemNode::link("mailto:someone@example.org", "").eq(&GemNode::Link {
            uri: "mailto:someone@example.org".to_string(),
            alt_text: String::new(),
            is_external: true,
            is_image: false,
        }));

        let flags = |uri: &str| match GemNode::link(uri, uri) {
            GemNode::Link { is_external, is_image, .. } => (is_external, is_image),
            _ => unreachable!(),
        };

        assert_eq!(flags("GEMINI://site/"), (false, false));
        assert_eq!(flags("https://example.com/photo.jpeg?size=large"), (true, true));
        assert_eq!(flags("https://example.com/photo.png.html"), (true, false));
        assert_eq!(flags("ht<tp://broken"), (false, false));
        assert_eq!(flags("page.gmi"), (false, false));
    }

    #[test]
    fn code_block_keeps_raw_lines() {
        let nodes = parse(["```rust", "# not a header", "=> not a link", "```", "after"]);

        assert_eq!(nodes, vec![code(&["```rust", "# not a header", "=> not a link", "```"]), text("after")]);
        assert_eq!(nodes[0].code_alt_text(), Some("rust"));
    }

    #[test]
    fn unclosed_fence_runs_to_the_end() {
        let nodes = parse(["intro", "```", "one", "", "# two"]);

        assert_eq!(nodes, vec![text("intro"), code(&["```", "one", "", "# two"])]);
        assert_eq!(nodes[1].code_alt_text(), None);
    }

    #[test]
    fn adjacent_code_blocks() {
        let nodes = parse(["```", "a", "```", "```", "b", "```"]);

        assert_eq!(nodes, vec![code(&["```", "a", "```"]), code(&["```", "b", "```"])]);
    }

    #[test]
    fn empty_code_block() {
        assert_eq!(parse(["```", "```"]), vec![code(&["```", "```"])]);
    }

    #[test]
    fn crlf_documents() {
        assert_eq!(parse_str("# A\r\nb\r\n"), vec![GemNode::Header { level: 1, text: "A".to_string() }, text("b")]);
    }

    #[test]
    fn render_round_trip() {
        let nodes = parse([
            "#Title",
            "##  Sub",
            "plain",
            "*item",
            ">quote",
            "=>gemini://x.y/",
            "=> gemini://x.y/a  Label",
            "=> https://x.y/ ",
            "```",
            "code",
        ]);

        assert_eq!(parse(render(&nodes)), nodes);
    }

    #[test]
    fn json() {
        let node = GemNode::Header { level: 2, text: "Hi".to_string() };
        let json = serde_json::to_string(&node).unwrap();

        assert_eq!(json, r#"{"type":"header","level":2,"text":"Hi"}"#);
        assert_eq!(serde_json::from_str::<GemNode>(&json).unwrap(), node);
    }

    #[test]
    fn json_document() {
        let json = to_json(&parse(["# Hi", "=> gemini://x.y/"])).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["type"], "header");
        assert_eq!(value[1]["type"], "link");
        assert_eq!(value[1]["alt_text"], "gemini://x.y/");
    }
}
