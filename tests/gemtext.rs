//! Parses whole documents through the public API.

use gemfetch::gemtext::{self, GemNode};

const DOCUMENT: &str = "\
# Project Gemini

## Overview

Gemini is a new internet protocol which:

* Is heavier than gopher
* Is lighter than the web
> Gemini is not intended to replace either.

=> gemini://geminiprotocol.net/docs/ Documentation
=> https://example.com/screenshot.png Screenshot
=> /history.gmi

```ascii-art
  _____
 /     \\
```
### The end";

#[test]
fn parses_a_document() {
    let nodes = gemtext::parse_str(DOCUMENT);

    let kinds: Vec<&str> = nodes
        .iter()
        .map(|node| match node {
            GemNode::Header { .. } => "header",
            GemNode::Text { .. } => "text",
            GemNode::ListItem { .. } => "list",
            GemNode::Quote { .. } => "quote",
            GemNode::Link { .. } => "link",
            GemNode::CodeBlock { .. } => "code",
        })
        .collect();

    assert_eq!(kinds, [
        "header", "text", "header", "text", "text", "text", "list", "list", "quote", "text", "link", "link", "link",
        "text", "code", "header",
    ]);

    assert_eq!(nodes[11], GemNode::Link {
        uri: "https://example.com/screenshot.png".to_string(),
        alt_text: "Screenshot".to_string(),
        is_external: true,
        is_image: true,
    });
    assert_eq!(nodes[12], GemNode::link("/history.gmi", "/history.gmi"));
    assert_eq!(nodes[14].code_alt_text(), Some("ascii-art"));
    assert_eq!(nodes[15], GemNode::Header { level: 3, text: "The end".to_string() });
}

#[test]
fn rendering_and_parsing_again_gives_the_same_nodes() {
    let nodes = gemtext::parse_str(DOCUMENT);
    let rendered = gemtext::render(&nodes);

    assert_eq!(gemtext::parse(&rendered), nodes);
    assert_eq!(gemtext::render(&gemtext::parse(&rendered)), rendered);
}

#[test]
fn document_starting_with_a_fence() {
    let nodes = gemtext::parse(["```", "a", "```", "b"]);

    assert_eq!(nodes, vec![
        GemNode::CodeBlock { lines: vec!["```".to_string(), "a".to_string(), "```".to_string()] },
        GemNode::Text { text: "b".to_string() },
    ]);
}

#[test]
fn serializes_to_json() {
    let nodes = gemtext::parse(["=> gemini://x.y/ Home"]);
    let json = serde_json::to_value(&nodes).unwrap();

    assert_eq!(json, serde_json::json!([{
        "type": "link",
        "uri": "gemini://x.y/",
        "alt_text": "Home",
        "is_external": false,
        "is_image": false,
    }]));
}
