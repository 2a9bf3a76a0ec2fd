//! Minimal XML scanner for package descriptors
//!
//! Descriptors only need the text of a handful of leaf elements, so this
//! walks tags and records leaf text by slash-separated element path.
//! Namespace prefixes are dropped and attributes are ignored.

use crate::error::{Result, SyncError};

/// Collect `(path, text)` pairs for every element that carries text
pub fn leaf_texts(xml: &str) -> Result<Vec<(String, String)>> {
    let mut stack: Vec<String> = Vec::new();
    let mut texts = Vec::new();
    let mut text = String::new();
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        rest = &rest[start..];

        if let Some(body) = rest.strip_prefix("<!--") {
            rest = skip_past(body, "-->")?;
            continue;
        }
        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").ok_or_else(|| malformed("unterminated CDATA"))?;
            text.push_str(&body[..end]);
            rest = &body[end + 3..];
            continue;
        }
        if rest.starts_with("<?") || rest.starts_with("<!") {
            rest = skip_past(rest, ">")?;
            continue;
        }

        let end = rest.find('>').ok_or_else(|| malformed("unterminated tag"))?;
        let tag = &rest[1..end];
        rest = &rest[end + 1..];

        if let Some(name) = tag.strip_prefix('/') {
            let name = local_name(name.trim());
            match stack.last() {
                Some(open) if *open == name => {}
                _ => return Err(malformed(&format!("unexpected closing tag </{}>", name))),
            }
            let value = decode_entities(text.trim());
            if !value.is_empty() {
                texts.push((stack.join("/"), value));
            }
            stack.pop();
            text.clear();
        } else {
            let self_closing = tag.ends_with('/');
            let name = tag
                .trim_end_matches('/')
                .split_whitespace()
                .next()
                .map(local_name)
                .ok_or_else(|| malformed("empty tag"))?;
            if !self_closing {
                stack.push(name);
            }
            text.clear();
        }
    }

    if !stack.is_empty() {
        return Err(malformed(&format!("unclosed element <{}>", stack.join("/"))));
    }
    Ok(texts)
}

/// Text of the first element at `path`
pub fn element_text(texts: &[(String, String)], path: &str) -> Option<String> {
    texts
        .iter()
        .find(|(p, _)| p == path)
        .map(|(_, value)| value.clone())
}

fn skip_past<'a>(input: &'a str, terminator: &str) -> Result<&'a str> {
    input
        .find(terminator)
        .map(|idx| &input[idx + terminator.len()..])
        .ok_or_else(|| malformed("unterminated markup"))
}

fn local_name(name: &str) -> String {
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.to_string(),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn malformed(detail: &str) -> SyncError {
    SyncError::Descriptor(format!("malformed XML: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_leaf_text_by_path() {
        let xml = r#"<?xml version="1.0"?>
<!-- build descriptor -->
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <parent><groupId>com.acme</groupId><version>2.0</version></parent>
  <artifactId>core</artifactId>
  <packaging/>
  <description><![CDATA[a & b]]></description>
</project>"#;
        let texts = leaf_texts(xml).unwrap();
        assert_eq!(element_text(&texts, "project/parent/groupId").as_deref(), Some("com.acme"));
        assert_eq!(element_text(&texts, "project/artifactId").as_deref(), Some("core"));
        assert_eq!(element_text(&texts, "project/groupId"), None);
        assert_eq!(element_text(&texts, "project/description").as_deref(), Some("a & b"));
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        assert!(leaf_texts("<a><b></a></b>").is_err());
        assert!(leaf_texts("<a>").is_err());
    }
}
