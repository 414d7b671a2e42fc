//! Markup stripping for message bodies
//!
//! Message content is stored as HTML fragments. Only the text survives:
//! tags and comments are removed, character references are decoded.

use std::sync::OnceLock;

use regex::{Captures, Regex};

fn comment_re() -> &'static Regex {
    static COMMENT_RE: OnceLock<Regex> = OnceLock::new();
    COMMENT_RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"))
}

fn tag_re() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| {
        Regex::new(r#"</?[A-Za-z!][^>"']*(?:(?:"[^"]*"|'[^']*')[^>"']*)*>"#)
            .expect("valid tag regex")
    })
}

fn entity_re() -> &'static Regex {
    static ENTITY_RE: OnceLock<Regex> = OnceLock::new();
    ENTITY_RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]{2,8});")
            .expect("valid entity regex")
    })
}

/// Text content of an HTML fragment.
pub fn strip_markup(html: &str) -> String {
    let without_comments = comment_re().replace_all(html, "");
    let text = tag_re().replace_all(&without_comments, "");
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    entity_re()
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            decode_entity(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        _ => return None,
    };
    Some(decoded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags() {
        assert_eq!(strip_markup("<div>hi</div>"), "hi");
        assert_eq!(
            strip_markup(r#"<p>see <a href="https://x.test/?a=1&amp;b=2">link</a></p>"#),
            "see link"
        );
    }

    #[test]
    fn test_decodes_entities() {
        assert_eq!(strip_markup("a &lt;b&gt; &amp; &quot;c&quot;"), "a <b> & \"c\"");
        assert_eq!(strip_markup("&#39;x&#x27;"), "'x'");
        assert_eq!(strip_markup("1&nbsp;2"), "1\u{a0}2");
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(strip_markup("&bogus; &#xFFFFFF;"), "&bogus; &#xFFFFFF;");
    }

    #[test]
    fn test_comments_and_plain_text() {
        assert_eq!(strip_markup("a<!-- hidden <b> -->b"), "ab");
        assert_eq!(strip_markup("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
    }

    #[test]
    fn test_quoted_angle_bracket_in_attribute() {
        assert_eq!(strip_markup(r#"<img alt="a > b">done"#), "done");
    }
}
