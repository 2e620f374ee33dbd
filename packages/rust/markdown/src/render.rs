//! Markdown → HTML rendering for record fields.
//!
//! Raw HTML in the source is escaped rather than passed through, bare URLs
//! (scheme, `www.`, bare domains, email addresses) become links, and single
//! newlines stay soft breaks.

use std::sync::LazyLock;

use pulldown_cmark::{
    CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream, html,
};
use regex::Regex;

/// Generic top-level domains accepted for bare domains without a scheme.
const GENERIC_TLDS: &str =
    "biz|com|edu|gov|net|org|pro|web|xxx|aero|asia|coop|info|museum|name|shop";

/// Two-letter country-code top-level domains.
const COUNTRY_TLDS: &str = "a[cdefgilmnoqrstuwxz]|b[abdefghijmnorstvwyz]|c[acdfghiklmnoruvwxyz]|\
d[ejkmoz]|e[cegrstu]|f[ijkmor]|g[abdefghilmnpqrstuwy]|h[kmnrtu]|i[delmnoqrst]|j[emop]|\
k[eghimnprwyz]|l[abcikrstuvy]|m[acdeghklmnopqrstuvwxyz]|n[acefgilopruz]|om|\
p[aefghklmnrstwy]|qa|r[eosuw]|s[abcdeghijklmnortuvxyz]|t[cdfghjklmnortvwz]|u[agksyz]|\
v[aceginu]|w[fs]|y[et]|z[amw]";

/// Bare link, not ending in trailing punctuation. Alternatives in order:
/// scheme URL, email address, `www.` host, bare domain with a known TLD.
static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    let tail = r#"[^\s<>]*[^\s<>.,;:!?'")\]]"#;
    let label = r"[a-z0-9](?:[a-z0-9-]*[a-z0-9])?";
    let pattern = format!(
        r"(?i)\b(?:https?://{tail}|[\w.+-]+@(?:{label}\.)+[a-z]{{2,}}\b|www\.{tail}|(?:{label}\.)+(?:{GENERIC_TLDS}|{COUNTRY_TLDS})\b(?:[/?#]{tail})?)"
    );
    Regex::new(&pattern).expect("bare url regex")
});

/// Render markdown to an HTML fragment. Never fails; `""` renders to `""`.
pub fn render_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = TextMergeStream::new(Parser::new_ext(markdown, options));

    let mut events = Vec::new();
    // Inside a link/image or a code block, text is left alone.
    let mut link_depth = 0usize;
    let mut in_code_block = false;

    for event in parser {
        match event {
            Event::Start(Tag::HtmlBlock) => events.push(Event::Start(Tag::Paragraph)),
            Event::End(TagEnd::HtmlBlock) => {
                // Block lines keep their newline; the last one must not end up inside `<p>`.
                if let Some(Event::Text(last)) = events.last_mut() {
                    if last.ends_with('\n') {
                        *last = last.trim_end_matches('\n').to_string().into();
                    }
                }
                events.push(Event::End(TagEnd::Paragraph));
            }
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. })) => {
                link_depth += 1;
                events.push(Event::Start(tag));
            }
            Event::End(tag @ (TagEnd::Link | TagEnd::Image)) => {
                link_depth = link_depth.saturating_sub(1);
                events.push(Event::End(tag));
            }
            Event::Start(tag @ Tag::CodeBlock(_)) => {
                in_code_block = true;
                events.push(Event::Start(tag));
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                events.push(Event::End(TagEnd::CodeBlock));
            }
            Event::Text(text) if link_depth == 0 && !in_code_block => {
                linkify(text, &mut events);
            }
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// Link target for a matched bare link.
fn href_for(shown: &str) -> String {
    let lower = shown.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        shown.to_string()
    } else if shown.contains('@') {
        format!("mailto:{shown}")
    } else {
        format!("http://{shown}")
    }
}

/// Split `text` around bare URLs, wrapping each in an autolink.
fn linkify<'a>(text: CowStr<'a>, out: &mut Vec<Event<'a>>) {
    let spans: Vec<(usize, usize)> = BARE_URL_RE
        .find_iter(&text)
        .map(|m| (m.start(), m.end()))
        .collect();

    if spans.is_empty() {
        out.push(Event::Text(text));
        return;
    }

    let mut last = 0;
    for (start, end) in spans {
        if start > last {
            out.push(Event::Text(text[last..start].to_string().into()));
        }
        let shown = &text[start..end];
        out.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: href_for(shown).into(),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }));
        out.push(Event::Text(shown.to_string().into()));
        out.push(Event::End(TagEnd::Link));
        last = end;
    }
    if last < text.len() {
        out.push(Event::Text(text[last..].to_string().into()));
    }
}
