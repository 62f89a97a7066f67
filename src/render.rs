//! Markdown rendering for assistant replies
//!
//! Replies are rendered server-side so the page can insert them as HTML.
//! Raw HTML in the model output is escaped, never passed through.

use pulldown_cmark::{html, Event, Options, Parser};

pub fn markdown_to_html(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(content, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut output = String::new();
    html::push_html(&mut output, parser);
    output
}
