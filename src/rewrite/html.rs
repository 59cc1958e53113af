//! HTML rules: URL-bearing attributes, inline styles and inline scripts.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::rewrite::css::rewrite_css;
use crate::rewrite::script::OriginPattern;
use crate::rewrite::url::{quoted_value, UrlMapper};

static URL_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?P<lead>\b(?:href|src|action|formaction|poster)\s*=\s*)(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#,
    )
    .expect("valid HTML attr regex")
});

static STYLE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?P<lead>\bstyle\s*=\s*)(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
        .expect("valid style attr regex")
});

static STYLE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?P<open><style\b[^>]*>)(?P<body>.*?)(?P<close></style\s*>)")
        .expect("valid style block regex")
});

/// Rewrite an HTML document. `None` when nothing changed.
pub(crate) fn rewrite_html(
    input: &str,
    mapper: &UrlMapper<'_>,
    origins: Option<&OriginPattern>,
) -> Option<String> {
    let mut current: Cow<'_, str> = Cow::Borrowed(input);

    if let Some(next) = rewrite_url_attrs(&current, mapper) {
        current = Cow::Owned(next);
    }
    if let Some(next) = rewrite_style_attrs(&current, mapper) {
        current = Cow::Owned(next);
    }
    if let Some(next) = rewrite_style_blocks(&current, mapper) {
        current = Cow::Owned(next);
    }
    if let Some(origins) = origins {
        if let Some(next) = origins.replace(&current, mapper.local_origin, mapper.mount.as_str()) {
            current = Cow::Owned(next);
        }
    }

    match current {
        Cow::Borrowed(_) => None,
        Cow::Owned(text) => Some(text),
    }
}

fn rewrite_url_attrs(input: &str, mapper: &UrlMapper<'_>) -> Option<String> {
    let mut changed = false;
    let out = URL_ATTR.replace_all(input, |caps: &Captures| {
        let Some((quote, value)) = quoted_value(caps) else {
            return caps[0].to_string();
        };
        match mapper.map(value) {
            Some(mapped) => {
                changed = true;
                format!("{}{quote}{mapped}{quote}", &caps["lead"])
            }
            None => caps[0].to_string(),
        }
    });
    changed.then(|| out.into_owned())
}

fn rewrite_style_attrs(input: &str, mapper: &UrlMapper<'_>) -> Option<String> {
    let mut changed = false;
    let out = STYLE_ATTR.replace_all(input, |caps: &Captures| {
        let Some((quote, value)) = quoted_value(caps) else {
            return caps[0].to_string();
        };
        match rewrite_css(value, mapper) {
            Some(css) => {
                changed = true;
                format!("{}{quote}{css}{quote}", &caps["lead"])
            }
            None => caps[0].to_string(),
        }
    });
    changed.then(|| out.into_owned())
}

fn rewrite_style_blocks(input: &str, mapper: &UrlMapper<'_>) -> Option<String> {
    let mut changed = false;
    let out = STYLE_BLOCK.replace_all(input, |caps: &Captures| {
        match rewrite_css(&caps["body"], mapper) {
            Some(css) => {
                changed = true;
                format!("{}{}{}", &caps["open"], css, &caps["close"])
            }
            None => caps[0].to_string(),
        }
    });
    changed.then(|| out.into_owned())
}
