//! CSS rules: `url(...)` tokens and `@import` targets.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::rewrite::url::{quoted_value, UrlMapper};

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^"'()\s]+))\s*\)"#)
        .expect("valid CSS url regex")
});

static CSS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?P<lead>@import\s+)(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
        .expect("valid CSS import regex")
});

/// Rewrite a stylesheet. `None` when nothing matched.
pub(crate) fn rewrite_css(input: &str, mapper: &UrlMapper<'_>) -> Option<String> {
    let mut changed = false;

    let with_urls = CSS_URL.replace_all(input, |caps: &Captures| {
        let (quote, value) = match caps.name("bare") {
            Some(m) => (None, m.as_str()),
            None => match quoted_value(caps) {
                Some((q, v)) => (Some(q), v),
                None => return caps[0].to_string(),
            },
        };
        match mapper.map(value) {
            Some(mapped) => {
                changed = true;
                match quote {
                    Some(q) => format!("url({q}{mapped}{q})"),
                    None => format!("url({mapped})"),
                }
            }
            None => caps[0].to_string(),
        }
    });

    let with_imports = CSS_IMPORT.replace_all(&with_urls, |caps: &Captures| {
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

    if changed {
        Some(with_imports.into_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::url::{MountPrefix, UpstreamOrigin};

    fn run(input: &str) -> String {
        let up = UpstreamOrigin::parse("https://portal.example.org").unwrap();
        let mount = MountPrefix::new("/proxy");
        let mapper = UrlMapper { upstream: &up, mount: &mount, local_origin: "https://mirror.test" };
        rewrite_css(input, &mapper).unwrap_or_else(|| input.to_string())
    }

    #[test]
    fn test_url_forms() {
        assert_eq!(run("a{background:url(/style.css)}"), "a{background:url(/proxy/style.css)}");
        assert_eq!(run("a{background:url('/img/a.png')}"), "a{background:url('/proxy/img/a.png')}");
        assert_eq!(
            run(r#"a{background:url( "https://portal.example.org/img/a.png" )}"#),
            r#"a{background:url("https://mirror.test/proxy/img/a.png")}"#
        );
        assert_eq!(
            run("a{background:url(//portal.example.org/b.png)}"),
            "a{background:url(https://mirror.test/proxy/b.png)}"
        );
    }

    #[test]
    fn test_round_trip_is_stable() {
        let once = run("url(/style.css)");
        assert_eq!(once, "url(/proxy/style.css)");
        assert_eq!(run(&once), once);
    }

    #[test]
    fn test_imports() {
        assert_eq!(run(r#"@import "/css/base.css";"#), r#"@import "/proxy/css/base.css";"#);
        assert_eq!(run("@import url(/css/base.css);"), "@import url(/proxy/css/base.css);");
        assert_eq!(
            run("@import 'https://fonts.example.com/f.css';"),
            "@import 'https://fonts.example.com/f.css';"
        );
    }

    #[test]
    fn test_data_uris_untouched() {
        let css = "a{background:url(data:image/png;base64,AAAA)}";
        assert_eq!(run(css), css);
    }
}
