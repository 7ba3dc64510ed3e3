use minijinja::value::{from_args, Object, Value};
use minijinja::{Error, ErrorKind, State};
use std::fmt;
use std::sync::{Arc, Mutex};

lazy_static::lazy_static! {
    /// Breakpoint classes shared by every page; built once per process.
    pub static ref MEDIA_STYLE: String = media_style(BREAKPOINTS);
}

pub const BREAKPOINTS: &[(&str, u32)] = &[
    ("xs", 0),
    ("sm", 768),
    ("md", 900),
    ("lg", 1024),
    ("xl", 1192),
];

/// Hides every `.media-at-<bp>` block outside its breakpoint range, so a
/// page rendered for all breakpoints still displays correctly before the
/// client takes over.
pub fn media_style(breakpoints: &[(&str, u32)]) -> String {
    let mut css = String::from(".media-container{margin:0;padding:0;}");
    for (idx, (name, min)) in breakpoints.iter().enumerate() {
        let query = match breakpoints.get(idx + 1) {
            Some((_, next)) => format!("(min-width:{}px) and (max-width:{}px)", min, next - 1),
            None => format!("(min-width:{}px)", min),
        };
        css.push_str(&format!(
            "@media not all and {}{{.media-at-{}{{display:none!important;}}}}",
            query, name
        ));
    }
    css
}

/// Breakpoints worth rendering for a client, judged from its user agent.
/// `None` means render all of them.
pub fn matching_media_queries(user_agent: &str) -> Option<Vec<&'static str>> {
    let ua = user_agent.to_ascii_lowercase();
    let tablet = ua.contains("ipad")
        || ua.contains("tablet")
        || (ua.contains("android") && !ua.contains("mobile"));
    if tablet {
        return Some(vec!["sm", "md"]);
    }
    let phone = ua.contains("iphone") || ua.contains("ipod") || ua.contains("mobi");
    if phone {
        return Some(vec!["xs"]);
    }
    None
}

/// Collects the style rules one render pass actually used.
#[derive(Clone, Debug, Default)]
pub struct StyleSheet {
    // (component name, rules) in first-use order
    rules: Arc<Mutex<Vec<(String, String)>>>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, css: &str) {
        let mut rules = self.rules.lock().unwrap();
        if !rules.iter().any(|(existing, _)| existing == name) {
            rules.push((name.to_string(), css.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.rules.lock().unwrap().len()
    }

    pub fn style_tags(&self) -> String {
        let rules = self.rules.lock().unwrap();
        if rules.is_empty() {
            return String::new();
        }
        let css: String = rules.iter().map(|(_, css)| css.as_str()).collect();
        let names: Vec<&str> = rules.iter().map(|(name, _)| name.as_str()).collect();
        format!(
            r#"<style data-components="{}">{}</style>"#,
            names.join(" "),
            css.replace("</", "<\\/")
        )
    }
}

impl fmt::Display for StyleSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<stylesheet of {} components>", self.len())
    }
}

impl Object for StyleSheet {
    fn call_method(&self, _state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        match name {
            "add" => {
                let (component, css): (String, String) = from_args(args)?;
                self.add(&component, &css);
                Ok(Value::from(""))
            }
            _ => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("stylesheet has no method named {}", name),
            )),
        }
    }
}
