use minijinja::value::{from_args, Object, Value};
use minijinja::{Error, ErrorKind, State};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HeadTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub content: Option<String>,
}

impl HeadTag {
    pub fn style(css: &str) -> Self {
        Self {
            name: "style".to_string(),
            attributes: vec![("type".to_string(), "text/css".to_string())],
            content: Some(css.to_string()),
        }
    }
    pub fn title(text: &str) -> Self {
        Self {
            name: "title".to_string(),
            attributes: vec![],
            content: Some(text.to_string()),
        }
    }
    pub fn meta(name: &str, content: &str) -> Self {
        Self {
            name: "meta".to_string(),
            attributes: vec![
                ("name".to_string(), name.to_string()),
                ("content".to_string(), content.to_string()),
            ],
            content: None,
        }
    }
    pub fn link(rel: &str, href: &str) -> Self {
        Self {
            name: "link".to_string(),
            attributes: vec![
                ("rel".to_string(), rel.to_string()),
                ("href".to_string(), href.to_string()),
            ],
            content: None,
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = format!("<{}", self.name);
        for (key, value) in &self.attributes {
            html.push_str(&format!(r#" {}="{}""#, key, escape(value)));
        }
        match &self.content {
            // style bodies are CSS, only a closing tag could break out of them
            Some(content) if self.name == "style" => {
                html.push_str(&format!(">{}</style>", content.replace("</", "<\\/")))
            }
            Some(content) => {
                html.push_str(&format!(">{}</{}>", escape(content), self.name))
            }
            None => html.push('>'),
        }
        html
    }
}

// Only what can end a text node or a quoted attribute; URLs keep their slashes.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Head tags the rendered page asked for, in the order it asked.
#[derive(Clone, Debug, Default)]
pub struct HeadCollector {
    tags: Arc<Mutex<Vec<HeadTag>>>,
}

impl HeadCollector {
    pub fn new(initial: Vec<HeadTag>) -> Self {
        Self {
            tags: Arc::new(Mutex::new(initial)),
        }
    }
    pub fn push(&self, tag: HeadTag) {
        let mut tags = self.tags.lock().unwrap();
        // a page has a single title, the innermost template wins
        if tag.name == "title" {
            tags.retain(|existing| existing.name != "title");
        }
        tags.push(tag);
    }
    pub fn tags(&self) -> Vec<HeadTag> {
        self.tags.lock().unwrap().clone()
    }
}

impl fmt::Display for HeadCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} head tags>", self.tags.lock().unwrap().len())
    }
}

impl Object for HeadCollector {
    fn call_method(&self, _state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        let tag = match name {
            "title" => {
                let (text,): (String,) = from_args(args)?;
                HeadTag::title(&text)
            }
            "meta" => {
                let (name, content): (String, String) = from_args(args)?;
                HeadTag::meta(&name, &content)
            }
            "link" => {
                let (rel, href): (String, String) = from_args(args)?;
                HeadTag::link(&rel, &href)
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::UnknownMethod,
                    format!("head has no method named {}", name),
                ))
            }
        };
        self.push(tag);
        Ok(Value::from(""))
    }
}
