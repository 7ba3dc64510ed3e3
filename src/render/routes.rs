use super::query::{self, QueryParams};

use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type Params = BTreeMap<String, String>;

#[derive(Clone, Debug)]
pub struct RouteDescriptor {
    pub path: String,
    pub kind: RouteKind,
}

#[derive(Clone, Debug)]
pub enum RouteKind {
    Redirect {
        to: String,
    },
    Page {
        template: String,
        queries: Vec<QueryDescriptor>,
    },
}

/// Data a page needs before it can render. Variables are bound from the
/// matched path parameters first, then from the query string.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    pub alias: String,
    pub name: String,
    pub document: String,
    pub variables: Vec<(String, String)>,
    pub required: bool,
}

impl RouteDescriptor {
    pub fn page(path: &str, template: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: RouteKind::Page {
                template: template.to_string(),
                queries: vec![],
            },
        }
    }
    pub fn redirect(path: &str, to: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: RouteKind::Redirect { to: to.to_string() },
        }
    }
    /// Adds a query to a page route; redirects ignore it.
    pub fn query(mut self, query: QueryDescriptor) -> Self {
        if let RouteKind::Page { queries, .. } = &mut self.kind {
            queries.push(query);
        }
        self
    }
}

impl QueryDescriptor {
    pub fn new(alias: &str, name: &str, document: &str) -> Self {
        Self {
            alias: alias.to_string(),
            name: name.to_string(),
            document: document.to_string(),
            variables: vec![],
            required: false,
        }
    }
    pub fn bind(mut self, variable: &str, param: &str) -> Self {
        self.variables.push((variable.to_string(), param.to_string()));
        self
    }
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
    pub fn variables(&self, params: &Params, query: &QueryParams) -> Value {
        let mut variables = Map::new();
        for (variable, param) in &self.variables {
            let value = match params.get(param) {
                Some(value) => Value::String(value.clone()),
                None => query.get(param).cloned().unwrap_or(Value::Null),
            };
            variables.insert(variable.clone(), value);
        }
        Value::Object(variables)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    pub path: String,
    pub query: QueryParams,
    // query string as the client sent it, reused verbatim by redirects
    pub raw_query: String,
}

impl Location {
    pub fn parse(url: &str) -> Self {
        let url = url.split_once('#').map(|(url, _)| url).unwrap_or(url);
        let (path, raw_query) = url.split_once('?').unwrap_or((url, ""));
        // drop scheme and authority if a full URL was passed in
        let path = match path.find("://") {
            Some(idx) => {
                let rest = &path[idx + 3..];
                rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/")
            }
            None => path,
        };
        Self {
            path: if path.is_empty() { "/" } else { path }.to_string(),
            query: query::parse(raw_query),
            raw_query: raw_query.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Resolution<'a> {
    Redirect(String),
    Page(RouteMatch<'a>),
    NotFound,
}

#[derive(Clone, Debug)]
pub struct RouteMatch<'a> {
    pub template: &'a str,
    pub queries: &'a [QueryDescriptor],
    pub params: Params,
}

/// First matching route wins.
pub fn resolve<'a>(routes: &'a [RouteDescriptor], location: &Location) -> Resolution<'a> {
    for route in routes {
        let Some(params) = match_path(&route.path, &location.path) else {
            continue;
        };
        return match &route.kind {
            RouteKind::Redirect { to } => {
                let mut url = interpolate(to, &params);
                if !location.raw_query.is_empty() {
                    url.push('?');
                    url.push_str(&location.raw_query);
                }
                Resolution::Redirect(url)
            }
            RouteKind::Page { template, queries } => Resolution::Page(RouteMatch {
                template,
                queries,
                params,
            }),
        };
    }
    Resolution::NotFound
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn match_path(pattern: &str, path: &str) -> Option<Params> {
    let mut params = Params::new();
    let mut actual = segments(path);
    for expected in segments(pattern) {
        if expected == "*" {
            let rest: Vec<&str> = actual.by_ref().collect();
            params.insert("*".to_string(), rest.join("/"));
            return Some(params);
        }
        let segment = actual.next()?;
        match expected.strip_prefix(':') {
            Some(name) => {
                params.insert(name.to_string(), segment.to_string());
            }
            None if expected == segment => {}
            None => return None,
        }
    }
    match actual.next() {
        Some(_) => None,
        None => Some(params),
    }
}

fn interpolate(pattern: &str, params: &Params) -> String {
    let path: Vec<&str> = segments(pattern)
        .map(|segment| match segment {
            "*" => params.get("*").map(String::as_str).unwrap_or(""),
            segment => match segment.strip_prefix(':') {
                Some(name) => params.get(name).map(String::as_str).unwrap_or(""),
                None => segment,
            },
        })
        .collect();
    format!("/{}", path.join("/"))
}
