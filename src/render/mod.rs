//! Server-side render pipeline.
//!
//! One pass resolves a URL against the route table, fetches what the page
//! needs through a request-scoped [`DataEnvironment`], renders the template
//! tree while collecting styles and head tags, waits for deferred fetches,
//! and hands back the HTML together with a rehydration payload.

pub mod environment;
pub mod head;
pub mod query;
pub mod routes;
pub mod serialize;
pub mod styles;

pub use environment::{
    DataEnvironment, FetchError, FetchResponse, Fetcher, Operation, Transport,
};
pub use head::HeadTag;
pub use routes::{QueryDescriptor, RouteDescriptor};

use crate::models::User;
use head::HeadCollector;
use routes::{Location, Resolution, RouteMatch};
use styles::StyleSheet;

use axum::http::StatusCode;
use minijinja::value::{from_args, Object, Value};
use minijinja::{context, AutoEscape, ErrorKind, State};
use serde_json::Map;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info_span, Instrument};
use uuid::Uuid;

pub const NOT_FOUND_TEMPLATE: &str = "404.jinja";
pub const DOCUMENT_TEMPLATE: &str = "document.jinja";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("data fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Inputs of one render pass.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub url: String,
    pub context: RenderContext,
    pub routes: Arc<[RouteDescriptor]>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct RenderContext {
    pub user: Option<User>,
    // reused when the caller wants several renders to share one cache
    pub environment: Option<Arc<DataEnvironment>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderResult {
    Redirect { url: String },
    Rendered(RenderedPage),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedPage {
    pub body_html: String,
    pub status: StatusCode,
    pub head_tags: Vec<HeadTag>,
    pub style_tags: String,
    pub scripts: String,
}

/// Template environment escaping HTML in every `.jinja` template. Auto
/// escaping is fixed when a template is added, so add templates after this.
pub fn template_environment() -> minijinja::Environment<'static> {
    let mut templates = minijinja::Environment::new();
    templates.set_auto_escape_callback(|name| {
        if name.ends_with(".jinja") {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });
    templates
}

pub struct Renderer {
    templates: minijinja::Environment<'static>,
    fetcher: Arc<dyn Fetcher>,
    // operations templates may preload while rendering, by name
    operations: Arc<HashMap<String, String>>,
}

impl Renderer {
    pub fn new(
        templates: minijinja::Environment<'static>,
        fetcher: Arc<dyn Fetcher>,
        operations: HashMap<String, String>,
    ) -> Self {
        Self {
            templates,
            fetcher,
            operations: Arc::new(operations),
        }
    }

    pub fn templates(&self) -> &minijinja::Environment<'static> {
        &self.templates
    }

    /// Runs one render pass. Redirects and unmatched URLs are results, not
    /// errors; anything else that goes wrong is logged here, once.
    pub async fn render_page(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        let span = info_span!("render_page", url = %request.url, request_id = %Uuid::new_v4());
        let url = request.url.clone();
        self.try_render(request)
            .instrument(span.clone())
            .await
            .map_err(|err| {
                span.in_scope(|| error!(%url, error = %err, "server render failed"));
                err
            })
    }

    async fn try_render(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        let RenderRequest {
            url,
            context,
            routes: route_table,
            user_agent,
        } = request;

        let user = User::or_anonymous(context.user);
        let environment = context.environment.unwrap_or_else(|| {
            Arc::new(DataEnvironment::new(self.fetcher.clone(), user.clone()))
        });
        let location = Location::parse(&url);

        let matched = match routes::resolve(&route_table, &location) {
            Resolution::Redirect(url) => {
                debug!(%url, "redirecting");
                return Ok(RenderResult::Redirect { url });
            }
            Resolution::Page(matched) => Some(matched),
            Resolution::NotFound => None,
        };

        let page = match matched {
            Some(matched) => self.resolve_data(&environment, &location, matched).await?,
            None => None,
        };
        let (template, status, data) = match page {
            Some((template, data)) => (template, StatusCode::OK, data),
            None => (NOT_FOUND_TEMPLATE, StatusCode::NOT_FOUND, Map::new()),
        };

        let head = HeadCollector::new(vec![HeadTag::style(&styles::MEDIA_STYLE)]);
        let sheet = StyleSheet::new();
        let only_match = user_agent.as_deref().and_then(styles::matching_media_queries);
        let loader = DataLoader {
            environment: environment.clone(),
            operations: self.operations.clone(),
        };

        let body_html = self.templates.get_template(template)?.render(context! {
            user => user.view(),
            only_match => only_match,
            path => &location.path,
            query => &location.query,
            data => data,
            head => Value::from_object(head.clone()),
            styles => Value::from_object(sheet.clone()),
            loader => Value::from_object(loader),
        })?;

        environment.settled().await?;
        let records = environment::sanitize(environment.snapshot());

        Ok(RenderResult::Rendered(RenderedPage {
            body_html,
            status,
            head_tags: head.tags(),
            style_tags: sheet.style_tags(),
            scripts: serialize::bootstrap_script(&records),
        }))
    }

    /// Fetches every query of the matched route. `None` when a required
    /// query came back empty, which renders as not found.
    async fn resolve_data<'a>(
        &self,
        environment: &DataEnvironment,
        location: &Location,
        matched: RouteMatch<'a>,
    ) -> Result<Option<(&'a str, Map<String, serde_json::Value>)>, RenderError> {
        let mut data = Map::new();
        for query in matched.queries {
            let operation = Operation::new(
                &query.name,
                &query.document,
                query.variables(&matched.params, &location.query),
            );
            let payload = environment.fetch(&operation).await?;
            let root = payload
                .get("data")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let empty = match &root {
                serde_json::Value::Null => true,
                serde_json::Value::Object(fields) => fields.values().all(|v| v.is_null()),
                _ => false,
            };
            if query.required && empty {
                debug!(query = %query.name, "required data missing");
                return Ok(None);
            }
            data.insert(query.alias.clone(), root);
        }
        Ok(Some((matched.template, data)))
    }

    /// Wraps a rendered page into a complete HTML document.
    pub fn document(&self, page: &RenderedPage) -> Result<String, minijinja::Error> {
        let head_tags: Vec<String> = page.head_tags.iter().map(HeadTag::to_html).collect();
        self.templates.get_template(DOCUMENT_TEMPLATE)?.render(context! {
            head_tags => head_tags,
            style_tags => &page.style_tags,
            body_html => &page.body_html,
            scripts => &page.scripts,
        })
    }
}

/// Template-side handle on the request's data environment.
#[derive(Clone)]
struct DataLoader {
    environment: Arc<DataEnvironment>,
    operations: Arc<HashMap<String, String>>,
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("environment", &self.environment)
            .finish()
    }
}

impl fmt::Display for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<data loader>")
    }
}

impl Object for DataLoader {
    fn call_method(
        &self,
        _state: &State,
        name: &str,
        args: &[Value],
    ) -> Result<Value, minijinja::Error> {
        if name != "preload" {
            return Err(minijinja::Error::new(
                ErrorKind::UnknownMethod,
                format!("loader has no method named {}", name),
            ));
        }
        let (operation, variables): (String, Option<Value>) = from_args(args)?;
        let document = self.operations.get(&operation).ok_or_else(|| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("unknown operation {}", operation),
            )
        })?;
        let variables = match variables {
            Some(variables) => serde_json::to_value(&variables).map_err(|err| {
                minijinja::Error::new(ErrorKind::BadSerialization, "invalid variables")
                    .with_source(err)
            })?,
            None => serde_json::Value::Object(Map::new()),
        };
        let preloaded = self
            .environment
            .preload(Operation::new(&operation, document, variables))
            .map_err(|err| {
                minijinja::Error::new(ErrorKind::InvalidOperation, "preload failed")
                    .with_source(err)
            })?;
        Ok(match preloaded {
            Some(payload) => Value::from_serializable(&payload.get("data")),
            None => Value::UNDEFINED,
        })
    }
}
