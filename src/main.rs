mod api;
mod bidding;
mod models;
mod render;
mod storefront;
mod tracking;
mod utils;
mod views;

use axum::{http, middleware, routing};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{self, signal};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const SESSION_KEY: &str = "atelier_session";

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    renderer: Arc<render::Renderer>,
    routes: Arc<[render::RouteDescriptor]>,
    bidding: Arc<bidding::ConfirmBid>,
}

impl AppState {
    fn init(config: AppConfig) -> Self {
        let client = Arc::new(api::GraphQlClient::new(config.api_url.clone()));
        Self::with_backend(config, client.clone(), client)
    }

    fn with_backend(
        config: AppConfig,
        fetcher: Arc<dyn render::Fetcher>,
        positions: Arc<dyn bidding::BidderPositions>,
    ) -> Self {
        let templates = {
            let mut env = render::template_environment();
            minijinja_embed::load_templates!(&mut env);
            env
        };
        let renderer = render::Renderer::new(templates, fetcher, storefront::operations());
        let bidding = bidding::ConfirmBid::new(
            positions,
            Arc::new(tracking::LogTracker),
            config.host.origin(),
        );

        Self {
            config: Arc::new(config),
            renderer: Arc::new(renderer),
            routes: storefront::routes(),
            bidding: Arc::new(bidding),
        }
    }
}

#[derive(Clone, Debug)]
struct HostDetails {
    secure: bool,
    hostname: String,
    port: Option<u16>,
}

impl HostDetails {
    fn host(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.hostname, port),
            None => self.hostname.clone(),
        }
    }

    fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.host())
    }
}

#[derive(Clone, Debug)]
struct AppConfig {
    host: HostDetails,
    bind_addr: SocketAddr,
    api_url: String,
    assets_dir: PathBuf,
    user_ip_lookup: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("{var} {problem}")]
struct ConfigError {
    var: &'static str,
    problem: &'static str,
}

impl ConfigError {
    fn new(var: &'static str, problem: &'static str) -> Self {
        Self { var, problem }
    }
}

fn get_config() -> Result<AppConfig, ConfigError> {
    config_from(|name| std::env::var(name).ok())
}

fn config_from(var: impl Fn(&str) -> Option<String>) -> Result<AppConfig, ConfigError> {
    let root_uri = var("ATELIER_ROOT")
        .ok_or(ConfigError::new("ATELIER_ROOT", "env variable must be set"))?
        .parse::<http::uri::Uri>()
        .map_err(|_| ConfigError::new("ATELIER_ROOT", "is not a valid URI"))?;

    let secure = match root_uri.scheme_str() {
        Some("https") => true,
        Some("http") => false,
        _ => return Err(ConfigError::new("ATELIER_ROOT", "URI does not have a valid scheme")),
    };
    let hostname = root_uri
        .host()
        .ok_or(ConfigError::new("ATELIER_ROOT", "URI does not have a valid hostname"))?
        .to_owned();
    let port = root_uri.port_u16();

    let bind_addr = var("ATELIER_LISTEN")
        .unwrap_or_else(|| "0.0.0.0:3000".into())
        .parse::<SocketAddr>()
        .map_err(|_| ConfigError::new("ATELIER_LISTEN", "is not a valid socket address"))?;

    let api_url = var("ATELIER_API_URL")
        .ok_or(ConfigError::new("ATELIER_API_URL", "env variable must be set"))?
        .parse::<http::uri::Uri>()
        .map_err(|_| ConfigError::new("ATELIER_API_URL", "is not a valid URI"))?
        .to_string();

    let assets_dir = var("ATELIER_ASSETS")
        .unwrap_or_else(|| "frontend/dist".into())
        .into();

    let user_ip_lookup = match var("ATELIER_IP_LOOKUP").as_deref().unwrap_or("0") {
        "0" => false,
        "1" => true,
        _ => return Err(ConfigError::new("ATELIER_IP_LOOKUP", "is not valid; it can be 0 or 1")),
    };

    Ok(AppConfig {
        host: HostDetails {
            secure,
            hostname,
            port,
        },
        bind_addr,
        api_url,
        assets_dir,
        user_ip_lookup,
    })
}

fn app(state: AppState) -> routing::Router {
    routing::Router::new()
        .route(
            atelier_shared::BID_SOCKET_PATH,
            routing::get(views::bid_socket),
        )
        .fallback(views::render_page)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            views::identify_user,
        ))
        .nest("/assets", views::assets_router(state.clone()))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("ATELIER_LOG")
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = match get_config() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            std::process::exit(1);
        }
    };
    let app_state = AppState::init(app_config.clone());

    info!(
        "started on {}, serving {}",
        &app_config.bind_addr,
        app_config.host.origin()
    );
    axum::Server::bind(&app_config.bind_addr)
        .serve(app(app_state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}
