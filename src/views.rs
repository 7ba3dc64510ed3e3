use crate::bidding::{BidForm, BidRequest, ConfirmBid, Lifecycle, LifecycleGuard, Outcome};
use crate::models::User;
use crate::render::{RenderContext, RenderRequest, RenderResult};
use crate::{utils, AppState, SESSION_KEY};

use atelier_shared::{BidMessage, BidUpdate, FormStatus, SubmitBid};
use axum::{
    extract::{ws, ConnectInfo, Extension, State},
    http::{header, Method, Request, StatusCode, Uri},
    middleware,
    response::{Html, IntoResponse, Response},
    routing,
};
use axum_extra::extract::cookie::CookieJar;
use futures_util::{sink::SinkExt, stream::StreamExt};
use minijinja::context;
use std::{net::SocketAddr, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tower_http::services::ServeDir;
use tracing::{error, warn};

pub async fn identify_user<B>(
    State(state): State<AppState>,
    ConnectInfo(socket_addr): ConnectInfo<SocketAddr>,
    headers: header::HeaderMap,
    cookies: CookieJar,
    mut request: Request<B>,
    next: middleware::Next<B>,
) -> Response {
    let user = {
        let forwarded = if state.config.user_ip_lookup {
            headers
                .get("X-Forwarded-For")
                .and_then(utils::forwarded_header_ip)
        } else {
            None
        };
        let access_token = cookies
            .get(SESSION_KEY)
            .map(|cookie| cookie.value().to_owned())
            .filter(|token| !token.is_empty());
        User {
            access_token,
            ip: Some(forwarded.unwrap_or_else(|| socket_addr.ip())),
        }
    };
    request.extensions_mut().insert(user);
    next.run(request).await
}

pub fn assets_router(state: AppState) -> routing::Router<AppState> {
    let bundle = ServeDir::new(&state.config.assets_dir);
    routing::Router::new()
        .route(
            "/atelier.css",
            routing::get(|State(state): State<AppState>| async move {
                match state
                    .renderer
                    .templates()
                    .get_template("atelier.css")
                    .and_then(|template| template.render(context!()))
                {
                    Ok(css) => ([(header::CONTENT_TYPE, "text/css")], css).into_response(),
                    Err(err) => {
                        error!(error = %err, "stylesheet failed to render");
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }),
        )
        .nest_service("/app", bundle)
        .with_state(state)
}

fn error_page(state: &AppState) -> Response {
    let body = state
        .renderer
        .templates()
        .get_template("error.jinja")
        .and_then(|template| template.render(context!()))
        .unwrap_or_else(|err| {
            error!(error = %err, "error page failed to render");
            "Internal error".to_string()
        });
    (StatusCode::INTERNAL_SERVER_ERROR, Html(body)).into_response()
}

/// Every GET the router has no explicit route for goes through the server
/// render pipeline.
pub async fn render_page(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    method: Method,
    headers: header::HeaderMap,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let request = RenderRequest {
        url: uri.to_string(),
        context: RenderContext {
            user: Some(user),
            environment: None,
        },
        routes: state.routes.clone(),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
    };

    match state.renderer.render_page(request).await {
        Ok(RenderResult::Redirect { url }) => {
            (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
        }
        Ok(RenderResult::Rendered(page)) => match state.renderer.document(&page) {
            Ok(document) => (page.status, Html(document)).into_response(),
            Err(err) => {
                error!(error = %err, "document layout failed to render");
                error_page(&state)
            }
        },
        // the pipeline already logged it
        Err(_) => error_page(&state),
    }
}

pub async fn bid_socket(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ws: ws::WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| events_handler(socket, state.bidding.clone(), user))
}

fn update_message(update: &BidUpdate) -> ws::Message {
    ws::Message::Text(serde_json::to_string(update).expect("BidUpdate should serialize"))
}

/// Bid form living on the other end of a websocket.
struct SocketForm {
    sender: mpsc::UnboundedSender<ws::Message>,
}

impl SocketForm {
    fn send(&self, update: BidUpdate) {
        // a closed socket cancels the workflow soon enough
        let _ = self.sender.send(update_message(&update));
    }
}

impl BidForm for SocketForm {
    fn set_submitting(&self, submitting: bool) {
        self.send(BidUpdate::Submitting(submitting));
    }
    fn set_status(&self, status: FormStatus) {
        self.send(BidUpdate::Status(status));
    }
    fn navigate(&self, url: &str) {
        self.send(BidUpdate::Navigate {
            url: url.to_owned(),
        });
    }
}

/// Submission currently running for one socket.
struct Submission {
    _guard: LifecycleGuard,
    task: JoinHandle<Outcome>,
}

impl Submission {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

fn check_submission(bid: &SubmitBid, current: Option<&Submission>) -> Result<(), &'static str> {
    if bid.max_bid_amount_cents <= 0 {
        return Err("Bid amount must be greater than zero.");
    }
    if current.map_or(false, Submission::is_running) {
        return Err("Your bid is already being submitted.");
    }
    Ok(())
}

fn websocket_worker(
    mut sender: futures_util::stream::SplitSink<ws::WebSocket, ws::Message>,
) -> (
    tokio::task::JoinHandle<Result<(), axum::Error>>,
    mpsc::UnboundedSender<ws::Message>,
) {
    let (task_sender, mut task_receiver) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        while let Some(message) = task_receiver.recv().await {
            sender.send(message).await?
        }
        Ok(())
    });

    (task, task_sender)
}

async fn events_handler(socket: ws::WebSocket, bidding: Arc<ConfirmBid>, user: User) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (ws_task, ws_sender) = websocket_worker(ws_sender);
    let form: Arc<dyn BidForm> = Arc::new(SocketForm {
        sender: ws_sender.clone(),
    });

    let user_task = tokio::spawn(async move {
        // dropping the submission's guard cancels its workflow
        let mut submission: Option<Submission> = None;
        while let Some(wsmsg) = ws_receiver.next().await {
            match wsmsg {
                Ok(ws::Message::Text(text)) => {
                    let response = match serde_json::from_str::<BidMessage>(&text) {
                        Ok(BidMessage::SubmitBid(bid)) => {
                            match check_submission(&bid, submission.as_ref()) {
                                Ok(()) => {
                                    let (guard, lifecycle) = Lifecycle::new();
                                    let request = BidRequest {
                                        user: user.clone(),
                                        sale_id: bid.sale_id,
                                        artwork_id: bid.artwork_id,
                                        artwork_slug: bid.artwork_slug,
                                        bidder_id: bid.bidder_id,
                                        max_bid_amount_cents: bid.max_bid_amount_cents,
                                    };
                                    let task = bidding.submit_bid(request, form.clone(), lifecycle);
                                    submission = Some(Submission {
                                        _guard: guard,
                                        task,
                                    });
                                    None
                                }
                                Err(reason) => Some(reason.to_string()),
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "unreadable bid message");
                            Some("Failed to deserialize client message.".to_string())
                        }
                    };
                    if let Some(resp) = response {
                        if ws_sender
                            .send(update_message(&BidUpdate::ActionResponse(resp)))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                // client disconnected
                Ok(ws::Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let user_handle = user_task.abort_handle();
    let ws_handle = ws_task.abort_handle();

    tokio::select! {
        _ = user_task => {
            ws_handle.abort();
        }
        _ = ws_task => {
            user_handle.abort();
        }
    }
}
