use atelier_shared::{
    dollars_to_cents, BidMessage, BidUpdate, FormStatus, SubmitBid, BID_SOCKET_PATH,
    BOOTSTRAP_GLOBAL,
};

use futures::{stream::SplitSink, SinkExt, StreamExt};
use gloo_net::websocket::{futures::WebSocket, Message};
use serde_json::Value;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, HtmlInputElement};
use yew::prelude::*;

const MOUNT_ID: &str = "confirm-bid-root";

/// Cache records the server rendered this page with, `[[key, payload], ...]`.
fn bootstrap_records() -> Vec<(String, Value)> {
    let raw = web_sys::window()
        .and_then(|window| js_sys::Reflect::get(&window, &JsValue::from_str(BOOTSTRAP_GLOBAL)).ok())
        .and_then(|value| value.as_string());
    match raw {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        None => vec![],
    }
}

fn minimum_bid_cents(records: &[(String, Value)]) -> Option<i64> {
    records
        .iter()
        .find(|(key, _)| key.starts_with("ConfirmBidQuery"))
        .and_then(|(_, payload)| {
            payload
                .pointer("/data/artwork/saleArtwork/minimumNextBid/cents")
                .and_then(Value::as_i64)
        })
}

fn socket_url() -> Option<String> {
    let location = web_sys::window()?.location();
    let scheme = match location.protocol().ok()?.as_str() {
        "https:" => "wss",
        _ => "ws",
    };
    Some(format!("{}://{}{}", scheme, location.host().ok()?, BID_SOCKET_PATH))
}

fn navigate(url: &str) {
    if let Some(window) = web_sys::window() {
        let _ = window.location().assign(url);
    }
}

fn status_message(status: FormStatus) -> &'static str {
    match status {
        FormStatus::SubmissionFailed => "Your bid couldn't be placed. Please try again.",
        FormStatus::Outbid => "You've been outbid. Increase your max bid to try again.",
        FormStatus::Unresolved => {
            "We're still confirming your bid. Check your bids again in a moment."
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
struct Lot {
    sale_id: String,
    artwork_id: String,
    artwork_slug: String,
    bidder_id: Option<String>,
    minimum_bid_cents: Option<i64>,
    /// From the page's `?bid=` link, in cents.
    initial_bid_cents: Option<i64>,
}

impl Lot {
    fn from_element(element: &Element, records: &[(String, Value)]) -> Option<Self> {
        Some(Self {
            sale_id: element.get_attribute("data-sale-id")?,
            artwork_id: element.get_attribute("data-artwork-id")?,
            artwork_slug: element.get_attribute("data-artwork-slug")?,
            bidder_id: element.get_attribute("data-bidder-id"),
            minimum_bid_cents: minimum_bid_cents(records),
            initial_bid_cents: element
                .get_attribute("data-initial-bid")
                .and_then(|raw| raw.trim().parse().ok()),
        })
    }

    /// The bid the form opens with: a linked bid the lot still accepts,
    /// otherwise the minimum next bid.
    fn preselected_bid_cents(&self) -> Option<i64> {
        match (self.initial_bid_cents, self.minimum_bid_cents) {
            (Some(initial), Some(minimum)) if initial >= minimum => Some(initial),
            (Some(initial), None) if initial > 0 => Some(initial),
            (_, minimum) => minimum,
        }
    }
}

#[derive(Clone, Properties, PartialEq)]
struct BidFormProps {
    lot: Lot,
}

#[function_component(ConfirmBidForm)]
fn confirm_bid_form(BidFormProps { lot }: &BidFormProps) -> Html {
    let submitting = use_state(|| false);
    let status = use_state(|| None::<FormStatus>);
    let notice = use_state(|| None::<String>);
    let ws_sender = use_mut_ref(|| None::<SplitSink<WebSocket, Message>>);
    let amount_input = use_node_ref();

    {
        let submitting = submitting.clone();
        let status = status.clone();
        let notice = notice.clone();
        let ws_sender = ws_sender.clone();
        use_effect_with((), move |_| {
            match socket_url().map(|url| WebSocket::open(&url)) {
                Some(Ok(ws)) => {
                    let (sender, mut receiver) = ws.split();
                    *ws_sender.borrow_mut() = Some(sender);
                    spawn_local(async move {
                        while let Some(Ok(msg)) = receiver.next().await {
                            let Message::Text(text) = msg else { continue };
                            match serde_json::from_str::<BidUpdate>(&text) {
                                Ok(BidUpdate::Submitting(value)) => {
                                    if value {
                                        status.set(None);
                                        notice.set(None);
                                    }
                                    submitting.set(value);
                                }
                                Ok(BidUpdate::Status(value)) => status.set(Some(value)),
                                Ok(BidUpdate::Navigate { url }) => navigate(&url),
                                Ok(BidUpdate::ActionResponse(message)) => {
                                    submitting.set(false);
                                    notice.set(Some(message));
                                }
                                Err(_) => {}
                            }
                        }
                    });
                }
                _ => notice.set(Some("Bidding is unavailable right now.".to_string())),
            }
            // closing the socket stops any bid still being confirmed
            move || {
                if let Some(mut sender) = ws_sender.borrow_mut().take() {
                    spawn_local(async move {
                        let _ = sender.close().await;
                    });
                }
            }
        })
    }

    let onsubmit = {
        let lot = lot.clone();
        let submitting = submitting.clone();
        let notice = notice.clone();
        let ws_sender = ws_sender.clone();
        let amount_input = amount_input.clone();
        Callback::from(move |event: SubmitEvent| {
            event.prevent_default();
            if *submitting {
                return;
            }
            let Some(input) = amount_input.cast::<HtmlInputElement>() else {
                return;
            };
            let Some(max_bid_amount_cents) = dollars_to_cents(&input.value()) else {
                notice.set(Some("Enter a whole dollar amount greater than zero.".to_string()));
                return;
            };

            let message = BidMessage::SubmitBid(SubmitBid {
                sale_id: lot.sale_id.clone(),
                artwork_id: lot.artwork_id.clone(),
                artwork_slug: lot.artwork_slug.clone(),
                bidder_id: lot.bidder_id.clone(),
                max_bid_amount_cents,
            });
            submitting.set(true);

            let ws_sender = ws_sender.clone();
            let submitting = submitting.clone();
            let notice = notice.clone();
            spawn_local(async move {
                let text = serde_json::to_string(&message).expect("BidMessage should serialize");
                let sender = ws_sender.borrow_mut().take();
                let sent = match sender {
                    Some(mut sender) => {
                        let sent = sender.send(Message::Text(text)).await.is_ok();
                        *ws_sender.borrow_mut() = Some(sender);
                        sent
                    }
                    None => false,
                };
                if !sent {
                    submitting.set(false);
                    notice.set(Some("Bidding is unavailable right now.".to_string()));
                }
            });
        })
    };

    let initial = lot
        .preselected_bid_cents()
        .map(|cents| (cents / 100).to_string())
        .unwrap_or_default();
    let message = notice
        .as_deref()
        .map(str::to_owned)
        .or_else(|| (*status).map(|status| status_message(status).to_string()));

    html! {
        <form class="bid-form" {onsubmit}>
            <label for="max-bid">{"Set your max bid"}</label>
            <input
                id="max-bid"
                type="text"
                inputmode="numeric"
                placeholder="Whole dollars"
                value={initial}
                ref={amount_input}
            />
            if let Some(cents) = lot.minimum_bid_cents {
                <p class="hint">{ format!("Minimum next bid ${}", cents / 100) }</p>
            }
            <button type="submit" disabled={*submitting}>
                { if *submitting { "Confirming bid" } else { "Confirm bid" } }
            </button>
            if let Some(message) = message {
                <p id="bid-status" role="status">{ message }</p>
            }
        </form>
    }
}

fn main() {
    let Some(root) = web_sys::window()
        .and_then(|window| window.document())
        .and_then(|document| document.get_element_by_id(MOUNT_ID))
    else {
        return;
    };
    let Some(lot) = Lot::from_element(&root, &bootstrap_records()) else {
        return;
    };
    root.set_inner_html("");
    yew::Renderer::<ConfirmBidForm>::with_root_and_props(root, BidFormProps { lot }).render();
}
