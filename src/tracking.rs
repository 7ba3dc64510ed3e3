use serde::Serialize;
use tracing::info;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Product {
    pub product_id: String,
    pub quantity: u32,
    // whole currency units
    pub price: f64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "action_type")]
pub enum TrackingEvent {
    ConfirmBidSubmitted {
        bidder_position_id: String,
        bidder_id: Option<String>,
        order_id: Option<String>,
        products: Vec<Product>,
    },
    ConfirmBidFailed {
        bidder_id: Option<String>,
        error_messages: Vec<String>,
    },
    // still pending when the poll budget ran out
    ConfirmBidUnresolved {
        bidder_id: Option<String>,
        bidder_position_id: String,
        attempts: u32,
    },
}

pub trait TrackingSink: Send + Sync {
    fn track(&self, event: TrackingEvent);
}

/// Emits tracking events as structured log lines under the `tracking` target.
#[derive(Clone, Debug, Default)]
pub struct LogTracker;

impl TrackingSink for LogTracker {
    fn track(&self, event: TrackingEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "tracking", event = %json),
            Err(err) => info!(target: "tracking", ?event, error = %err, "event not serializable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_tagged_by_action_type() {
        let event = TrackingEvent::ConfirmBidFailed {
            bidder_id: Some("bidder-1".to_string()),
            error_messages: vec!["Sale is closed".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "action_type": "ConfirmBidFailed",
                "bidder_id": "bidder-1",
                "error_messages": ["Sale is closed"]
            })
        );
    }
}
