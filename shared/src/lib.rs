use serde::{Deserialize, Serialize};

/// Name of the global the server assigns the rehydration payload to.
pub const BOOTSTRAP_GLOBAL: &str = "__ATELIER_BOOTSTRAP__";

/// Websocket path the confirm-bid page connects to.
pub const BID_SOCKET_PATH: &str = "/api/bid";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubmitBid {
    pub sale_id: String,
    pub artwork_id: String,
    pub artwork_slug: String,
    // registration the user already holds for this sale, if any
    pub bidder_id: Option<String>,
    pub max_bid_amount_cents: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "content")]
pub enum BidMessage {
    SubmitBid(SubmitBid),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FormStatus {
    SubmissionFailed,
    Outbid,
    Unresolved,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "content")]
pub enum BidUpdate {
    Submitting(bool),
    Status(FormStatus),
    Navigate { url: String },
    ActionResponse(String),
}

/// Converts a bid typed in whole currency units to cents. Zero, negative
/// and non-numeric input is not a bid.
pub fn dollars_to_cents(input: &str) -> Option<i64> {
    let dollars = input.trim().replace(',', "").parse::<i64>().ok()?;
    if dollars <= 0 {
        return None;
    }
    dollars.checked_mul(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollars_convert_to_cents() {
        assert_eq!(dollars_to_cents("5,000"), Some(500_000));
        assert_eq!(dollars_to_cents(" 12 "), Some(1_200));
        assert_eq!(dollars_to_cents("0"), None);
        assert_eq!(dollars_to_cents("abc"), None);
    }

    #[test]
    fn bid_message_is_adjacently_tagged() {
        let msg = BidMessage::SubmitBid(SubmitBid {
            sale_id: "sale".to_string(),
            artwork_id: "artwork".to_string(),
            artwork_slug: "some-artwork".to_string(),
            bidder_id: None,
            max_bid_amount_cents: 50_000,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "SubmitBid");
        assert_eq!(json["content"]["max_bid_amount_cents"], 50_000);
    }

    #[test]
    fn form_status_uses_camel_case() {
        let json = serde_json::to_string(&BidUpdate::Status(FormStatus::SubmissionFailed)).unwrap();
        assert_eq!(json, r#"{"type":"Status","content":"submissionFailed"}"#);
    }
}
