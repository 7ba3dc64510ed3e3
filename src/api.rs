use crate::bidding::{BidderPositions, MutationError};
use crate::models::{
    BidderPositionSnapshot, CreateBidderPositionInput, CreateBidderPositionResult, User,
};
use crate::render::{FetchError, FetchResponse, Fetcher, Operation, Transport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

pub const CREATE_BIDDER_POSITION: &str = r#"mutation ConfirmBidCreateBidderPositionMutation($input: BidderPositionInput!) {
  createBidderPosition(input: $input) {
    result {
      position {
        internalID
        saleArtwork {
          sale {
            registrationStatus {
              internalID
            }
          }
        }
      }
      status
      messageHeader
    }
  }
}"#;

pub const BIDDER_POSITION: &str = r#"query BidderPositionQuery($bidderPositionID: String!) {
  me {
    bidderPosition(id: $bidderPositionID) {
      status
      position {
        internalID
      }
    }
  }
}"#;

#[derive(Serialize, Debug)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

#[derive(Deserialize, Debug)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<MutationError>,
}

/// Client for the upstream GraphQL API, acting on behalf of one user per call.
#[derive(Clone, Debug)]
pub struct GraphQlClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphQlClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn execute(
        &self,
        user: &User,
        document: &str,
        variables: &Value,
    ) -> Result<(Value, Transport), FetchError> {
        let mut request = self.http.post(&self.endpoint).json(&GraphQlRequest {
            query: document,
            variables,
        });
        if let Some(token) = &user.access_token {
            request = request.header("X-Access-Token", token);
        }
        if let Some(ip) = &user.ip {
            request = request.header("X-Forwarded-For", ip.to_string());
        }

        let response = request.send().await?;
        let transport = Transport {
            status: response.status(),
            headers: response.headers().clone(),
        };
        trace!(status = %transport.status, "upstream responded");
        if !transport.status.is_success() {
            return Err(FetchError::Status(transport.status));
        }
        let payload: Value = response.json().await?;
        Ok((payload, transport))
    }

    async fn data(&self, user: &User, document: &str, variables: &Value) -> Result<Value, FetchError> {
        let (payload, _) = self.execute(user, document, variables).await?;
        let response: GraphQlResponse = serde_json::from_value(payload)?;
        if let Some(errors) = response.errors {
            return Err(FetchError::GraphQl(errors.messages()));
        }
        response.data.ok_or(FetchError::Missing("data"))
    }
}

#[async_trait]
impl Fetcher for GraphQlClient {
    async fn fetch(&self, user: &User, operation: &Operation) -> Result<FetchResponse, FetchError> {
        let (payload, transport) = self
            .execute(user, &operation.document, &operation.variables)
            .await?;
        // partial data is still worth rendering, only bail when there is none
        if payload.get("data").map_or(true, Value::is_null) {
            if let Some(errors) = payload.get("errors") {
                let errors: MutationError = serde_json::from_value(errors.clone())?;
                return Err(FetchError::GraphQl(errors.messages()));
            }
        }
        Ok(FetchResponse {
            payload,
            transport: Some(transport),
        })
    }
}

#[async_trait]
impl BidderPositions for GraphQlClient {
    async fn create_bidder_position(
        &self,
        user: &User,
        input: &CreateBidderPositionInput,
    ) -> Result<CreateBidderPositionResult, MutationError> {
        let data = self
            .data(user, CREATE_BIDDER_POSITION, &json!({ "input": input }))
            .await?;
        let result = data
            .pointer("/createBidderPosition/result")
            .cloned()
            .ok_or(FetchError::Missing("createBidderPosition.result"))?;
        Ok(serde_json::from_value(result).map_err(FetchError::from)?)
    }

    async fn bidder_position(
        &self,
        user: &User,
        position_id: &str,
    ) -> Result<BidderPositionSnapshot, FetchError> {
        let data = self
            .data(
                user,
                BIDDER_POSITION,
                &json!({ "bidderPositionID": position_id }),
            )
            .await?;
        let position = data
            .pointer("/me/bidderPosition")
            .filter(|position| !position.is_null())
            .cloned()
            .ok_or(FetchError::Missing("me.bidderPosition"))?;
        Ok(serde_json::from_value(position)?)
    }
}
