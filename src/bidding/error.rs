use serde::Deserialize;
use thiserror::Error;

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorMessage {
    pub message: String,
}

/// Failure of the bidder position creation request. The upstream reports
/// errors as a list, a bare string or a single object, depending on which
/// layer failed; all three normalise to a list of messages.
#[derive(Error, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum MutationError {
    #[error("{}", join(.0))]
    List(Vec<ErrorMessage>),
    #[error("{0}")]
    Text(String),
    #[error("{}", .0.message)]
    Object(ErrorMessage),
}

fn join(errors: &[ErrorMessage]) -> String {
    errors
        .iter()
        .map(|error| error.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl MutationError {
    pub fn messages(&self) -> Vec<String> {
        match self {
            MutationError::List(errors) => errors.iter().map(|e| e.message.clone()).collect(),
            MutationError::Text(message) => vec![message.clone()],
            MutationError::Object(error) => vec![error.message.clone()],
        }
    }
}

impl From<reqwest::Error> for MutationError {
    fn from(err: reqwest::Error) -> Self {
        MutationError::Text(err.to_string())
    }
}

impl From<crate::render::FetchError> for MutationError {
    fn from(err: crate::render::FetchError) -> Self {
        match err {
            crate::render::FetchError::GraphQl(messages) => MutationError::List(
                messages
                    .into_iter()
                    .map(|message| ErrorMessage { message })
                    .collect(),
            ),
            err => MutationError::Text(err.to_string()),
        }
    }
}
