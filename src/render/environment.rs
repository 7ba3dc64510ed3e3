use crate::models::User;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("upstream answered with status {0}")]
    Status(StatusCode),
    #[error("upstream reported errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("could not decode upstream payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("upstream payload is missing `{0}`")]
    Missing(&'static str),
    #[error("fetch task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("no async runtime available to dispatch `{0}`")]
    NoRuntime(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub name: String,
    pub document: String,
    pub variables: Value,
}

impl Operation {
    pub fn new(name: &str, document: &str, variables: Value) -> Self {
        Self {
            name: name.to_string(),
            document: document.to_string(),
            variables,
        }
    }
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.name, self.variables)
    }
}

/// Transport-level details of the response a payload came from. Kept next
/// to the cached payload for diagnostics; never serialised.
#[derive(Clone, Debug)]
pub struct Transport {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub payload: Value,
    pub transport: Option<Transport>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, user: &User, operation: &Operation) -> Result<FetchResponse, FetchError>;
}

#[derive(Clone, Debug)]
pub struct CacheRecord {
    pub key: String,
    pub payload: Value,
    pub transport: Option<Transport>,
}

/// Per-request cache and dispatcher for every data need of a render pass.
pub struct DataEnvironment {
    fetcher: Arc<dyn Fetcher>,
    user: User,
    // insertion ordered; the client replays them in the same order
    records: Mutex<Vec<CacheRecord>>,
    in_flight: Mutex<Vec<JoinHandle<Result<(), FetchError>>>>,
    // keys of deferred fetches not stored yet
    pending: Mutex<HashSet<String>>,
}

impl fmt::Debug for DataEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataEnvironment")
            .field("user", &self.user)
            .field("records", &self.records.lock().unwrap().len())
            .finish()
    }
}

impl DataEnvironment {
    pub fn new(fetcher: Arc<dyn Fetcher>, user: User) -> Self {
        Self {
            fetcher,
            user,
            records: Mutex::new(vec![]),
            in_flight: Mutex::new(vec![]),
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<Value> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.key == key)
            .map(|record| record.payload.clone())
    }

    fn store(&self, key: String, response: FetchResponse) {
        let mut records = self.records.lock().unwrap();
        // two deferred fetches of the same operation may race; keep the first
        if records.iter().all(|record| record.key != key) {
            records.push(CacheRecord {
                key,
                payload: response.payload,
                transport: response.transport,
            });
        }
    }

    /// Cache-first fetch, awaited in place.
    pub async fn fetch(&self, operation: &Operation) -> Result<Value, FetchError> {
        let key = operation.cache_key();
        if let Some(payload) = self.lookup(&key) {
            debug!(%key, "cache hit");
            return Ok(payload);
        }
        debug!(%key, "fetching");
        let response = self.fetcher.fetch(&self.user, operation).await?;
        let payload = response.payload.clone();
        self.store(key, response);
        Ok(payload)
    }

    /// Returns cached data or dispatches a background fetch for it. Called
    /// from inside the synchronous render pass; `settled` collects the work.
    pub fn preload(self: &Arc<Self>, operation: Operation) -> Result<Option<Value>, FetchError> {
        let key = operation.cache_key();
        if let Some(payload) = self.lookup(&key) {
            return Ok(Some(payload));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| FetchError::NoRuntime(operation.name.clone()))?;
        if !self.pending.lock().unwrap().insert(key.clone()) {
            debug!(%key, "deferred fetch already dispatched");
            return Ok(None);
        }
        debug!(%key, "dispatching deferred fetch");
        let environment = Arc::clone(self);
        let task = runtime.spawn(async move {
            let result = environment
                .fetcher
                .fetch(&environment.user, &operation)
                .await;
            let stored = result.map(|response| environment.store(key.clone(), response));
            environment.pending.lock().unwrap().remove(&key);
            stored
        });
        self.in_flight.lock().unwrap().push(task);
        Ok(None)
    }

    /// Waits for every dispatched fetch. Fetches dispatched while waiting
    /// are awaited too.
    pub async fn settled(&self) -> Result<(), FetchError> {
        loop {
            let tasks: Vec<_> = self.in_flight.lock().unwrap().drain(..).collect();
            if tasks.is_empty() {
                return Ok(());
            }
            for task in tasks {
                task.await??;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<CacheRecord> {
        self.records.lock().unwrap().clone()
    }
}

/// Strips transport details and internal `_res` annotations so the cache
/// can be handed to the client as `[[cacheKey, payload], ...]`.
pub fn sanitize(records: Vec<CacheRecord>) -> Value {
    Value::Array(
        records
            .into_iter()
            .map(|record| {
                let mut payload = record.payload;
                if let Value::Object(fields) = &mut payload {
                    fields.remove("_res");
                }
                Value::Array(vec![Value::String(record.key), payload])
            })
            .collect(),
    )
}
