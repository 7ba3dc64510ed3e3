//! Bid confirmation: create a bidder position, then poll it until the
//! server settles it or the attempt budget runs out.
//!
//! Outcomes never come back to the caller as errors. They are reported
//! through the [`BidForm`] the submission came from and the tracking sink.

mod error;
mod lifecycle;

pub use error::{ErrorMessage, MutationError};
pub use lifecycle::{Lifecycle, LifecycleGuard};

use crate::models::{
    BidderPositionSnapshot, CreateBidderPositionInput, CreateBidderPositionResult,
    MutationStatus, PositionStatus, User,
};
use crate::render::FetchError;
use crate::tracking::{Product, TrackingEvent, TrackingSink};

use atelier_shared::FormStatus;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const MAX_POLL_ATTEMPTS: u32 = 20;
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[async_trait]
pub trait BidderPositions: Send + Sync {
    async fn create_bidder_position(
        &self,
        user: &User,
        input: &CreateBidderPositionInput,
    ) -> Result<CreateBidderPositionResult, MutationError>;

    async fn bidder_position(
        &self,
        user: &User,
        position_id: &str,
    ) -> Result<BidderPositionSnapshot, FetchError>;
}

/// Side effects a submission reports back to the form that started it.
pub trait BidForm: Send + Sync {
    fn set_submitting(&self, submitting: bool);
    fn set_status(&self, status: FormStatus);
    /// Full document navigation; ends the page the form lives on.
    fn navigate(&self, url: &str);
}

#[derive(Clone, Debug, PartialEq)]
pub struct BidRequest {
    pub user: User,
    pub sale_id: String,
    pub artwork_id: String,
    pub artwork_slug: String,
    pub bidder_id: Option<String>,
    pub max_bid_amount_cents: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Winning { position_id: String },
    Outbid { position_id: String },
    Failed { position_id: String, status: String },
    Exhausted { position_id: String },
    CreationRejected,
    CreationFailed,
    PollFailed,
    Cancelled,
}

/// Polling bookkeeping for one submission.
#[derive(Clone, Debug, PartialEq)]
pub struct PollState {
    pub attempts: u32,
    pub max_attempts: u32,
    pub position_id: String,
    pub max_bid_amount_cents: i64,
}

impl PollState {
    pub fn new(position_id: String, max_bid_amount_cents: i64) -> Self {
        Self {
            attempts: 0,
            max_attempts: MAX_POLL_ATTEMPTS,
            position_id,
            max_bid_amount_cents,
        }
    }
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

pub struct ConfirmBid {
    positions: Arc<dyn BidderPositions>,
    tracker: Arc<dyn TrackingSink>,
    app_origin: String,
}

impl ConfirmBid {
    pub fn new(
        positions: Arc<dyn BidderPositions>,
        tracker: Arc<dyn TrackingSink>,
        app_origin: String,
    ) -> Self {
        Self {
            positions,
            tracker,
            app_origin: app_origin.trim_end_matches('/').to_string(),
        }
    }

    /// Fire and forget. The caller keeps the form from submitting twice.
    pub fn submit_bid(
        self: &Arc<Self>,
        bid: BidRequest,
        form: Arc<dyn BidForm>,
        lifecycle: Lifecycle,
    ) -> JoinHandle<Outcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.confirm(bid, form.as_ref(), lifecycle).await })
    }

    pub async fn confirm(&self, bid: BidRequest, form: &dyn BidForm, lifecycle: Lifecycle) -> Outcome {
        let outcome = self.run(&bid, form, lifecycle).await;
        info!(
            sale_id = %bid.sale_id,
            artwork_id = %bid.artwork_id,
            amount_cents = bid.max_bid_amount_cents,
            ?outcome,
            "bid confirmation finished"
        );
        outcome
    }

    async fn run(&self, bid: &BidRequest, form: &dyn BidForm, mut lifecycle: Lifecycle) -> Outcome {
        let input = CreateBidderPositionInput {
            sale_id: bid.sale_id.clone(),
            artwork_id: bid.artwork_id.clone(),
            max_bid_amount_cents: bid.max_bid_amount_cents,
        };
        let created = match unless_cancelled(
            &mut lifecycle,
            self.positions.create_bidder_position(&bid.user, &input),
        )
        .await
        {
            None => return Outcome::Cancelled,
            Some(Ok(created)) => created,
            Some(Err(err)) => {
                error!(error = %err, "could not create bidder position");
                self.fail(form, bid.bidder_id.clone(), err.messages(), FormStatus::SubmissionFailed);
                return Outcome::CreationFailed;
            }
        };

        let position = match (created.status, created.position) {
            (MutationStatus::Success, Some(position)) => position,
            (status, _) => {
                warn!(?status, message = ?created.message_header, "bidder position was not created");
                self.fail(
                    form,
                    bid.bidder_id.clone(),
                    vec![created
                        .message_header
                        .unwrap_or_else(|| "createBidderPosition failed".to_string())],
                    FormStatus::SubmissionFailed,
                );
                return Outcome::CreationRejected;
            }
        };
        let bidder_id = position
            .bidder_id()
            .map(str::to_string)
            .or_else(|| bid.bidder_id.clone());

        let mut poll = PollState::new(position.id, bid.max_bid_amount_cents);
        loop {
            if lifecycle.is_cancelled() {
                return Outcome::Cancelled;
            }
            let snapshot = match unless_cancelled(
                &mut lifecycle,
                self.positions.bidder_position(&bid.user, &poll.position_id),
            )
            .await
            {
                None => return Outcome::Cancelled,
                Some(result) => result,
            };
            // the form may have gone away while the request was in flight
            if lifecycle.is_cancelled() {
                return Outcome::Cancelled;
            }
            poll.attempts += 1;

            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    error!(error = %err, position_id = %poll.position_id, "could not poll bidder position");
                    form.set_submitting(false);
                    form.set_status(FormStatus::SubmissionFailed);
                    return Outcome::PollFailed;
                }
            };
            poll.position_id = snapshot.position.id;
            debug!(attempt = poll.attempts, status = %snapshot.status, "polled bidder position");

            match snapshot.status {
                PositionStatus::Pending if poll.has_attempts_left() => {
                    let sleep = tokio::time::sleep(POLL_INTERVAL);
                    if unless_cancelled(&mut lifecycle, sleep).await.is_none() {
                        return Outcome::Cancelled;
                    }
                }
                PositionStatus::Pending => {
                    self.tracker.track(TrackingEvent::ConfirmBidUnresolved {
                        bidder_id,
                        bidder_position_id: poll.position_id.clone(),
                        attempts: poll.attempts,
                    });
                    form.set_submitting(false);
                    form.set_status(FormStatus::Unresolved);
                    return Outcome::Exhausted {
                        position_id: poll.position_id,
                    };
                }
                PositionStatus::Winning => {
                    self.tracker.track(TrackingEvent::ConfirmBidSubmitted {
                        bidder_position_id: poll.position_id.clone(),
                        order_id: bidder_id.clone(),
                        bidder_id,
                        products: vec![Product {
                            product_id: bid.artwork_id.clone(),
                            quantity: 1,
                            price: poll.max_bid_amount_cents as f64 / 100.0,
                        }],
                    });
                    form.navigate(&format!("{}/artwork/{}", self.app_origin, bid.artwork_slug));
                    return Outcome::Winning {
                        position_id: poll.position_id,
                    };
                }
                PositionStatus::Outbid => {
                    self.fail(
                        form,
                        bidder_id,
                        vec!["OUTBID".to_string()],
                        FormStatus::Outbid,
                    );
                    return Outcome::Outbid {
                        position_id: poll.position_id,
                    };
                }
                PositionStatus::Failed(status) => {
                    self.fail(
                        form,
                        bidder_id,
                        vec![status.clone()],
                        FormStatus::SubmissionFailed,
                    );
                    return Outcome::Failed {
                        position_id: poll.position_id,
                        status,
                    };
                }
            }
        }
    }

    fn fail(
        &self,
        form: &dyn BidForm,
        bidder_id: Option<String>,
        error_messages: Vec<String>,
        status: FormStatus,
    ) {
        self.tracker.track(TrackingEvent::ConfirmBidFailed {
            bidder_id,
            error_messages,
        });
        form.set_submitting(false);
        form.set_status(status);
    }
}

async fn unless_cancelled<F: Future>(lifecycle: &mut Lifecycle, future: F) -> Option<F::Output> {
    tokio::select! {
        output = future => Some(output),
        _ = lifecycle.cancelled() => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreatedPosition, InternalRef, SaleArtworkRef, SaleRef};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct ScriptedPositions {
        creation: Mutex<Option<Result<CreateBidderPositionResult, MutationError>>>,
        polls: Mutex<VecDeque<Result<PositionStatus, FetchError>>>,
        poll_times: Mutex<Vec<Instant>>,
        // time each poll request spends in flight
        latency: Mutex<Duration>,
        // cancelled by the next poll, right as its response comes back
        cancel_on_poll: Mutex<Option<LifecycleGuard>>,
    }

    impl ScriptedPositions {
        fn new(
            creation: Result<CreateBidderPositionResult, MutationError>,
            polls: Vec<Result<PositionStatus, FetchError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                creation: Mutex::new(Some(creation)),
                polls: Mutex::new(polls.into()),
                poll_times: Mutex::new(vec![]),
                latency: Mutex::new(Duration::ZERO),
                cancel_on_poll: Mutex::new(None),
            })
        }
        fn polls_issued(&self) -> usize {
            self.poll_times.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BidderPositions for ScriptedPositions {
        async fn create_bidder_position(
            &self,
            _user: &User,
            input: &CreateBidderPositionInput,
        ) -> Result<CreateBidderPositionResult, MutationError> {
            assert_eq!(input.max_bid_amount_cents, 500_000);
            self.creation
                .lock()
                .unwrap()
                .take()
                .expect("bidder position created twice")
        }

        async fn bidder_position(
            &self,
            _user: &User,
            position_id: &str,
        ) -> Result<BidderPositionSnapshot, FetchError> {
            self.poll_times.lock().unwrap().push(Instant::now());
            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(guard) = self.cancel_on_poll.lock().unwrap().take() {
                guard.cancel();
            }
            let status = self
                .polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PositionStatus::Pending))?;
            Ok(BidderPositionSnapshot {
                status,
                position: InternalRef {
                    id: position_id.to_string(),
                },
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TrackingEvent>>,
        submitting: Mutex<Vec<bool>>,
        statuses: Mutex<Vec<FormStatus>>,
        navigations: Mutex<Vec<String>>,
    }

    impl TrackingSink for Recorder {
        fn track(&self, event: TrackingEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl BidForm for Recorder {
        fn set_submitting(&self, submitting: bool) {
            self.submitting.lock().unwrap().push(submitting);
        }
        fn set_status(&self, status: FormStatus) {
            self.statuses.lock().unwrap().push(status);
        }
        fn navigate(&self, url: &str) {
            self.navigations.lock().unwrap().push(url.to_string());
        }
    }

    fn created(status: &str) -> Result<CreateBidderPositionResult, MutationError> {
        Ok(CreateBidderPositionResult {
            status: MutationStatus::from(status.to_string()),
            position: Some(CreatedPosition {
                id: "position-1".to_string(),
                sale_artwork: Some(SaleArtworkRef {
                    sale: Some(SaleRef {
                        registration_status: Some(InternalRef {
                            id: "bidder-1".to_string(),
                        }),
                    }),
                }),
            }),
            message_header: None,
        })
    }

    fn bid() -> BidRequest {
        BidRequest {
            user: User::anonymous(),
            sale_id: "sale-1".to_string(),
            artwork_id: "artwork-1".to_string(),
            artwork_slug: "andy-warhol-skull".to_string(),
            bidder_id: None,
            max_bid_amount_cents: 500_000,
        }
    }

    fn workflow(positions: Arc<ScriptedPositions>, recorder: Arc<Recorder>) -> Arc<ConfirmBid> {
        Arc::new(ConfirmBid::new(
            positions,
            recorder,
            "https://atelier.test/".to_string(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn winning_after_two_delayed_polls_navigates() {
        let positions = ScriptedPositions::new(
            created("SUCCESS"),
            vec![
                Ok(PositionStatus::Pending),
                Ok(PositionStatus::Pending),
                Ok(PositionStatus::Winning),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        let (_guard, lifecycle) = Lifecycle::new();

        let outcome = workflow(positions.clone(), recorder.clone())
            .confirm(bid(), recorder.as_ref(), lifecycle)
            .await;

        assert_eq!(
            outcome,
            Outcome::Winning {
                position_id: "position-1".to_string()
            }
        );
        let times = positions.poll_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], POLL_INTERVAL);
        assert_eq!(times[2] - times[1], POLL_INTERVAL);
        assert_eq!(
            *recorder.navigations.lock().unwrap(),
            vec!["https://atelier.test/artwork/andy-warhol-skull".to_string()]
        );
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![TrackingEvent::ConfirmBidSubmitted {
                bidder_position_id: "position-1".to_string(),
                bidder_id: Some("bidder-1".to_string()),
                order_id: Some("bidder-1".to_string()),
                products: vec![Product {
                    product_id: "artwork-1".to_string(),
                    quantity: 1,
                    price: 5000.0,
                }],
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_twenty_pending_polls() {
        let positions = ScriptedPositions::new(created("SUCCESS"), vec![]);
        let recorder = Arc::new(Recorder::default());
        let (_guard, lifecycle) = Lifecycle::new();

        let outcome = workflow(positions.clone(), recorder.clone())
            .confirm(bid(), recorder.as_ref(), lifecycle)
            .await;

        assert!(matches!(outcome, Outcome::Exhausted { .. }));
        assert_eq!(positions.polls_issued(), MAX_POLL_ATTEMPTS as usize);
        assert!(recorder.navigations.lock().unwrap().is_empty());
        assert_eq!(*recorder.statuses.lock().unwrap(), vec![FormStatus::Unresolved]);
        assert!(matches!(
            recorder.events.lock().unwrap()[0],
            TrackingEvent::ConfirmBidUnresolved { attempts: 20, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_creation_never_polls() {
        let positions = ScriptedPositions::new(created("BIDDER_NOT_QUALIFIED"), vec![]);
        let recorder = Arc::new(Recorder::default());
        let (_guard, lifecycle) = Lifecycle::new();

        let outcome = workflow(positions.clone(), recorder.clone())
            .confirm(bid(), recorder.as_ref(), lifecycle)
            .await;

        assert_eq!(outcome, Outcome::CreationRejected);
        assert_eq!(positions.polls_issued(), 0);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![TrackingEvent::ConfirmBidFailed {
                bidder_id: None,
                error_messages: vec!["createBidderPosition failed".to_string()],
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn creation_error_reports_normalised_messages() {
        let positions = ScriptedPositions::new(
            Err(MutationError::Text("Sale is closed".to_string())),
            vec![],
        );
        let recorder = Arc::new(Recorder::default());
        let (_guard, lifecycle) = Lifecycle::new();
        let mut request = bid();
        request.bidder_id = Some("bidder-0".to_string());

        let outcome = workflow(positions.clone(), recorder.clone())
            .confirm(request, recorder.as_ref(), lifecycle)
            .await;

        assert_eq!(outcome, Outcome::CreationFailed);
        assert_eq!(positions.polls_issued(), 0);
        assert_eq!(*recorder.submitting.lock().unwrap(), vec![false]);
        assert_eq!(
            *recorder.statuses.lock().unwrap(),
            vec![FormStatus::SubmissionFailed]
        );
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![TrackingEvent::ConfirmBidFailed {
                bidder_id: Some("bidder-0".to_string()),
                error_messages: vec!["Sale is closed".to_string()],
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn outbid_is_reported() {
        let positions = ScriptedPositions::new(
            created("SUCCESS"),
            vec![Ok(PositionStatus::Pending), Ok(PositionStatus::Outbid)],
        );
        let recorder = Arc::new(Recorder::default());
        let (_guard, lifecycle) = Lifecycle::new();

        let outcome = workflow(positions, recorder.clone())
            .confirm(bid(), recorder.as_ref(), lifecycle)
            .await;

        assert!(matches!(outcome, Outcome::Outbid { .. }));
        assert_eq!(*recorder.statuses.lock().unwrap(), vec![FormStatus::Outbid]);
        assert!(recorder.navigations.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_ends_the_attempt() {
        let positions = ScriptedPositions::new(
            created("SUCCESS"),
            vec![
                Ok(PositionStatus::Pending),
                Err(FetchError::Missing("me.bidderPosition")),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        let (_guard, lifecycle) = Lifecycle::new();

        let outcome = workflow(positions.clone(), recorder.clone())
            .confirm(bid(), recorder.as_ref(), lifecycle)
            .await;

        assert_eq!(outcome, Outcome::PollFailed);
        assert_eq!(positions.polls_issued(), 2);
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_stops_scheduled_polls() {
        let positions = ScriptedPositions::new(created("SUCCESS"), vec![]);
        let recorder = Arc::new(Recorder::default());
        let (guard, lifecycle) = Lifecycle::new();

        let task = workflow(positions.clone(), recorder.clone()).submit_bid(
            bid(),
            recorder.clone(),
            lifecycle,
        );
        tokio::time::sleep(POLL_INTERVAL * 3 + POLL_INTERVAL / 2).await;
        drop(guard);

        assert_eq!(task.await.unwrap(), Outcome::Cancelled);
        assert_eq!(positions.polls_issued(), 4);
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(recorder.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_during_poll_request_discards_its_result() {
        let positions = ScriptedPositions::new(created("SUCCESS"), vec![Ok(PositionStatus::Winning)]);
        *positions.latency.lock().unwrap() = Duration::from_millis(500);
        let recorder = Arc::new(Recorder::default());
        let (guard, lifecycle) = Lifecycle::new();

        let task = workflow(positions.clone(), recorder.clone()).submit_bid(
            bid(),
            recorder.clone(),
            lifecycle,
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(positions.polls_issued(), 1);
        drop(guard);

        assert_eq!(task.await.unwrap(), Outcome::Cancelled);
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(recorder.navigations.lock().unwrap().is_empty());
        assert!(recorder.statuses.lock().unwrap().is_empty());
        assert!(recorder.submitting.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn response_arriving_with_cancellation_is_not_applied() {
        let positions = ScriptedPositions::new(created("SUCCESS"), vec![Ok(PositionStatus::Winning)]);
        let recorder = Arc::new(Recorder::default());
        let (guard, lifecycle) = Lifecycle::new();
        *positions.cancel_on_poll.lock().unwrap() = Some(guard);

        let outcome = workflow(positions.clone(), recorder.clone())
            .confirm(bid(), recorder.as_ref(), lifecycle)
            .await;

        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(positions.polls_issued(), 1);
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(recorder.navigations.lock().unwrap().is_empty());
        assert!(recorder.statuses.lock().unwrap().is_empty());
    }
}
