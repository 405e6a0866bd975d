//! The purchase saga record.

use chrono::{DateTime, Utc};
use common::{CorrelationId, Gil, ItemId, UserId};
use saga_store::Version;
use serde::{Deserialize, Serialize};

use crate::messages::{PurchaseRequested, PurchaseStatusUpdate};
use crate::state::SagaState;

/// Saga type name under which purchase records are stored.
pub const SAGA_TYPE: &str = "PurchaseSaga";

/// The persistent state of one purchase attempt.
///
/// Everything except `version` is stored in the saga document; the version
/// is the store's concurrency token and is filled in on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSaga {
    correlation_id: CorrelationId,
    user_id: UserId,
    item_id: ItemId,
    quantity: u32,
    /// Absent until the total has been calculated.
    purchase_total: Option<Gil>,
    current_state: SagaState,
    /// Set only on the transition into Faulted.
    error_message: Option<String>,
    received: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    #[serde(skip)]
    version: Version,
}

impl PurchaseSaga {
    /// Creates the record for a first-seen purchase request, still in Initial.
    pub(crate) fn from_request(request: &PurchaseRequested, now: DateTime<Utc>) -> Self {
        Self {
            correlation_id: request.correlation_id,
            user_id: request.user_id,
            item_id: request.item_id,
            quantity: request.quantity,
            purchase_total: None,
            current_state: SagaState::Initial,
            error_message: None,
            received: now,
            last_updated: now,
            version: Version::initial(),
        }
    }

    pub(crate) fn accept(&mut self, total: Gil, now: DateTime<Utc>) {
        self.purchase_total = Some(total);
        self.move_to(SagaState::Accepted, now);
    }

    pub(crate) fn fault(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.error_message = Some(message.into());
        self.move_to(SagaState::Faulted, now);
    }

    pub(crate) fn move_to(&mut self, state: SagaState, now: DateTime<Utc>) {
        self.current_state = state;
        self.last_updated = now;
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Builds the notification pushed to the owning user.
    pub fn status_update(&self) -> PurchaseStatusUpdate {
        PurchaseStatusUpdate {
            correlation_id: self.correlation_id,
            user_id: self.user_id,
            current_state: self.current_state,
            error_message: self.error_message.clone(),
            last_updated: self.last_updated,
        }
    }

    /// Returns true if a request carries the same purchase as this record.
    pub fn matches_request(&self, request: &PurchaseRequested) -> bool {
        self.user_id == request.user_id
            && self.item_id == request.item_id
            && self.quantity == request.quantity
    }
}

// Query methods
impl PurchaseSaga {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Returns the purchase total, if it has been calculated.
    pub fn purchase_total(&self) -> Option<Gil> {
        self.purchase_total
    }

    pub fn current_state(&self) -> SagaState {
        self.current_state
    }

    /// Returns the error message, present only when Faulted.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn received(&self) -> DateTime<Utc> {
        self.received
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Returns the store version this record was loaded at.
    pub fn version(&self) -> Version {
        self.version
    }
}
