//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query
//! handlers. The two webhook endpoints are deliberately infallible at
//! the HTTP level: decode or handler failures are logged and the vendor
//! still gets a success status, because both stores retry on anything
//! else and a poisoned delivery would retry forever.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::Value as JsonValue;

use crate::adapters::app_store::AppStoreNotificationVerifier;
use crate::adapters::google_play::GooglePlayNotificationVerifier;
use crate::application::handlers::notifications::{
    AppStoreWebhookHandler, GooglePlayWebhookHandler, HandleAppStoreNotificationCommand,
    HandleGooglePlayNotificationCommand,
};
use crate::application::handlers::purchase::{
    MakePurchaseCommand, MakePurchaseHandler, MakePurchaseResult, PurchaseStrategyFactory,
    StrategyServices,
};
use crate::application::handlers::subscription::{
    ApplyPaidTransactionHandler, GetSubscriptionHandler, GetSubscriptionQuery,
};
use crate::domain::foundation::{CommandMetadata, DomainError, ErrorCode, UserId};
use crate::domain::ledger::PurchaseError;
use crate::domain::subscription::SubscriptionError;
use crate::ports::{
    AppStoreClient, BuyableRepository, EventPublisher, GooglePlayClient, PurchaseLedger,
    SubscriptionRepository,
};

use super::dto::{
    ErrorResponse, PurchaseRequest, PurchaseResponse, PurchaseSubscriptionResponse,
    SubscriptionResponse, TransactionResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped dependencies
/// for efficient sharing across handlers.
#[derive(Clone)]
pub struct BillingAppState {
    pub buyable_repository: Arc<dyn BuyableRepository>,
    pub subscription_repository: Arc<dyn SubscriptionRepository>,
    pub purchase_ledger: Arc<dyn PurchaseLedger>,
    pub google_play_client: Arc<dyn GooglePlayClient>,
    pub app_store_client: Arc<dyn AppStoreClient>,
    pub event_publisher: Arc<dyn EventPublisher>,
    /// Verify receipts against the vendor APIs instead of trusting
    /// client metadata.
    pub live_verification: bool,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    fn apply_paid_transaction_handler(&self) -> Arc<ApplyPaidTransactionHandler> {
        Arc::new(ApplyPaidTransactionHandler::new(
            self.buyable_repository.clone(),
            self.subscription_repository.clone(),
            self.event_publisher.clone(),
        ))
    }

    pub fn make_purchase_handler(&self) -> MakePurchaseHandler {
        let services = StrategyServices {
            buyables: self.buyable_repository.clone(),
            subscriptions: self.subscription_repository.clone(),
            ledger: self.purchase_ledger.clone(),
        };
        let strategies = PurchaseStrategyFactory::new(
            services,
            self.google_play_client.clone(),
            self.app_store_client.clone(),
            self.live_verification,
        );
        MakePurchaseHandler::new(
            strategies,
            self.buyable_repository.clone(),
            self.subscription_repository.clone(),
            self.purchase_ledger.clone(),
            self.apply_paid_transaction_handler(),
            self.event_publisher.clone(),
        )
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(
            self.subscription_repository.clone(),
            self.buyable_repository.clone(),
        )
    }

    pub fn google_play_webhook_handler(&self) -> GooglePlayWebhookHandler {
        GooglePlayWebhookHandler::new(
            self.purchase_ledger.clone(),
            self.subscription_repository.clone(),
            self.buyable_repository.clone(),
            self.google_play_client.clone(),
            self.event_publisher.clone(),
        )
    }

    pub fn app_store_webhook_handler(&self) -> AppStoreWebhookHandler {
        AppStoreWebhookHandler::new(
            self.purchase_ledger.clone(),
            self.subscription_repository.clone(),
            self.buyable_repository.clone(),
            self.event_publisher.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context (extracted from the upstream gateway header)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from request.
///
/// The upstream gateway authenticates the caller and forwards the
/// identity as an `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| UserId::new(s).ok())
                .ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser { user_id })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/purchases - Record a store purchase from a submitted receipt
pub async fn submit_purchase(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    if let Err((field, message)) = request.validate() {
        return Err(PurchaseError::validation(field, message).into());
    }

    let handler = state.make_purchase_handler();
    let cmd = MakePurchaseCommand {
        store: request.store,
        transaction_id: request.transaction_id,
        product_key: request.product_key,
        raw_product_data: request.raw_product_data,
        stored_payment_method_id: request.stored_payment_method_id,
    };
    let metadata = CommandMetadata::new(user.user_id).with_source("http");

    let result = handler.handle(cmd, metadata).await?;

    let (status, response) = match result {
        MakePurchaseResult::Recorded {
            transaction,
            subscription,
        } => (
            StatusCode::CREATED,
            PurchaseResponse {
                status: "recorded",
                transaction: Some(TransactionResponse::from(&transaction)),
                subscription: subscription
                    .as_ref()
                    .map(PurchaseSubscriptionResponse::from),
            },
        ),
        MakePurchaseResult::AlreadyProcessed => (
            StatusCode::OK,
            PurchaseResponse {
                status: "already_processed",
                transaction: None,
                subscription: None,
            },
        ),
    };

    Ok((status, Json(response)))
}

/// POST /api/webhooks/google-play - Handle Google Play Pub/Sub pushes
///
/// Always acknowledges, whatever happened inside.
pub async fn handle_google_play_webhook(
    State(state): State<BillingAppState>,
    Json(body): Json<JsonValue>,
) -> StatusCode {
    tracing::debug!(body = %body, "Google Play webhook received");

    let event = match GooglePlayNotificationVerifier::parse(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, body = %body, "Undecodable Google Play notification");
            return StatusCode::OK;
        }
    };

    let handler = state.google_play_webhook_handler();
    match handler
        .handle(HandleGooglePlayNotificationCommand {
            event,
            raw_body: body,
        })
        .await
    {
        Ok(outcome) => {
            tracing::info!(action = outcome.action(), "Google Play notification handled");
        }
        Err(e) => {
            tracing::error!(error = %e, "Google Play notification failed");
        }
    }
    StatusCode::OK
}

/// POST /api/webhooks/app-store - Handle App Store server notifications
///
/// Always acknowledges, whatever happened inside.
pub async fn handle_app_store_webhook(
    State(state): State<BillingAppState>,
    Json(body): Json<JsonValue>,
) -> StatusCode {
    tracing::debug!(body = %body, "App Store webhook received");

    let event = match AppStoreNotificationVerifier::parse(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, "Undecodable App Store notification");
            return StatusCode::OK;
        }
    };

    let handler = state.app_store_webhook_handler();
    match handler
        .handle(HandleAppStoreNotificationCommand {
            event,
            raw_body: body,
        })
        .await
    {
        Ok(outcome) => {
            tracing::info!(action = outcome.action(), "App Store notification handled");
        }
        Err(e) => {
            tracing::error!(error = %e, "App Store notification failed");
        }
    }
    StatusCode::OK
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/subscription - Get current user's reconciled subscription
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.get_subscription_handler();
    let view = handler
        .handle(GetSubscriptionQuery {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(SubscriptionResponse::from(view)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts domain errors to HTTP responses.
pub enum BillingApiError {
    Purchase(PurchaseError),
    Subscription(SubscriptionError),
}

impl From<PurchaseError> for BillingApiError {
    fn from(err: PurchaseError) -> Self {
        Self::Purchase(err)
    }
}

impl From<SubscriptionError> for BillingApiError {
    fn from(err: SubscriptionError) -> Self {
        Self::Subscription(err)
    }
}

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self::Purchase(PurchaseError::infrastructure(err.to_string()))
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match &self {
            BillingApiError::Purchase(err) => {
                let status = match err {
                    PurchaseError::BuyableNotFound(_)
                    | PurchaseError::PurchaseNotFound(_)
                    | PurchaseError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
                    PurchaseError::EmptyReceipt
                    | PurchaseError::InvalidReceipt { .. }
                    | PurchaseError::UnsupportedVendor(_)
                    | PurchaseError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
                    PurchaseError::ActiveSubscriptionExists(_) => StatusCode::CONFLICT,
                    PurchaseError::StoreProvider { .. } => StatusCode::BAD_GATEWAY,
                    PurchaseError::VerificationNotSatisfied
                    | PurchaseError::Internal(_)
                    | PurchaseError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error_code_for(err.code()), err.message())
            }
            BillingApiError::Subscription(err) => {
                let status = match err {
                    SubscriptionError::NotFound(_) | SubscriptionError::NoSubscription(_) => {
                        StatusCode::NOT_FOUND
                    }
                    SubscriptionError::SubscriptionExists(_) => StatusCode::CONFLICT,
                    SubscriptionError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
                    SubscriptionError::NotASubscription(_)
                    | SubscriptionError::Internal(_)
                    | SubscriptionError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error_code_for(err.code()), err.message())
            }
        };

        let body = ErrorResponse::new(error_code, message);
        (status, Json(body)).into_response()
    }
}

/// Stable wire code for an error category.
fn error_code_for(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::ValidationFailed
        | ErrorCode::EmptyField
        | ErrorCode::OutOfRange
        | ErrorCode::InvalidFormat => "VALIDATION_FAILED",
        ErrorCode::InvalidReceipt | ErrorCode::EmptyReceipt => "INVALID_RECEIPT",
        ErrorCode::UnsupportedVendor => "UNSUPPORTED_VENDOR",
        ErrorCode::VerificationFailed | ErrorCode::VerificationPrerequisiteNotSatisfied => {
            "VERIFICATION_FAILED"
        }
        ErrorCode::BuyableNotFound => "BUYABLE_NOT_FOUND",
        ErrorCode::PurchaseNotFound => "PURCHASE_NOT_FOUND",
        ErrorCode::TransactionNotFound => "TRANSACTION_NOT_FOUND",
        ErrorCode::SubscriptionNotFound => "NO_SUBSCRIPTION",
        ErrorCode::ActiveSubscriptionExists | ErrorCode::SubscriptionExists => {
            "ACTIVE_SUBSCRIPTION_EXISTS"
        }
        ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
        ErrorCode::Unauthorized => "UNAUTHORIZED",
        ErrorCode::Forbidden => "FORBIDDEN",
        ErrorCode::StoreProviderError => "STORE_PROVIDER_ERROR",
        ErrorCode::DatabaseError | ErrorCode::InternalError => "INTERNAL_ERROR",
    }
}
