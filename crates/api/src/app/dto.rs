use std::fmt::Display;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_accounting::CashFlowCategory;
use stockledger_catalog::{Attributes, NewVariation, VariantKey};
use stockledger_core::{AggregateId, Money};
use stockledger_debts::DebtDirection;
use stockledger_infra::event_store::StoredEvent;
use stockledger_infra::workflows::NewPurchaseLine;
use stockledger_parties::{ContactInfo, PartyId, PartyKind};
use stockledger_purchasing::ReceivedQuantity;
use stockledger_storage::StorageId;

use crate::app::errors::ApiError;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub variations: Vec<NewVariation>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVariationRequest {
    pub attributes: Option<Attributes>,
    pub sale_price: Option<Money>,
    pub purchase_cost: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStorageRequest {
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<u64>,
}

/// `name` renames; `capacity` sets a limit; `unlimited` removes it.
#[derive(Debug, Deserialize)]
pub struct UpdateStorageRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<u64>,
    #[serde(default)]
    pub unlimited: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub key: VariantKey,
    pub delta: i64,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from: StorageId,
    pub to: StorageId,
    pub key: VariantKey,
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePartyRequest {
    pub kind: PartyKind,
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePartyRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub contact: ContactInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    pub supplier_id: PartyId,
    pub reference: Option<String>,
    #[serde(default)]
    pub lines: Vec<NewPurchaseLine>,
}

#[derive(Debug, Deserialize)]
pub struct ReceivePurchaseRequest {
    pub lines: Vec<ReceivedQuantity>,
    #[serde(default)]
    pub paid_on_receipt: Money,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub line_no: u32,
    pub storage_id: StorageId,
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSaleRequest {
    pub customer_id: Option<PartyId>,
}

#[derive(Debug, Deserialize)]
pub struct AddSaleLineRequest {
    pub key: VariantKey,
    pub storage_id: StorageId,
    pub quantity: u64,
    /// Defaults to the variation's sale price.
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub discount: Money,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteSaleRequest {
    #[serde(default)]
    pub paid_amount: Money,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct OpenDebtRequest {
    pub direction: DebtDirection,
    pub party_id: PartyId,
    pub principal: Money,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RepaymentRequest {
    pub amount: Money,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WriteOffRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct EntryLineRequest {
    /// Chart code, e.g. `"1000"`.
    pub account: String,
    pub amount: Money,
    pub is_debit: bool,
}

#[derive(Debug, Deserialize)]
pub struct PostEntryRequest {
    pub posted_on: Option<NaiveDate>,
    pub description: String,
    #[serde(default)]
    pub category: CashFlowCategory,
    pub lines: Vec<EntryLineRequest>,
}

// -------------------------
// Query parameters
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PartyListQuery {
    pub kind: Option<PartyKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

impl AsOfQuery {
    pub fn date(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
}

/// Reporting period; `to` defaults to today and `from` to 30 days before it.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl PeriodQuery {
    pub fn resolve(&self) -> Result<(NaiveDate, NaiveDate), ApiError> {
        let to = self.to.unwrap_or_else(|| Utc::now().date_naive());
        let from = match self.from {
            Some(from) => from,
            None => to.checked_sub_days(Days::new(30)).unwrap_or(to),
        };
        if from > to {
            return Err(ApiError::bad_request("`from` must not be after `to`"));
        }
        Ok((from, to))
    }
}

// -------------------------
// Responses and helpers
// -------------------------

/// Body of every successful command.
#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    pub id: String,
    pub events_committed: usize,
}

pub fn created(id: impl Display, events: &[StoredEvent]) -> Response {
    command_response(StatusCode::CREATED, id, events)
}

pub fn accepted(id: impl Display, events: &[StoredEvent]) -> Response {
    command_response(StatusCode::OK, id, events)
}

fn command_response(status: StatusCode, id: impl Display, events: &[StoredEvent]) -> Response {
    (
        status,
        Json(CommandAccepted {
            id: id.to_string(),
            events_committed: events.len(),
        }),
    )
        .into_response()
}

pub fn parse_id(raw: &str) -> Result<AggregateId, ApiError> {
    raw.parse::<AggregateId>().map_err(ApiError::from)
}
