//! # Domain Types
//!
//! Registries (products, warehouses, merchants) and sale transactions.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   Transaction   │   │ TransactionLine │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id             │   │  transaction_id │       │
//! │  │  name           │   │  invoice_code   │   │  product_id     │       │
//! │  │  price_cents    │   │  merchant_id    │   │  qty            │       │
//! │  │  category_id    │   │  status         │   │  unit_price     │       │
//! │  └─────────────────┘   │  totals         │   │  line_total     │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  TransactionStatus:  Pending ──► Paid | Failed | Cancelled (terminal)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::stock::{Location, StockMutation};

// =============================================================================
// Registries
// =============================================================================

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Current list price; sales copy it into their lines.
    pub price_cents: i64,
    pub category_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// A central warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Warehouse {
    pub id: String,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A merchant store that sells to customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Merchant {
    pub id: String,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Transaction Status
// =============================================================================

/// Lifecycle of a sale transaction.
///
/// ```text
///              ┌──► Paid
///   Pending ───┼──► Failed
///              └──► Cancelled   (restocks every line)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only Pending moves, and only to a terminal state.
    pub const fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next.is_terminal()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Pending
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Who bought. Stored alongside the transaction, not as a separate entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Payment details attached on PENDING → PAID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentInfo {
    pub method: Option<String>,
    pub reference: Option<String>,
    /// Gateway-specific key/values, kept verbatim.
    pub metadata: BTreeMap<String, String>,
}

/// A sale at a merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub invoice_code: String,
    pub merchant_id: String,
    pub status: TransactionStatus,
    pub customer: CustomerInfo,
    pub sub_total_cents: i64,
    pub tax_total_cents: i64,
    pub grand_total_cents: i64,
    pub payment: Option<PaymentInfo>,
    pub failure_reason: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[inline]
    pub fn sub_total(&self) -> Money {
        Money::from_cents(self.sub_total_cents)
    }

    #[inline]
    pub fn tax_total(&self) -> Money {
        Money::from_cents(self.tax_total_cents)
    }

    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }

    /// The merchant this sale drew stock from.
    pub fn location(&self) -> Location {
        Location::merchant(self.merchant_id.clone())
    }
}

/// A line of a sale. Price and name are frozen at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionLine {
    pub id: String,
    pub transaction_id: String,
    pub product_id: String,
    pub name_snapshot: String,
    pub qty: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl TransactionLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One requested checkout line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItemRequest {
    pub product_id: String,
    pub qty: i64,
}

impl LineItemRequest {
    pub fn new(product_id: impl Into<String>, qty: i64) -> Self {
        LineItemRequest {
            product_id: product_id.into(),
            qty,
        }
    }
}

/// Input to checkout creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    pub merchant_id: String,
    pub customer: CustomerInfo,
    pub lines: Vec<LineItemRequest>,
    pub tax_total_cents: Option<i64>,
    pub actor: String,
}

impl CheckoutRequest {
    pub fn new(
        merchant_id: impl Into<String>,
        lines: Vec<LineItemRequest>,
        actor: impl Into<String>,
    ) -> Self {
        CheckoutRequest {
            merchant_id: merchant_id.into(),
            customer: CustomerInfo::default(),
            lines,
            tax_total_cents: None,
            actor: actor.into(),
        }
    }

    pub fn with_customer(mut self, customer: CustomerInfo) -> Self {
        self.customer = customer;
        self
    }

    pub fn with_tax_total(mut self, tax: Money) -> Self {
        self.tax_total_cents = Some(tax.cents());
        self
    }
}

/// A committed sale: the transaction, its lines and their ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutReceipt {
    pub transaction: Transaction,
    pub lines: Vec<TransactionLine>,
    pub mutations: Vec<StockMutation>,
}

/// Input to the three transfer operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferRequest {
    pub product_id: String,
    pub amount: i64,
    pub note: Option<String>,
    pub actor: String,
}

impl TransferRequest {
    pub fn new(product_id: impl Into<String>, amount: i64, actor: impl Into<String>) -> Self {
        TransferRequest {
            product_id: product_id.into(),
            amount,
            note: None,
            actor: actor.into(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Both legs of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub product_id: String,
    pub source: Location,
    pub destination: Location,
    pub amount: i64,
    pub outbound: StockMutation,
    pub inbound: StockMutation,
}

// =============================================================================
// Unit Tests
// =============================================================================
