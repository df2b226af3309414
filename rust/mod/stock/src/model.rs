use serde::{Deserialize, Serialize};

use stockroom_core::looks_like_id;

/// Numeric id of the bot (storefront) that owns products, stock and categories.
pub type BotId = i64;

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub bot_id: BotId,
    pub name: String,
    pub create_at: String,
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// A sellable product. Identity is `(bot_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub bot_id: BotId,
    pub product_id: String,
    pub name: String,
    /// Positive, in the smallest currency unit.
    pub price: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub terms: String,
    /// Cumulative units sold. Survives identifier renames.
    #[serde(default)]
    pub sold: i64,
    pub create_at: String,
    pub update_at: String,
}

/// Input for creating a product.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub product_id: String,
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub terms: String,
}

/// Partial product update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub terms: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.description.is_none()
            && self.terms.is_none()
    }
}

/// A product with its live available-unit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock: u64,
}

// ---------------------------------------------------------------------------
// StockUnit
// ---------------------------------------------------------------------------

/// One single-use inventory item.
///
/// ```text
/// available (consumed=false, transaction_ref=None)
///     ⇄ consumed (consumed=true, transaction_ref=Some(ref))
/// ```
///
/// The way back to available is only the compensating release of the
/// same transaction reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUnit {
    pub id: String,
    pub bot_id: BotId,
    pub product_id: String,
    /// Opaque credential blob. Never parsed.
    pub payload: String,
    pub consumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,
    pub create_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<String>,
}

/// The units handed to one transaction by a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    pub transaction_ref: String,
    /// Claimed units, oldest first.
    pub units: Vec<StockUnit>,
}

impl AllocationResult {
    /// Payloads in claim order.
    pub fn payloads(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.payload.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Bulk ingestion / removal
// ---------------------------------------------------------------------------

/// Result of a bulk ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub inserted: Vec<StockUnit>,
    /// Available units for the product after the insert.
    pub available: u64,
}

/// One entry of a removal request, resolved once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalEntry {
    ById(String),
    ByPayload(String),
}

impl RemovalEntry {
    /// Entries shaped like a unit id match by id; anything else matches
    /// by exact payload.
    ///
    /// Ids are stored lowercase, so an id entry is lowercased here. A
    /// payload that is itself exactly 32 hex digits is always read as an
    /// id and cannot be removed by payload; remove it by its unit id.
    pub fn classify(entry: &str) -> Self {
        if looks_like_id(entry) {
            RemovalEntry::ById(entry.to_ascii_lowercase())
        } else {
            RemovalEntry::ByPayload(entry.to_string())
        }
    }
}

/// Result of a bulk removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalOutcome {
    /// Entries in the request.
    pub requested: usize,
    /// Units actually deleted. A payload entry removes every available
    /// unit carrying that payload, so this may differ from `requested`.
    pub removed: u64,
    /// Available units left for the product, oldest first.
    pub remaining: Vec<StockUnit>,
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A named, ordered list of product ids. Duplicates are kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub bot_id: BotId,
    pub name: String,
    pub product_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

/// Stock or memberships pointing at product ids with no product row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
    /// `(product_id, unit_count)` for orphaned stock, all states.
    pub stock: Vec<(String, u64)>,
    /// `(category, product_id)` for dangling memberships.
    pub category_refs: Vec<(String, String)>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.stock.is_empty() && self.category_refs.is_empty()
    }
}
