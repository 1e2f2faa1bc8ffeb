// src/invoice.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The seven canonical GST invoice fields, in export column order.
pub const FIELD_NAMES: [&str; 7] = [
    "vendor_name",
    "vendor_gstin",
    "invoice_number",
    "invoice_date",
    "total_taxable_value",
    "total_gst_amount",
    "grand_total",
];

/// Per-field confidence scores, each an integer in 0..=100.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfidence {
    #[serde(default)]
    pub vendor_name: u8,
    #[serde(default)]
    pub vendor_gstin: u8,
    #[serde(default)]
    pub invoice_number: u8,
    #[serde(default)]
    pub invoice_date: u8,
    #[serde(default)]
    pub total_taxable_value: u8,
    #[serde(default)]
    pub total_gst_amount: u8,
    #[serde(default)]
    pub grand_total: u8,
}

/// Coarse reliability band for a confidence score, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn of(score: u8) -> Self {
        if score > 90 {
            ConfidenceLevel::High
        } else if score >= 70 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

impl FieldConfidence {
    pub fn get(&self, field: &str) -> u8 {
        match field {
            "vendor_name" => self.vendor_name,
            "vendor_gstin" => self.vendor_gstin,
            "invoice_number" => self.invoice_number,
            "invoice_date" => self.invoice_date,
            "total_taxable_value" => self.total_taxable_value,
            "total_gst_amount" => self.total_gst_amount,
            "grand_total" => self.grand_total,
            _ => 0,
        }
    }
}

/// The canonical structured result for one invoice. Immutable once built;
/// every field key and every confidence key is always present (absent model
/// output is backfilled with `None` / `0`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub vendor_name: Option<String>,
    /// 2-digit state code + 10-char PAN + entity digit + check char
    /// (e.g. 27AABCU9603R1ZM). Not validated; a confidence signal only.
    pub vendor_gstin: Option<String>,
    pub invoice_number: Option<String>,
    /// Preferred DD/MM/YYYY, not enforced.
    pub invoice_date: Option<String>,
    pub total_taxable_value: Option<f64>,
    pub total_gst_amount: Option<f64>,
    pub grand_total: Option<f64>,
    #[serde(default)]
    pub confidence: FieldConfidence,
}

impl InvoiceRecord {
    /// Coerce untyped model JSON into a fully-populated record.
    ///
    /// Missing fields backfill to `None`, missing or mistyped confidence
    /// entries to `0`, and values whose JSON type does not match the schema
    /// are rejected to `None` rather than coerced. Returns `None` only when
    /// the payload is not a JSON object at all.
    pub fn from_model_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let confidence = obj.get("confidence").and_then(Value::as_object);

        let score = |field: &str| -> u8 {
            confidence
                .and_then(|c| c.get(field))
                .and_then(Value::as_f64)
                .map(|n| n.clamp(0.0, 100.0).round() as u8)
                .unwrap_or(0)
        };

        Some(Self {
            vendor_name: string_field(obj, "vendor_name"),
            vendor_gstin: string_field(obj, "vendor_gstin"),
            invoice_number: string_field(obj, "invoice_number"),
            invoice_date: string_field(obj, "invoice_date"),
            total_taxable_value: number_field(obj, "total_taxable_value"),
            total_gst_amount: number_field(obj, "total_gst_amount"),
            grand_total: number_field(obj, "grand_total"),
            confidence: FieldConfidence {
                vendor_name: score("vendor_name"),
                vendor_gstin: score("vendor_gstin"),
                invoice_number: score("invoice_number"),
                invoice_date: score("invoice_date"),
                total_taxable_value: score("total_taxable_value"),
                total_gst_amount: score("total_gst_amount"),
                grand_total: score("grand_total"),
            },
        })
    }

    /// How many of the seven fields were extracted.
    pub fn coverage(&self) -> (usize, usize) {
        let filled = [
            self.vendor_name.is_some(),
            self.vendor_gstin.is_some(),
            self.invoice_number.is_some(),
            self.invoice_date.is_some(),
            self.total_taxable_value.is_some(),
            self.total_gst_amount.is_some(),
            self.grand_total.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, FIELD_NAMES.len())
    }
}

fn string_field(obj: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn number_field(obj: &serde_json::Map<String, Value>, field: &str) -> Option<f64> {
    obj.get(field).and_then(Value::as_f64)
}
