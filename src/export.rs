// src/export.rs

use crate::batch::BatchSummary;
use crate::invoice::{FIELD_NAMES, InvoiceRecord};

/// Artifact name for a single invoice's JSON export.
pub fn json_file_name(record: &InvoiceRecord) -> String {
    let stem = record.invoice_number.as_deref().unwrap_or("unknown");
    let safe: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("invoice_{safe}.json")
}

pub fn record_json(record: &InvoiceRecord) -> serde_json::Result<String> {
    serde_json::to_string_pretty(record)
}

/// Master CSV: one row per successfully processed document, in processing
/// order. Columns are the seven fields plus flattened per-field confidence.
pub fn summary_csv(summary: &BatchSummary) -> String {
    let mut out = String::new();

    let mut header: Vec<String> = vec!["source_file".to_string()];
    header.extend(FIELD_NAMES.iter().map(|f| f.to_string()));
    header.extend(FIELD_NAMES.iter().map(|f| format!("confidence_{f}")));
    out.push_str(&header.join(","));
    out.push('\n');

    for row in &summary.rows {
        let r = &row.record;
        let mut cells: Vec<String> = vec![csv_escape(&row.source_file)];
        cells.push(opt_str(&r.vendor_name));
        cells.push(opt_str(&r.vendor_gstin));
        cells.push(opt_str(&r.invoice_number));
        cells.push(opt_str(&r.invoice_date));
        cells.push(opt_num(r.total_taxable_value));
        cells.push(opt_num(r.total_gst_amount));
        cells.push(opt_num(r.grand_total));
        for field in FIELD_NAMES {
            cells.push(r.confidence.get(field).to_string());
        }
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    out
}

fn opt_str(value: &Option<String>) -> String {
    value.as_deref().map(csv_escape).unwrap_or_default()
}

fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SummaryRow;
    use crate::invoice::FieldConfidence;

    fn sample_summary() -> BatchSummary {
        BatchSummary {
            rows: vec![SummaryRow {
                source_file: "bill,march.pdf".to_string(),
                record: InvoiceRecord {
                    vendor_name: Some("Sharma \"and\" Sons".to_string()),
                    vendor_gstin: Some("27AABCU9603R1ZM".to_string()),
                    invoice_number: Some("INV-001".to_string()),
                    invoice_date: None,
                    total_taxable_value: Some(10000.0),
                    total_gst_amount: Some(1800.0),
                    grand_total: Some(11800.0),
                    confidence: FieldConfidence {
                        vendor_name: 88,
                        vendor_gstin: 99,
                        invoice_number: 95,
                        ..FieldConfidence::default()
                    },
                },
            }],
            failures: Vec::new(),
            total: 1,
        }
    }

    #[test]
    fn csv_has_flattened_confidence_columns() {
        let csv = summary_csv(&sample_summary());
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("source_file,vendor_name,vendor_gstin,"));
        assert!(header.ends_with(
            "confidence_vendor_name,confidence_vendor_gstin,confidence_invoice_number,\
             confidence_invoice_date,confidence_total_taxable_value,\
             confidence_total_gst_amount,confidence_grand_total"
        ));
        assert_eq!(header.split(',').count(), 15);

        let row = lines.next().unwrap();
        assert!(row.contains("\"bill,march.pdf\""));
        assert!(row.contains("\"Sharma \"\"and\"\" Sons\""));
        assert!(row.contains("11800"));
        // Missing date is an empty cell, confidence columns still present
        assert!(row.contains(",99,95,0,"));
    }

    #[test]
    fn integral_amounts_have_no_decimal_noise() {
        let csv = summary_csv(&sample_summary());
        assert!(csv.contains(",10000,1800,11800,"));
    }

    #[test]
    fn json_artifact_name_falls_back_to_unknown() {
        let mut record = InvoiceRecord::default();
        assert_eq!(json_file_name(&record), "invoice_unknown.json");
        record.invoice_number = Some("INV/2026/001".to_string());
        assert_eq!(json_file_name(&record), "invoice_INV-2026-001.json");
    }

    #[test]
    fn record_json_includes_confidence_block() {
        let json = record_json(&sample_summary().rows[0].record).unwrap();
        assert!(json.contains("\"confidence\""));
        assert!(json.contains("\"vendor_gstin\": \"27AABCU9603R1ZM\""));
    }
}
