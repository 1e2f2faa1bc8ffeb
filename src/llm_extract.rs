// src/llm_extract.rs

use crate::config::LlmSection;
use crate::error::FieldError;
use crate::invoice::InvoiceRecord;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The prompt that instructs the model to extract the seven GST invoice
/// fields with per-field confidence scores.
const SYSTEM_PROMPT: &str = r#"You are a document extraction assistant specialized in Indian GST Invoices.

Given raw text extracted from an invoice (via PDF text extraction or OCR), extract the following fields:

- vendor_name: The name of the seller/vendor company.
- vendor_gstin: The vendor's 15-digit GSTIN (Goods and Services Tax Identification Number).
- invoice_number: The unique invoice identifier.
- invoice_date: The date of the invoice (return in DD/MM/YYYY format when possible).
- total_taxable_value: The total taxable amount before GST (as a number).
- total_gst_amount: The total GST amount including CGST, SGST, and/or IGST (as a number).
- grand_total: The final total amount including tax (as a number).

Additionally, return a "confidence" object containing an integer score from 0 to 100 for EACH extracted field. The score should reflect how confident you are in the extraction based on:
- Text clarity: Was the text clearly readable or garbled/partial?
- Ambiguity: Were there multiple possible values or was the field unambiguous?
- Format match: Did the extracted value match the expected format (e.g. GSTIN pattern, date format)?

If a field is null (not found), assign a confidence of 0 for that field.

Rules:
- If a field cannot be found or is ambiguous, return null for that field.
- For numeric fields, return the number without currency symbols or commas.
- GSTIN format: 2-digit state code + 10-char PAN + 1 entity code + 1 check digit (e.g., 27AABCU9603R1ZM).
- Look for CGST + SGST or IGST to compute the total GST amount.
- Do NOT hallucinate values. Only extract what is clearly present in the text.

You MUST respond with ONLY valid JSON in exactly this structure (no markdown, no explanation):
{
  "vendor_name": "<string or null>",
  "vendor_gstin": "<string or null>",
  "invoice_number": "<string or null>",
  "invoice_date": "<string or null>",
  "total_taxable_value": <number or null>,
  "total_gst_amount": <number or null>,
  "grand_total": <number or null>,
  "confidence": {
    "vendor_name": <integer 0-100>,
    "vendor_gstin": <integer 0-100>,
    "invoice_number": <integer 0-100>,
    "invoice_date": <integer 0-100>,
    "total_taxable_value": <integer 0-100>,
    "total_gst_amount": <integer 0-100>,
    "grand_total": <integer 0-100>
  }
}"#;

/// Truncate very long texts to stay within context limits.
const MAX_INPUT_CHARS: usize = 12_000;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Text-to-structured-record capability consumed by the batch orchestrator.
#[async_trait]
pub trait FieldExtraction: Send + Sync {
    async fn extract_fields(&self, text: &str) -> Result<InvoiceRecord, FieldError>;
}

/// Sends extracted text to an OpenAI-compatible chat endpoint and parses the
/// structured response. Deterministic sampling (temperature 0); one attempt
/// per document, no retry — a retry would reproduce the same output.
#[derive(Debug)]
pub struct LlmFieldExtractor {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl LlmFieldExtractor {
    /// Resolve the credential up front: config value first, then the
    /// configured environment variable.
    pub fn new(cfg: &LlmSection) -> Result<Self, FieldError> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&cfg.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
            .ok_or_else(|| FieldError::MissingCredential {
                env_var: cfg.api_key_env.clone(),
            })?;

        Ok(Self {
            client: Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl FieldExtraction for LlmFieldExtractor {
    async fn extract_fields(&self, text: &str) -> Result<InvoiceRecord, FieldError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: truncate_chars(text, MAX_INPUT_CHARS).to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: 1024,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, &body));
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| FieldError::MalformedResponse("empty choices array".to_string()))?;

        let record = parse_model_output(content)?;
        let (filled, total) = record.coverage();
        info!(
            filled,
            total,
            invoice_number = ?record.invoice_number,
            vendor = ?record.vendor_name,
            grand_total = ?record.grand_total,
            "Field extraction result"
        );
        Ok(record)
    }
}

/// Parse the model's reply into a fully-backfilled record, repairing the
/// common contract violations (markdown fences, leading prose) first.
fn parse_model_output(content: &str) -> Result<InvoiceRecord, FieldError> {
    // Strip markdown fences if the model added them despite instructions
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = extract_json_object(json_str)?;

    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FieldError::MalformedResponse(format!("{e}\nRaw: {json_str}")))?;

    InvoiceRecord::from_model_json(&value).ok_or_else(|| {
        FieldError::MalformedResponse(format!("expected a JSON object, got: {json_str}"))
    })
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text (e.g. thinking tokens from some models).
fn extract_json_object(s: &str) -> Result<&str, FieldError> {
    let start = s
        .find('{')
        .ok_or_else(|| FieldError::MalformedResponse("no '{' found in response".to_string()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| FieldError::MalformedResponse("no '}' found in response".to_string()))?;
    if end <= start {
        return Err(FieldError::MalformedResponse(
            "malformed JSON in response".to_string(),
        ));
    }
    Ok(&s[start..=end])
}

/// Map a provider error to the typed failure the batch cares about:
/// credential errors halt the batch, rate limits are report-and-continue.
fn classify_api_error(status: StatusCode, body: &str) -> FieldError {
    match status.as_u16() {
        401 | 403 => FieldError::InvalidCredential(body.trim().to_string()),
        429 => FieldError::RateLimited(body.trim().to_string()),
        _ => {
            let lower = body.to_lowercase();
            if lower.contains("api key") || lower.contains("authentication") {
                FieldError::InvalidCredential(body.trim().to_string())
            } else if lower.contains("rate") && lower.contains("limit") {
                FieldError::RateLimited(body.trim().to_string())
            } else {
                FieldError::Api(format!("{status}: {}", body.trim()))
            }
        }
    }
}

/// Char-boundary-safe prefix of at most `max` bytes.
fn truncate_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let record = parse_model_output(
            r#"{"vendor_name": "Acme", "grand_total": 11800,
                "confidence": {"vendor_name": 90, "grand_total": 95}}"#,
        )
        .unwrap();
        assert_eq!(record.vendor_name.as_deref(), Some("Acme"));
        assert_eq!(record.grand_total, Some(11800.0));
        assert_eq!(record.confidence.grand_total, 95);
        // Fields the model omitted are backfilled
        assert_eq!(record.vendor_gstin, None);
        assert_eq!(record.confidence.vendor_gstin, 0);
    }

    #[test]
    fn repairs_fenced_output() {
        let record =
            parse_model_output("```json\n{\"invoice_number\": \"INV-7\"}\n```").unwrap();
        assert_eq!(record.invoice_number.as_deref(), Some("INV-7"));
    }

    #[test]
    fn repairs_prose_wrapped_output() {
        let record =
            parse_model_output("Here is the extraction: {\"vendor_name\": \"Acme\"} Done.")
                .unwrap();
        assert_eq!(record.vendor_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn rejects_non_json_output() {
        let err = parse_model_output("I could not read the invoice, sorry.").unwrap_err();
        assert!(matches!(err, FieldError::MalformedResponse(_)));
    }

    #[test]
    fn classifies_credential_and_rate_limit_errors() {
        assert!(matches!(
            classify_api_error(StatusCode::UNAUTHORIZED, "bad key"),
            FieldError::InvalidCredential(_)
        ));
        assert!(matches!(
            classify_api_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            FieldError::RateLimited(_)
        ));
        // Textual fallback when the status is ambiguous
        assert!(matches!(
            classify_api_error(StatusCode::BAD_REQUEST, "Invalid API Key provided"),
            FieldError::InvalidCredential(_)
        ));
        assert!(matches!(
            classify_api_error(StatusCode::BAD_REQUEST, "Rate limit reached for model"),
            FieldError::RateLimited(_)
        ));
        assert!(matches!(
            classify_api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            FieldError::Api(_)
        ));
    }

    #[test]
    fn missing_credential_is_detected_at_construction() {
        let cfg = LlmSection {
            api_key: None,
            api_key_env: "PARSERIX_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..LlmSection::default()
        };
        let err = LlmFieldExtractor::new(&cfg).unwrap_err();
        assert!(matches!(err, FieldError::MissingCredential { .. }));

        let cfg = LlmSection {
            api_key: Some("gsk_test".to_string()),
            ..LlmSection::default()
        };
        assert!(LlmFieldExtractor::new(&cfg).is_ok());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "₹₹₹₹"; // 3 bytes each
        let cut = truncate_chars(s, 7);
        assert_eq!(cut, "₹₹");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
