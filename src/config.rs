use serde::Deserialize;
use std::{fs, path::Path};

/// Process-wide extraction ceiling per identity. Overridable via `max_uploads`
/// in the config file, but this is the shipped default.
pub const MAX_UPLOADS: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_max_uploads")]
    pub max_uploads: u32,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub ocr: OcrSection,
}

#[derive(Debug, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// API key, if set directly in the config. Falls back to `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize)]
pub struct OcrSection {
    #[serde(default = "default_ocr_lang")]
    pub lang: String,
    /// Render resolution for scanned-PDF pages before OCR.
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,
}

fn default_db_path() -> String {
    "parserix.db".to_string()
}

fn default_max_uploads() -> u32 {
    MAX_UPLOADS
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "meta-llama/llama-4-scout-17b-16e-instruct".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_ocr_lang() -> String {
    "eng".to_string()
}

fn default_ocr_dpi() -> u32 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_uploads: default_max_uploads(),
            llm: LlmSection::default(),
            ocr: OcrSection::default(),
        }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            lang: default_ocr_lang(),
            dpi: default_ocr_dpi(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the config file if it exists; otherwise run on built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
