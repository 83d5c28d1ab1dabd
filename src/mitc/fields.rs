use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How one comparison field is presented and recognised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// Ordered list of comparison fields keyed by their wire name.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCatalog {
    fields: Vec<(String, FieldSpec)>,
}

const DEFAULT_FIELDS: &[(&str, &str, &str, &[&str])] = &[
    (
        "fees_and_charges",
        "Fees & Charges",
        "All fees, charges, processing fees, administrative costs, penalties, etc.",
        &["fees", "charges", "processing fee", "administrative costs", "penalties"],
    ),
    (
        "prepayment",
        "Prepayment",
        "Terms for prepayment, prepayment penalties, conditions, minimum amounts, etc.",
        &["prepayment", "foreclosure", "pre-closure", "early closure", "part payment"],
    ),
    (
        "ltv_bands",
        "LTV Bands",
        "Loan to Value ratio bands, different LTV categories, associated rates or terms",
        &["ltv", "loan to value", "ltv ratio", "ltv bands"],
    ),
    (
        "eligibility",
        "Eligibility",
        "Eligibility criteria for loans, income requirements, employment criteria, etc.",
        &["eligibility", "eligible", "qualification", "criteria", "requirements"],
    ),
    (
        "tenure",
        "Tenure",
        "Loan tenure options, minimum and maximum tenure, repayment periods",
        &["tenure", "term", "loan period", "repayment period", "duration"],
    ),
    (
        "interest_reset",
        "Interest Reset",
        "Interest rate reset frequency, floating rate terms, rate review periods",
        &["interest reset", "rate review", "floating rate", "rate revision"],
    ),
    (
        "documents_required",
        "Documents Required",
        "Required documents for loan application, KYC documents, etc.",
        &["documents", "documentation", "kyc", "papers", "required documents"],
    ),
];

impl Default for FieldCatalog {
    fn default() -> Self {
        let fields = DEFAULT_FIELDS
            .iter()
            .map(|(key, display, description, synonyms)| {
                (
                    key.to_string(),
                    FieldSpec {
                        display_name: display.to_string(),
                        description: description.to_string(),
                        synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self { fields }
    }
}

impl FieldCatalog {
    /// Parse a JSON object of `key -> {display_name, description, synonyms}`.
    /// Key order in the file is kept.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).context("Field config must be a JSON object")?;
        let fields = map
            .into_iter()
            .map(|(key, value)| {
                let spec: FieldSpec = serde_json::from_value(value)
                    .with_context(|| format!("Invalid field config for '{key}'"))?;
                Ok((key, spec))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read field config {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Load from `path` if given, falling back to the defaults on any error.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::from_file(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "using default field configuration");
                Self::default()
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, spec)| spec)
    }

    /// Display name for a field, or the key itself when unknown.
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).map(|spec| spec.display_name.as_str()).unwrap_or(key)
    }

    /// Resolve user input to a field key by key, display name or synonym.
    pub fn resolve(&self, input: &str) -> Option<&str> {
        let needle = input.trim().to_lowercase();
        self.fields
            .iter()
            .find(|(key, spec)| {
                key.to_lowercase() == needle
                    || spec.display_name.to_lowercase() == needle
                    || spec.synonyms.iter().any(|s| s.to_lowercase() == needle)
            })
            .map(|(key, _)| key.as_str())
    }
}
