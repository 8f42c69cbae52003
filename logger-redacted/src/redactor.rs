use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Option<Regex> =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok();
    // Local and international numbers: (555) 123-4567, +254 712 345 678, 0712345678
    static ref PHONE_REGEX: Option<Regex> =
        Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)|\d{2,4})[\s.-]?\d{3}[\s.-]?\d{3,4}\b").ok();
}

const FULLY_REDACTED: &str = "[REDACTED]";

/// PII redaction configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub hash_for_correlation: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            hash_for_correlation: false,
        }
    }
}

/// Masks patient contact details in text bound for logs
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        if self.config.redact_phones {
            result = self.redact_phones(&result);
        }

        result
    }

    fn redact_emails(&self, text: &str) -> String {
        let Some(regex) = EMAIL_REGEX.as_ref() else {
            return FULLY_REDACTED.to_string();
        };
        regex
            .replace_all(text, |caps: &Captures| {
                let email = caps.get(0).map_or("", |m| m.as_str());
                if self.config.hash_for_correlation {
                    format!("EMAIL[{}]", hash_value(email))
                } else {
                    mask_email(email)
                }
            })
            .into_owned()
    }

    fn redact_phones(&self, text: &str) -> String {
        let Some(regex) = PHONE_REGEX.as_ref() else {
            return FULLY_REDACTED.to_string();
        };
        regex
            .replace_all(text, |caps: &Captures| {
                let phone = caps.get(0).map_or("", |m| m.as_str());
                if self.config.hash_for_correlation {
                    format!("PHONE[{}]", hash_value(phone))
                } else {
                    mask_phone(phone)
                }
            })
            .into_owned()
    }
}

/// `jane.doe@example.com` -> `j***@e***`
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = |s: &str| s.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}***", first(local), first(domain))
        }
        None => "***@***".to_string(),
    }
}

/// Keeps the last two digits: `+254 712 345 678` -> `***78`
fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits.iter().skip(digits.len().saturating_sub(2)).collect();
    format!("***{tail}")
}

fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    // First 8 bytes keep the tag short
    general_purpose::STANDARD.encode(digest.get(..8).unwrap_or_default())
}
