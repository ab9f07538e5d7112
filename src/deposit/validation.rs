//! Deposit Form Validation
//!
//! Purely local checks run before anything is sent to the backend. The
//! backend stays the only authority on whether a deposit succeeds.

use regex::Regex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use super::types::DepositForm;
use crate::api::{InitiateDepositRequest, Provider};

static MSISDN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,13}$").expect("Invalid MSISDN regex"));

/// Form field a validation message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Amount,
    Provider,
    Target,
    Phone,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Amount => write!(f, "amount"),
            Field::Provider => write!(f, "provider"),
            Field::Target => write!(f, "target"),
            Field::Phone => write!(f, "phone"),
        }
    }
}

/// Per-field validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<Field, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.fields.insert(field, message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.fields.iter().map(|(f, m)| (*f, m.as_str()))
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary = self
            .fields
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", summary)
    }
}

impl std::error::Error for ValidationErrors {}

/// A form that passed validation, with parsed values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDeposit {
    pub amount: Decimal,
    pub provider: Provider,
    pub target: String,
    /// Present only for providers that push to a phone
    pub phone: Option<String>,
}

impl ValidDeposit {
    /// Request body for the initiate endpoint
    pub fn to_request(&self, currency: &str) -> InitiateDepositRequest {
        InitiateDepositRequest {
            provider: self.provider,
            amount: self.amount,
            currency: currency.to_string(),
            target_account: self.target.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Whether `phone` is a 10 to 13 digit MSISDN
pub fn is_valid_msisdn(phone: &str) -> bool {
    MSISDN.is_match(phone.trim())
}

/// Validate a deposit form
pub fn validate(form: &DepositForm) -> Result<ValidDeposit, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let amount = match Decimal::from_str(form.amount.trim()) {
        Ok(amount) if amount > Decimal::ZERO => Some(amount),
        Ok(_) => {
            errors.add(Field::Amount, "Amount must be greater than zero");
            None
        }
        Err(_) => {
            errors.add(Field::Amount, "Enter a valid amount");
            None
        }
    };

    if form.provider.is_none() {
        errors.add(Field::Provider, "Select a payment method");
    }

    let target = form.target.trim();
    if target.is_empty() {
        errors.add(Field::Target, "Select where the funds should go");
    }

    let phone = match form.provider {
        Some(provider) if provider.requires_phone() => {
            let phone = form.phone.trim();
            if phone.is_empty() {
                errors.add(Field::Phone, "Phone number is required");
            } else if !is_valid_msisdn(phone) {
                errors.add(Field::Phone, "Enter a valid phone number (10-13 digits)");
            }
            Some(phone.to_string())
        }
        _ => None,
    };

    match (amount, form.provider) {
        (Some(amount), Some(provider)) if errors.is_empty() => Ok(ValidDeposit {
            amount,
            provider,
            target: target.to_string(),
            phone,
        }),
        _ => Err(errors),
    }
}
