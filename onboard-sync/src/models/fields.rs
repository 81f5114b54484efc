//! Canonical application fields and the ingress normalization boundary
//!
//! Untyped request JSON (camelCase or snake_case keys, numbers as strings or
//! numbers, booleans in several spellings) is converted into `ApplicationFields`
//! exactly once, here. Every downstream component consumes only the typed struct.
//!
//! Coercion rules:
//! - text: trimmed, empty → `None`
//! - numbers: `$`, `,`, `%` and whitespace stripped, then parsed; anything
//!   non-numeric → `0.0`
//! - flags: `true`, `"true"`, `"yes"`, `"on"`, `"1"`, `1` → true; absent → false
//! - lists: a JSON array, or a string holding a JSON array

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use onboard_common::{Error, Result};

// ============================================================================
// Canonical types
// ============================================================================

/// One beneficial owner / officer of the merchant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    /// Ownership share, 0-100
    pub ownership_percent: f64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl Principal {
    /// "First Last", skipping absent parts
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A requested card terminal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Terminal {
    pub model: Option<String>,
    pub quantity: u32,
    /// "wifi", "ethernet", "cellular", ...
    pub connection_type: Option<String>,
}

/// Canonical business fields of a merchant application
///
/// Stored verbatim as the `fields` JSON document. `Option` fields serialize as
/// `null` (never omitted) so the stored schema stays stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationFields {
    // Business
    pub legal_name: Option<String>,
    pub dba_name: Option<String>,
    pub business_type: Option<String>,
    pub tax_id: Option<String>,
    pub business_start_date: Option<String>,
    pub years_in_business: f64,
    pub website: Option<String>,
    pub business_description: Option<String>,
    pub merchant_category_code: Option<String>,

    // Contact
    pub contact_first_name: Option<String>,
    pub contact_last_name: Option<String>,
    pub contact_title: Option<String>,
    pub merchant_email: Option<String>,
    pub contact_phone: Option<String>,
    pub business_phone: Option<String>,

    // Business address
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,

    // Mailing address
    pub mailing_same_as_business: bool,
    pub mailing_line1: Option<String>,
    pub mailing_line2: Option<String>,
    pub mailing_city: Option<String>,
    pub mailing_state: Option<String>,
    pub mailing_zip: Option<String>,

    // Banking
    pub bank_name: Option<String>,
    pub routing_number: Option<String>,
    pub account_number: Option<String>,
    pub account_type: Option<String>,

    // Processing profile
    pub monthly_volume: f64,
    pub average_ticket: f64,
    pub high_ticket: f64,
    pub card_present_percent: f64,
    pub card_not_present_percent: f64,
    pub keyed_percent: f64,
    pub b2b_percent: f64,
    pub accepts_amex: bool,
    pub seasonal_business: bool,
    pub current_processor: Option<String>,
    pub refund_policy: Option<String>,

    // Signature
    pub signer_name: Option<String>,
    pub signer_title: Option<String>,
    pub signature: Option<String>,
    pub signed_at: Option<String>,
    pub terms_accepted: bool,

    // Lists
    pub principals: Vec<Principal>,
    pub terminals: Vec<Terminal>,

    // Routing
    pub agent_email: Option<String>,
    pub notes: Option<String>,
}

impl ApplicationFields {
    /// Parse untyped request JSON into the canonical record
    ///
    /// `Value::Null` is accepted as an empty object. Any other non-object is a
    /// precondition error.
    pub fn from_raw(value: &Value) -> Result<Self> {
        let raw = RawFields::from_value(value)?;

        let mailing_same_as_business = raw.flag(&["mailing_same_as_business", "same_as_business"]);

        let mut fields = Self {
            legal_name: raw.text(&["legal_name", "business_legal_name", "business_name"]),
            dba_name: raw.text(&["dba_name", "dba", "doing_business_as"]),
            business_type: raw.text(&["business_type", "entity_type", "ownership_type"]),
            tax_id: raw.text(&["tax_id", "federal_tax_id", "ein"]),
            business_start_date: raw.text(&["business_start_date", "date_established"]),
            years_in_business: raw.number(&["years_in_business"]),
            website: raw.text(&["website", "website_url"]),
            business_description: raw.text(&["business_description", "products_sold"]),
            merchant_category_code: raw.text(&["merchant_category_code", "mcc"]),

            contact_first_name: raw.text(&["contact_first_name", "first_name"]),
            contact_last_name: raw.text(&["contact_last_name", "last_name"]),
            contact_title: raw.text(&["contact_title", "title"]),
            merchant_email: raw
                .text(&["merchant_email", "contact_email", "email"])
                .map(|e| onboard_common::email::normalize_email(&e)),
            contact_phone: raw.text(&["contact_phone", "phone"]),
            business_phone: raw.text(&["business_phone"]),

            address_line1: raw.text(&["address_line1", "business_address", "address"]),
            address_line2: raw.text(&["address_line2", "business_address2", "suite"]),
            city: raw.text(&["city", "business_city"]),
            state: raw.text(&["state", "business_state"]),
            zip_code: raw.text(&["zip_code", "zip", "postal_code", "business_zip"]),

            mailing_same_as_business,
            mailing_line1: raw.text(&["mailing_line1", "mailing_address"]),
            mailing_line2: raw.text(&["mailing_line2", "mailing_address2"]),
            mailing_city: raw.text(&["mailing_city"]),
            mailing_state: raw.text(&["mailing_state"]),
            mailing_zip: raw.text(&["mailing_zip", "mailing_zip_code"]),

            bank_name: raw.text(&["bank_name"]),
            routing_number: raw.text(&["routing_number", "aba_routing"]),
            account_number: raw.text(&["account_number", "dda_number"]),
            account_type: raw.text(&["account_type"]),

            monthly_volume: raw.number(&["monthly_volume", "monthly_card_volume"]),
            average_ticket: raw.number(&["average_ticket", "avg_ticket"]),
            high_ticket: raw.number(&["high_ticket", "max_ticket"]),
            card_present_percent: raw.number(&["card_present_percent", "card_present"]),
            card_not_present_percent: raw.number(&["card_not_present_percent", "ecommerce_percent"]),
            keyed_percent: raw.number(&["keyed_percent", "moto_percent"]),
            b2b_percent: raw.number(&["b2b_percent"]),
            accepts_amex: raw.flag(&["accepts_amex", "amex"]),
            seasonal_business: raw.flag(&["seasonal_business", "seasonal"]),
            current_processor: raw.text(&["current_processor"]),
            refund_policy: raw.text(&["refund_policy"]),

            signer_name: raw.text(&["signer_name", "signature_name"]),
            signer_title: raw.text(&["signer_title"]),
            signature: raw.text(&["signature", "signature_data"]),
            signed_at: raw.text(&["signed_at", "signature_date"]),
            terms_accepted: raw.flag(&["terms_accepted", "agree_to_terms"]),

            principals: raw
                .list(&["principals", "owners"])
                .iter()
                .map(principal_from_raw)
                .collect::<Result<Vec<_>>>()?,
            terminals: raw
                .list(&["terminals", "equipment"])
                .iter()
                .map(terminal_from_raw)
                .collect::<Result<Vec<_>>>()?,

            agent_email: raw
                .text(&["agent_email", "agent"])
                .map(|e| onboard_common::email::normalize_email(&e)),
            notes: raw.text(&["notes", "comments"]),
        };

        if fields.mailing_same_as_business {
            fields.mailing_line1 = fields.address_line1.clone();
            fields.mailing_line2 = fields.address_line2.clone();
            fields.mailing_city = fields.city.clone();
            fields.mailing_state = fields.state.clone();
            fields.mailing_zip = fields.zip_code.clone();
        }

        Ok(fields)
    }

    /// Names of fields required before a submission may be committed
    pub fn missing_for_submission(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.legal_name.is_none() {
            missing.push("legal_name");
        }
        match self.merchant_email.as_deref() {
            Some(email) if onboard_common::email::is_valid_email(email) => {}
            _ => missing.push("merchant_email"),
        }
        missing
    }

    /// Contact name as "First Last"
    pub fn contact_name(&self) -> Option<String> {
        let name = [self.contact_first_name.as_deref(), self.contact_last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }

    /// Best display name: DBA, then legal name
    pub fn display_name(&self) -> Option<&str> {
        self.dba_name.as_deref().or(self.legal_name.as_deref())
    }
}

fn principal_from_raw(value: &Value) -> Result<Principal> {
    let raw = RawFields::from_value(value)?;
    let mut principal = Principal {
        first_name: raw.text(&["first_name"]),
        last_name: raw.text(&["last_name"]),
        title: raw.text(&["title", "position"]),
        ownership_percent: raw.number(&["ownership_percent", "ownership", "ownership_percentage"]),
        email: raw.text(&["email"]).map(|e| onboard_common::email::normalize_email(&e)),
        phone: raw.text(&["phone"]),
        date_of_birth: raw.text(&["date_of_birth", "dob"]),
        address_line1: raw.text(&["address_line1", "address", "home_address"]),
        city: raw.text(&["city"]),
        state: raw.text(&["state"]),
        zip_code: raw.text(&["zip_code", "zip"]),
    };

    // Single "name" field: split on the last space
    if principal.first_name.is_none() && principal.last_name.is_none() {
        if let Some(name) = raw.text(&["name", "full_name"]) {
            match name.rsplit_once(' ') {
                Some((first, last)) => {
                    principal.first_name = Some(first.trim().to_string());
                    principal.last_name = Some(last.trim().to_string());
                }
                None => principal.first_name = Some(name),
            }
        }
    }

    Ok(principal)
}

fn terminal_from_raw(value: &Value) -> Result<Terminal> {
    let raw = RawFields::from_value(value)?;
    Ok(Terminal {
        model: raw.text(&["model", "name", "terminal"]),
        quantity: raw.number(&["quantity", "qty"]).max(0.0).min(u32::MAX as f64) as u32,
        connection_type: raw.text(&["connection_type", "connection"]),
    })
}

// ============================================================================
// Raw field access
// ============================================================================

/// Key-normalized view over an untyped JSON object
struct RawFields<'a> {
    values: HashMap<String, &'a Value>,
}

impl<'a> RawFields<'a> {
    fn from_value(value: &'a Value) -> Result<Self> {
        let values = match value {
            Value::Object(map) => map.iter().map(|(key, v)| (to_snake_case(key), v)).collect(),
            Value::Null => HashMap::new(),
            other => {
                return Err(Error::InvalidInput(format!(
                    "Expected a JSON object of fields, got {}",
                    json_type_name(other)
                )))
            }
        };

        Ok(Self { values })
    }

    /// First present, non-null value among `keys`
    fn value(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| self.values.get(*key).copied())
            .find(|v| !v.is_null())
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.values.get(*key).copied())
            .find_map(value_to_text)
    }

    fn number(&self, keys: &[&str]) -> f64 {
        self.value(keys).map(safe_parse_number).unwrap_or(0.0)
    }

    fn flag(&self, keys: &[&str]) -> bool {
        self.value(keys).map(parse_flag).unwrap_or(false)
    }

    fn list(&self, keys: &[&str]) -> Vec<Value> {
        match self.value(keys) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(s)) if !s.trim().is_empty() => {
                match serde_json::from_str::<Value>(s) {
                    Ok(Value::Array(items)) => items,
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Convert `camelCase` / `PascalCase` / `kebab-case` keys to `snake_case`
///
/// Digits stay attached to the preceding word: `addressLine1` → `address_line1`.
pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower_or_digit = false;

    for ch in key.trim().chars() {
        if ch == '-' || ch == ' ' || ch == '.' {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower_or_digit = false;
        } else if ch.is_ascii_uppercase() {
            if prev_lower_or_digit && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }

    out
}

/// Safe numeric parse: strips `$`, `,`, `%`, whitespace; non-numeric → 0
pub fn safe_parse_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().ok()
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

/// Lenient boolean parse; anything unrecognized is false
pub fn parse_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "on" | "1" | "checked"
        ),
        _ => false,
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
