//! Application fields → CRM mirror vocabulary
//!
//! The mirror is read by the operations team, so these renderings are
//! business-visible:
//! - currency: two decimals, `$` prefix on display columns, bare on the
//!   numeric `Annual Volume` column
//! - percentages: two decimals and a `%` suffix
//! - principals: newline-joined summary plus `Principal 1` / `Principal 2`
//!   breakout columns
//! - addresses: one comma-joined line of line 1, line 2 and "city, state zip",
//!   empties dropped
//!
//! Empty values are left out of the payload so an update never blanks a
//! column the operations team filled in by hand.

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::crm_client::APPLICATION_ID_FIELD;
use crate::models::{ApplicationFields, Principal, SyncAction};

/// Currency rendering; `with_symbol` selects the `$` prefix
pub fn format_currency(value: f64, with_symbol: bool) -> String {
    if with_symbol {
        format!("${:.2}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Percentage rendering: `35` → `35.00%`
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// One-line address from its parts, skipping blanks
pub fn format_address(
    line1: Option<&str>,
    line2: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    zip: Option<&str>,
) -> String {
    let state_zip = join_present(&[state, zip], " ");
    let city_state_zip = join_present(&[city, Some(state_zip.as_str())], ", ");
    join_present(&[line1, line2, Some(city_state_zip.as_str())], ", ")
}

/// "Jane Doe (CEO) - 60.00%" per principal, one per line
pub fn principal_summary(principals: &[Principal]) -> String {
    principals
        .iter()
        .map(|p| {
            let mut line = p.full_name();
            if let Some(title) = p.title.as_deref() {
                line.push_str(&format!(" ({})", title));
            }
            line.push_str(&format!(" - {}", format_percent(p.ownership_percent)));
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_present(parts: &[Option<&str>], separator: &str) -> String {
    parts
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Flat mirror payload for `fields` under `action`
pub fn map_to_mirror_fields(
    application_id: Uuid,
    action: SyncAction,
    fields: &ApplicationFields,
) -> Map<String, Value> {
    let mut out = MirrorFields::default();

    out.text(APPLICATION_ID_FIELD, Some(application_id.to_string()));
    out.text("Pipeline Stage", Some(action.pipeline_stage().to_string()));
    out.text("Last Action", Some(action.as_str().to_string()));
    out.text("Last Synced", Some(Utc::now().to_rfc3339()));

    // Business
    out.text("Legal Name", fields.legal_name.clone());
    out.text("DBA Name", fields.dba_name.clone());
    out.text("Business Type", fields.business_type.clone());
    out.text("Website", fields.website.clone());
    out.text("MCC", fields.merchant_category_code.clone());
    out.text("Agent Email", fields.agent_email.clone());

    // Contact
    out.text("Contact Name", fields.contact_name());
    out.text("Email", fields.merchant_email.clone());
    out.text("Phone", fields.contact_phone.clone().or(fields.business_phone.clone()));

    out.text(
        "Business Address",
        Some(format_address(
            fields.address_line1.as_deref(),
            fields.address_line2.as_deref(),
            fields.city.as_deref(),
            fields.state.as_deref(),
            fields.zip_code.as_deref(),
        )),
    );
    out.text(
        "Mailing Address",
        Some(format_address(
            fields.mailing_line1.as_deref(),
            fields.mailing_line2.as_deref(),
            fields.mailing_city.as_deref(),
            fields.mailing_state.as_deref(),
            fields.mailing_zip.as_deref(),
        )),
    );

    // Processing profile
    out.money("Monthly Volume", fields.monthly_volume, true);
    out.money("Average Ticket", fields.average_ticket, true);
    out.money("High Ticket", fields.high_ticket, true);
    out.money("Annual Volume", fields.monthly_volume * 12.0, false);
    out.percent("Card Present %", fields.card_present_percent);
    out.percent("Card Not Present %", fields.card_not_present_percent);
    out.percent("Keyed %", fields.keyed_percent);
    out.percent("B2B %", fields.b2b_percent);
    if fields.accepts_amex {
        out.insert("Accepts Amex", Value::Bool(true));
    }
    out.text("Current Processor", fields.current_processor.clone());

    // Principals
    out.text("Principals", Some(principal_summary(&fields.principals)));
    for (index, principal) in fields.principals.iter().take(2).enumerate() {
        let n = index + 1;
        out.text(&format!("Principal {} Name", n), Some(principal.full_name()));
        out.text(&format!("Principal {} Title", n), principal.title.clone());
        out.text(&format!("Principal {} Email", n), principal.email.clone());
        out.percent(&format!("Principal {} Ownership", n), principal.ownership_percent);
    }

    // Equipment
    let terminals = fields
        .terminals
        .iter()
        .map(|t| {
            let model = t.model.as_deref().unwrap_or("Terminal");
            match t.connection_type.as_deref() {
                Some(conn) => format!("{} x{} ({})", model, t.quantity.max(1), conn),
                None => format!("{} x{}", model, t.quantity.max(1)),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    out.text("Terminals", Some(terminals));

    out.text("Notes", fields.notes.clone());

    out.into_inner()
}

/// Builder that drops empty values
#[derive(Default)]
struct MirrorFields {
    map: Map<String, Value>,
}

impl MirrorFields {
    fn insert(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }

    fn text(&mut self, key: &str, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.insert(key, Value::String(value));
        }
    }

    fn money(&mut self, key: &str, value: f64, with_symbol: bool) {
        if value != 0.0 {
            self.insert(key, Value::String(format_currency(value, with_symbol)));
        }
    }

    fn percent(&mut self, key: &str, value: f64) {
        if value != 0.0 {
            self.insert(key, Value::String(format_percent(value)));
        }
    }

    fn into_inner(self) -> Map<String, Value> {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_currency_and_percent() {
        assert_eq!(format_currency(25000.0, true), "$25000.00");
        assert_eq!(format_currency(12.5, false), "12.50");
        assert_eq!(format_percent(35.0), "35.00%");
        assert_eq!(format_percent(33.333), "33.33%");
    }

    #[test]
    fn test_address_filters_empties() {
        assert_eq!(
            format_address(Some("1 Main St"), None, Some("Austin"), Some("TX"), Some("78701")),
            "1 Main St, Austin, TX 78701"
        );
        assert_eq!(
            format_address(Some("1 Main St"), Some(" "), None, Some("TX"), None),
            "1 Main St, TX"
        );
        assert_eq!(format_address(None, None, None, None, None), "");
    }

    #[test]
    fn test_principal_breakout() {
        let fields = ApplicationFields::from_raw(&json!({
            "legalName": "Acme LLC",
            "principals": [
                {"firstName": "Jane", "lastName": "Doe", "title": "CEO", "ownershipPercent": 60},
                {"firstName": "Sam", "lastName": "Roe", "ownershipPercent": "40"},
                {"firstName": "Third", "lastName": "Person", "ownershipPercent": 0}
            ]
        }))
        .unwrap();

        let mapped = map_to_mirror_fields(Uuid::nil(), SyncAction::InviteSent, &fields);

        assert_eq!(
            mapped["Principals"],
            json!("Jane Doe (CEO) - 60.00%\nSam Roe - 40.00%\nThird Person - 0.00%")
        );
        assert_eq!(mapped["Principal 1 Name"], json!("Jane Doe"));
        assert_eq!(mapped["Principal 2 Ownership"], json!("40.00%"));
        assert!(!mapped.contains_key("Principal 3 Name"));
        assert_eq!(mapped["Pipeline Stage"], json!("Pending Signature"));
    }

    #[test]
    fn test_empty_values_omitted() {
        let mapped = map_to_mirror_fields(
            Uuid::nil(),
            SyncAction::DraftCreated,
            &ApplicationFields::default(),
        );

        assert_eq!(mapped[APPLICATION_ID_FIELD], json!(Uuid::nil().to_string()));
        assert!(!mapped.contains_key("Legal Name"));
        assert!(!mapped.contains_key("Monthly Volume"));
        assert!(!mapped.contains_key("Business Address"));
        assert!(!mapped.contains_key("Principals"));
    }

    #[test]
    fn test_processing_profile() {
        let fields = ApplicationFields::from_raw(&json!({
            "monthlyVolume": "$10,000",
            "averageTicket": 42.5,
            "cardPresentPercent": "70",
        }))
        .unwrap();

        let mapped = map_to_mirror_fields(Uuid::nil(), SyncAction::InviteCreated, &fields);
        assert_eq!(mapped["Monthly Volume"], json!("$10000.00"));
        assert_eq!(mapped["Annual Volume"], json!("120000.00"));
        assert_eq!(mapped["Average Ticket"], json!("$42.50"));
        assert_eq!(mapped["Card Present %"], json!("70.00%"));
        assert_eq!(mapped["Pipeline Stage"], json!("Pending"));
    }
}
