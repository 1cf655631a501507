//! Domain types: events, attendees, waitlist entries and payment methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The inner `Uuid`
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for an attendee
    AttendeeId
);
uuid_id!(
    /// Unique identifier for a waitlist entry
    WaitlistEntryId
);
uuid_id!(
    /// Identity-provider user id of an event host
    OwnerId
);

// ============================================================================
// Money
// ============================================================================

/// Currencies an event can be priced in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar
    Usd,
    /// Euro
    Eur,
    /// Pound sterling
    Gbp,
    /// Canadian dollar
    Cad,
    /// Australian dollar
    Aud,
    /// Swiss franc
    Chf,
}

impl Currency {
    /// ISO 4217 code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
            Self::Chf => "CHF",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error parsing a [`Currency`] code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported currency: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "CAD" => Ok(Self::Cad),
            "AUD" => Ok(Self::Aud),
            "CHF" => Ok(Self::Chf),
            other => Err(UnknownCurrency(other.to_string())),
        }
    }
}

/// Ticket price in minor units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in cents
    pub amount_cents: i64,
    /// Currency
    pub currency: Currency,
}

impl Price {
    /// Amount as a decimal string, e.g. `12.50`.
    #[must_use]
    pub fn decimal(&self) -> String {
        let sign = if self.amount_cents < 0 { "-" } else { "" };
        let abs = self.amount_cents.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.decimal(), self.currency)
    }
}

// ============================================================================
// Payment methods
// ============================================================================

/// Peer-payment handles and bank details attached to an event.
///
/// Only used to build outbound links; nothing here is verified.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethods {
    /// Venmo username, without `@`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venmo: Option<String>,
    /// PayPal.me handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paypal: Option<String>,
    /// Cash App cashtag, without `$`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cashapp: Option<String>,
    /// Revolut username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revolut: Option<String>,
    /// Bank transfer details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<BankDetails>,
}

impl PaymentMethods {
    /// `true` when no method is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.venmo.is_none()
            && self.paypal.is_none()
            && self.cashapp.is_none()
            && self.revolut.is_none()
            && self.bank.is_none()
    }
}

/// Bank transfer details shown to guests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    /// Name on the account
    pub account_holder: String,
    /// IBAN or local account number
    pub account_number: String,
    /// Reference the guest should put on the transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

// ============================================================================
// Entities
// ============================================================================

/// An event page created by a host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Public, immutable link identifier
    pub slug: String,
    /// Host
    pub owner_id: OwnerId,
    /// Where waitlist notifications go
    #[serde(skip_serializing, default)]
    pub owner_email: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// When the event takes place
    pub starts_at: DateTime<Utc>,
    /// Free-text location
    pub location: String,
    /// Ticket price, if the event is paid
    pub price: Option<Price>,
    /// Capacity; `None` means unlimited
    pub max_spots: Option<u32>,
    /// Access password guests must supply to register
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    /// Whether registration is open at all
    pub enabled: bool,
    /// Payment handles
    pub payment_methods: PaymentMethods,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether guests must supply a password.
    #[must_use]
    pub const fn requires_password(&self) -> bool {
        self.password.is_some()
    }

    /// Whether `user` may manage this event.
    #[must_use]
    pub fn is_owned_by(&self, user: OwnerId) -> bool {
        self.owner_id == user
    }
}

/// Host input for creating an event.
#[derive(Clone, Debug, Deserialize)]
pub struct NewEvent {
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// When the event takes place
    pub starts_at: DateTime<Utc>,
    /// Free-text location
    #[serde(default)]
    pub location: String,
    /// Ticket price
    #[serde(default)]
    pub price: Option<Price>,
    /// Capacity
    #[serde(default)]
    pub max_spots: Option<u32>,
    /// Access password
    #[serde(default)]
    pub password: Option<String>,
    /// Requested slug; generated from the title when absent
    #[serde(default)]
    pub slug: Option<String>,
    /// Payment handles
    #[serde(default)]
    pub payment_methods: PaymentMethods,
}

/// Partial update of an event. The slug cannot change.
///
/// Nullable fields use `Some(None)` to clear.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventUpdate {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New start time
    pub starts_at: Option<DateTime<Utc>>,
    /// New location
    pub location: Option<String>,
    /// New price, or `null` to make the event free
    #[serde(default, with = "double_option")]
    pub price: Option<Option<Price>>,
    /// New capacity, or `null` for unlimited
    #[serde(default, with = "double_option")]
    pub max_spots: Option<Option<u32>>,
    /// New password, or `null` to remove it
    #[serde(default, with = "double_option")]
    pub password: Option<Option<String>>,
    /// Open or close registration
    pub enabled: Option<bool>,
    /// Replace payment handles
    pub payment_methods: Option<PaymentMethods>,
}

impl EventUpdate {
    /// Apply this update to `event`.
    pub fn apply(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(starts_at) = self.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(price) = self.price {
            event.price = price;
        }
        if let Some(max_spots) = self.max_spots {
            event.max_spots = max_spots;
        }
        if let Some(password) = self.password {
            event.password = password
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());
        }
        if let Some(enabled) = self.enabled {
            event.enabled = enabled;
        }
        if let Some(payment_methods) = self.payment_methods {
            event.payment_methods = payment_methods;
        }
    }
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// A guest registered for an event.
///
/// Field names match the `attendees` table so change-feed rows decode
/// directly into this type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Attendee ID
    pub id: AttendeeId,
    /// Event the guest registered for
    pub event_id: EventId,
    /// Full name
    pub full_name: String,
    /// Phone number including country code
    pub phone: String,
    /// Payment confirmed by the host
    pub paid: bool,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

/// A guest who asked for a spot on a full event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Entry ID
    pub id: WaitlistEntryId,
    /// Event the request was made for
    pub event_id: EventId,
    /// Guest name
    pub name: String,
    /// Phone number including country code
    pub phone: String,
    /// Optional note to the host
    pub message: Option<String>,
    /// Submission time
    pub created_at: DateTime<Utc>,
}

/// Join a country code and a local number, dropping all whitespace.
///
/// ```
/// assert_eq!(iamin::types::combine_phone("+1", " 234 567 890"), "+1234567890");
/// ```
#[must_use]
pub fn combine_phone(country_code: &str, local: &str) -> String {
    country_code
        .chars()
        .chain(local.chars())
        .filter(|c| !c.is_whitespace())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn price_formats_minor_units() {
        let price = Price {
            amount_cents: 1250,
            currency: Currency::Eur,
        };
        assert_eq!(price.decimal(), "12.50");
        assert_eq!(price.to_string(), "12.50 EUR");

        let small = Price {
            amount_cents: 5,
            currency: Currency::Usd,
        };
        assert_eq!(small.decimal(), "0.05");
    }

    #[test]
    fn currency_round_trips_through_code() {
        assert_eq!("gbp".parse::<Currency>().unwrap(), Currency::Gbp);
        assert_eq!(Currency::Gbp.code(), "GBP");
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn ids_parse_and_display() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<EventId>().is_err());
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let clear: EventUpdate = serde_json::from_str(r#"{"max_spots": null}"#).unwrap();
        assert_eq!(clear.max_spots, Some(None));

        let untouched: EventUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.max_spots, None);
    }

    #[test]
    fn update_trims_the_password_and_blank_clears_it() {
        let mut event = crate::test_support::sample_event("party");

        let set: EventUpdate = serde_json::from_str(r#"{"password": "secret "}"#).unwrap();
        set.apply(&mut event);
        assert_eq!(event.password.as_deref(), Some("secret"));

        let blank: EventUpdate = serde_json::from_str(r#"{"password": "   "}"#).unwrap();
        blank.apply(&mut event);
        assert_eq!(event.password, None);
    }

    #[test]
    fn event_serialization_hides_secrets() {
        let event = Event {
            id: EventId::new(),
            slug: "summer-party".to_string(),
            owner_id: OwnerId::new(),
            owner_email: "host@example.com".to_string(),
            title: "Summer party".to_string(),
            description: String::new(),
            starts_at: Utc::now(),
            location: "Rooftop".to_string(),
            price: None,
            max_spots: Some(20),
            password: Some("hunter2".to_string()),
            enabled: true,
            payment_methods: PaymentMethods::default(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("owner_email").is_none());
        assert_eq!(json["max_spots"], 20);
    }

    #[test]
    fn attendee_decodes_from_row_json() {
        let row = serde_json::json!({
            "id": "7f0c6a1e-4a43-4f0e-9a53-0d2f6f1f2d10",
            "event_id": "0b8e1d57-3d8e-4c5a-8a3e-0f4c5b6a7d8e",
            "full_name": "Jane Doe",
            "phone": "+1234567890",
            "paid": false,
            "registered_at": "2025-01-01T10:00:00.123456+00:00"
        });

        let attendee: Attendee = serde_json::from_value(row).unwrap();
        assert_eq!(attendee.full_name, "Jane Doe");
        assert!(!attendee.paid);
    }
}
