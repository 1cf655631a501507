//! Fixtures shared by unit tests.

#![allow(clippy::unwrap_used)]

use crate::capacity::GateStatus;
use crate::event_page::PublicEventPage;
use crate::types::{Event, EventId, OwnerId, PaymentMethods};
use chrono::{TimeZone, Utc};

pub fn sample_event(slug: &str) -> Event {
    let at = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
    Event {
        id: EventId::new(),
        slug: slug.to_string(),
        owner_id: OwnerId::new(),
        owner_email: "host@example.com".to_string(),
        title: "Rooftop Party".to_string(),
        description: String::new(),
        starts_at: at,
        location: "Rooftop".to_string(),
        price: None,
        max_spots: None,
        password: None,
        enabled: true,
        payment_methods: PaymentMethods::default(),
        created_at: at,
    }
}

pub fn sample_page(event: &Event) -> PublicEventPage {
    PublicEventPage {
        event: event.clone(),
        requires_password: event.requires_password(),
        guests: Vec::new(),
        gate: GateStatus::new(event.max_spots, 0),
    }
}
