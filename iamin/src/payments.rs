//! Outbound payment deep links.
//!
//! Built from the event price and the host's handles. Nothing is charged
//! here; links open the guest's payment app prefilled.

use crate::types::{BankDetails, Currency, Event, PaymentMethods, Price};
use serde::Serialize;

/// Payment app a link opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Venmo, USD only
    Venmo,
    /// PayPal.me
    Paypal,
    /// Cash App, USD and GBP
    Cashapp,
    /// Revolut.me
    Revolut,
}

/// One prefilled payment link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentLink {
    /// Target app
    pub provider: Provider,
    /// Deep link
    pub url: String,
}

/// Everything a guest needs to pay the host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PaymentOptions {
    /// Amount as displayed, e.g. `12.50 EUR`
    pub amount: Option<String>,
    /// App links usable for this currency
    pub links: Vec<PaymentLink>,
    /// Bank transfer details, shown as-is
    pub bank: Option<BankDetails>,
}

fn handle(raw: &str, sigil: char) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches(sigil).trim();
    (!trimmed.is_empty()).then(|| urlencoding::encode(trimmed).into_owned())
}

fn venmo(raw: &str, price: &Price, note: &str) -> Option<PaymentLink> {
    if price.currency != Currency::Usd {
        return None;
    }
    let user = handle(raw, '@')?;
    let query = serde_urlencoded::to_string([
        ("txn", "pay"),
        ("amount", price.decimal().as_str()),
        ("note", note),
    ])
    .ok()?;
    Some(PaymentLink {
        provider: Provider::Venmo,
        url: format!("https://venmo.com/{user}?{query}"),
    })
}

fn paypal(raw: &str, price: &Price) -> Option<PaymentLink> {
    let user = handle(raw, '@')?;
    Some(PaymentLink {
        provider: Provider::Paypal,
        url: format!(
            "https://paypal.me/{user}/{}{}",
            price.decimal(),
            price.currency.code()
        ),
    })
}

fn cashapp(raw: &str, price: &Price) -> Option<PaymentLink> {
    if !matches!(price.currency, Currency::Usd | Currency::Gbp) {
        return None;
    }
    let tag = handle(raw, '$')?;
    Some(PaymentLink {
        provider: Provider::Cashapp,
        url: format!("https://cash.app/${tag}/{}", price.decimal()),
    })
}

fn revolut(raw: &str, price: &Price) -> Option<PaymentLink> {
    let user = handle(raw, '@')?;
    let query = serde_urlencoded::to_string([
        ("amount", price.amount_cents.to_string()),
        ("currency", price.currency.code().to_string()),
    ])
    .ok()?;
    Some(PaymentLink {
        provider: Provider::Revolut,
        url: format!("https://revolut.me/{user}?{query}"),
    })
}

/// Links for `price` with the given handles. Apps that cannot take the
/// currency are skipped.
#[must_use]
pub fn links(methods: &PaymentMethods, price: &Price, note: &str) -> Vec<PaymentLink> {
    [
        methods.venmo.as_deref().and_then(|h| venmo(h, price, note)),
        methods.paypal.as_deref().and_then(|h| paypal(h, price)),
        methods.cashapp.as_deref().and_then(|h| cashapp(h, price)),
        methods.revolut.as_deref().and_then(|h| revolut(h, price)),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Payment options for an event. Free events get no links.
#[must_use]
pub fn options_for(event: &Event) -> PaymentOptions {
    let Some(price) = event.price.as_ref() else {
        return PaymentOptions::default();
    };
    PaymentOptions {
        amount: Some(price.to_string()),
        links: links(&event.payment_methods, price, &event.title),
        bank: event.payment_methods.bank.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_event;

    fn methods() -> PaymentMethods {
        PaymentMethods {
            venmo: Some("@host-venmo".to_string()),
            paypal: Some("hostpp".to_string()),
            cashapp: Some("$hostcash".to_string()),
            revolut: Some("hostrev".to_string()),
            bank: None,
        }
    }

    fn price(amount_cents: i64, currency: Currency) -> Price {
        Price {
            amount_cents,
            currency,
        }
    }

    #[test]
    fn usd_gets_every_app() {
        let links = links(&methods(), &price(1500, Currency::Usd), "Rooftop Party");
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();

        assert_eq!(
            urls,
            [
                "https://venmo.com/host-venmo?txn=pay&amount=15.00&note=Rooftop+Party",
                "https://paypal.me/hostpp/15.00USD",
                "https://cash.app/$hostcash/15.00",
                "https://revolut.me/hostrev?amount=1500&currency=USD",
            ]
        );
    }

    #[test]
    fn currency_restricts_apps() {
        let eur: Vec<Provider> = links(&methods(), &price(999, Currency::Eur), "x")
            .into_iter()
            .map(|l| l.provider)
            .collect();
        assert_eq!(eur, [Provider::Paypal, Provider::Revolut]);

        let gbp: Vec<Provider> = links(&methods(), &price(999, Currency::Gbp), "x")
            .into_iter()
            .map(|l| l.provider)
            .collect();
        assert_eq!(gbp, [Provider::Paypal, Provider::Cashapp, Provider::Revolut]);
    }

    #[test]
    fn blank_handles_are_skipped() {
        let methods = PaymentMethods {
            paypal: Some("  @ ".to_string()),
            ..PaymentMethods::default()
        };
        assert!(links(&methods, &price(100, Currency::Usd), "x").is_empty());
    }

    #[test]
    fn free_events_have_no_options() {
        let mut event = sample_event("free");
        event.payment_methods = methods();
        assert_eq!(options_for(&event), PaymentOptions::default());

        event.price = Some(price(2000, Currency::Eur));
        event.payment_methods.bank = Some(BankDetails {
            account_holder: "Host".to_string(),
            account_number: "DE89370400440532013000".to_string(),
            reference: None,
        });
        let options = options_for(&event);
        assert_eq!(options.amount.as_deref(), Some("20.00 EUR"));
        assert_eq!(options.links.len(), 2);
        assert!(options.bank.is_some());
    }
}
