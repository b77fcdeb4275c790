//! # Debt Notification Boundary
//!
//! One notice per deferred-credit posting, emitted after a settlement
//! commits. Fire-and-forget: the ledger is already consistent by the time
//! a notice is built, so dispatch failure is logged and never propagated.
//!
//! The actual transport (push, messaging app, printed slip) lives with the
//! caller; this crate only defines the boundary and a logging default.

use serde::Serialize;
use tracing::info;

use comanda_core::Money;

/// Everything a transport needs to tell a customer about a new debt.
#[derive(Debug, Clone, Serialize)]
pub struct DebtNotice {
    pub customer_id: String,
    pub customer_name: String,
    /// Phone in whatever format the directory stores; None suppresses
    /// deep-link generation but not the notice itself.
    pub phone: Option<String>,

    /// Amount posted by this settlement, in centavos.
    pub amount_cents: i64,
    /// The customer's running balance after the posting.
    pub new_balance_cents: i64,

    /// Human-readable order lines, e.g. `"2x Chopp 300ml"`.
    pub lines: Vec<String>,
}

impl DebtNotice {
    /// Formats the customer-facing message body.
    pub fn message(&self) -> String {
        let mut body = format!(
            "Hello {}! A new charge of {} was added to your tab.\n",
            self.customer_name,
            Money::from_cents(self.amount_cents)
        );
        for line in &self.lines {
            body.push_str("  ");
            body.push_str(line);
            body.push('\n');
        }
        body.push_str(&format!(
            "Current balance: {}",
            Money::from_cents(self.new_balance_cents)
        ));
        body
    }

    /// Builds a messaging deep-link for the notice, when a phone is known.
    pub fn deep_link(&self) -> Option<String> {
        let phone = self.phone.as_ref()?;
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        Some(format!(
            "https://wa.me/{}?text={}",
            digits,
            percent_encode(&self.message())
        ))
    }
}

/// Minimal percent-encoding for the deep-link query value.
fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Dispatch boundary for debt notices.
///
/// Implementations must be infallible from the coordinator's point of
/// view: swallow and log transport errors internally.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &DebtNotice);
}

/// Default notifier: logs the formatted message and deep-link.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &DebtNotice) {
        info!(
            customer_id = %notice.customer_id,
            amount_cents = notice.amount_cents,
            new_balance_cents = notice.new_balance_cents,
            deep_link = notice.deep_link().as_deref().unwrap_or("-"),
            "Debt notice:\n{}",
            notice.message()
        );
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
