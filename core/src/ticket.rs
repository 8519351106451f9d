use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::value::Value;

/// A choice or flag constant as stored in the schema. Tickets are keyed by
/// the identity of this allocation, not by the value inside it.
pub type ChoiceValue = Arc<Value>;

/// Bidirectional map between schema values and short opaque strings that
/// are safe to embed in HTML attributes.
///
/// Registration is identity-keyed: two distinct allocations holding equal
/// values get distinct tickets. Every registered value is retained for the
/// lifetime of the registry, so an address is never reused by another value.
#[derive(Debug, Default)]
pub struct TicketRegistry {
    inner: Mutex<Tickets>,
}

#[derive(Debug, Default)]
struct Tickets {
    by_identity: HashMap<usize, String>,
    by_ticket: HashMap<String, ChoiceValue>,
    issued: u64,
}

impl TicketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the ticket for `value`, issuing one on first sight.
    pub fn register(&self, value: &ChoiceValue) -> String {
        let identity = Arc::as_ptr(value) as usize;
        let mut tickets = self.lock();
        if let Some(ticket) = tickets.by_identity.get(&identity) {
            return ticket.clone();
        }

        tickets.issued += 1;
        let ticket = URL_SAFE_NO_PAD.encode(tickets.issued.to_le_bytes());
        tickets.by_identity.insert(identity, ticket.clone());
        tickets.by_ticket.insert(ticket.clone(), Arc::clone(value));
        tracing::debug!(%ticket, value = %value, "registered ticket");
        ticket
    }

    /// Look a ticket up without any fallback.
    pub fn lookup(&self, ticket: &str) -> Option<ChoiceValue> {
        self.lock().by_ticket.get(ticket).cloned()
    }

    /// Redeem a ticket. Unknown tickets come back as text unchanged, so a
    /// stale or hand-typed value degrades instead of failing the request.
    pub fn redeem(&self, ticket: &str) -> ChoiceValue {
        self.lookup(ticket)
            .unwrap_or_else(|| Arc::new(Value::text(ticket)))
    }

    pub fn len(&self) -> usize {
        self.lock().by_ticket.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tickets> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
