//! Middleware for the billing API
//!
//! Order is normative and enforced by the router builder in `server.rs`:
//! tenant resolver -> PCI reject -> (idempotency on the endpoints that
//! require it) -> handler. The webhook route bypasses PCI and JSON
//! decoding entirely; signatures cover raw bytes.

pub mod idempotency;
pub mod pci;
pub mod tenant;

pub use idempotency::idempotency_middleware;
pub use pci::pci_reject_middleware;
pub use tenant::{tenant_middleware, BufferedBody, Tenant};

/// Trim and HTML-escape a user-supplied text field.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}
