//! The three transport adapters.
//!
//! Every adapter fulfils the same contract: take a [`RequestDescriptor`],
//! drive one [`protocol::Exchange`] from `Idle` to a terminal phase, and
//! return exactly one [`TransportOutcome`]. Native faults never escape as
//! errors; they become `Failure` outcomes.
//!
//! | Adapter | Native primitive | Scheme |
//! |---|---|---|
//! | [`RequestResponseAdapter`] | [`protocol::RequestConnection`] | `http`, `https` |
//! | [`LegacyAdapter`] | [`protocol::LegacyConnection`] | `http`, `https` |
//! | [`SocketAdapter`] | [`protocol::SocketConnection`] | `ws`, `wss` |

mod legacy;
mod request_response;
mod socket;

pub use legacy::LegacyAdapter;
pub use request_response::RequestResponseAdapter;
pub use socket::SocketAdapter;

use async_trait::async_trait;
use protocol::{Exchange, RequestDescriptor, TransportOutcome};

use crate::selector::AdapterKind;

/// Uniform send contract shared by all transports.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Which adapter this is.
    fn kind(&self) -> AdapterKind;

    /// Sends `descriptor` and resolves to its single outcome.
    async fn send(&self, descriptor: &RequestDescriptor) -> TransportOutcome;
}

// Records `outcome` as the exchange's terminal result unless it already has
// one. Later events after a terminal phase are dropped.
fn settle(exchange: &mut Exchange, outcome: TransportOutcome) {
    if exchange.phase().is_terminal() {
        tracing::trace!(phase = ?exchange.phase(), "ignoring event after terminal phase");
        return;
    }
    if let Err(error) = exchange.record(outcome) {
        tracing::debug!(%error, "exchange rejected outcome");
    }
}
