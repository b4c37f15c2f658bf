//! Asynchronous message-dispatch core.
//!
//! * [`Router`] / [`SendPort`] – destination resolution and forwarding.
//! * [`PendingTable`] – request-id to continuation correlation with single-fire completion.
//! * [`Continuation`] – caller handler invoked once per delivered result.
//! * [`Executor`] – serial execution context that runs continuations and handlers.
//! * [`DispatchError`] – error surface shared by every layer above.

mod continuation;
mod error;
mod executor;
pub mod pending;
mod router;

pub use continuation::{Continuation, Outcome};
pub use error::{DispatchError, DispatchResult, ErrorCode};
pub use executor::{Executor, Job};
pub use pending::{PendingTable, TableStatsSnapshot, DEFAULT_SHARDS};
pub use router::{Endpoint, Router, SendPort};
