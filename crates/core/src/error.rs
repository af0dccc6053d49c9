use lendwatch_protocol::OracleError;
use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Data availability problems (failed sources, unknown tokens, infeasible
/// leverage) are not errors; they show up as empty collections.
#[derive(Debug, Error)]
pub enum EngineError {
    // -- Caller misuse ------------------------------------------------------
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("invalid quote parameters: {0}")]
    InvalidParams(String),

    // -- Pricing ------------------------------------------------------------
    #[error("price unavailable for {token}")]
    PriceUnavailable {
        token: String,
        #[source]
        source: OracleError,
    },

    // -- Fatal --------------------------------------------------------------
    #[error("internal error: {0}")]
    Internal(String),
}
