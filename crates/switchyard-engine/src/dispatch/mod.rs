//! Dispatch types shared by the engine and the transport.
//!
//! A transport hands the engine a [`CommandRequest`] and receives either a
//! [`DispatchOutcome`] or a [`DispatchError`]. Outcomes are values produced
//! locally or [`ProxyDirective`]s the transport must relay; errors render to
//! W3C error bodies.

mod chain;
mod errors;
mod proxy;
mod request;


pub(crate) use self::chain::{Stage, run_chain};
pub use self::errors::{CancelReason, DispatchError, ErrorCode};
pub use self::proxy::{
    NoProxy, ProxyDirective, ProxyPolicy, ProxyTarget, SESSION_ID_PARAM, rewrite_path,
    rewrite_payload,
};
pub use self::request::{
    CommandRequest, DELETE_SESSION_COMMAND, DispatchOutcome, SessionCreated,
};
