//! Client-side communication layer for the `/api/*` backend.
//!
//! # Overview
//! A remote call classifies its named parameters into URL query parameters
//! and a JSON body, builds the request, hands it to a `Transport`, and
//! resolves the response into decoded JSON (or text) or a `RemoteError`.
//! Two stateful primitives sit on top of it:
//!
//! - `DataAccessor` refetches an endpoint whenever a dependency key changes
//!   and never lets a superseded call overwrite a newer value.
//! - `StateSync` binds a value to a URL query parameter, reading it once at
//!   creation and mirroring every later change back.
//!
//! # Design
//! - Parameters travelling as primitives go to the query string; anything
//!   structured goes to the body. One body parameter is sent bare, several
//!   are sent as an object keyed by name.
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`),
//!   so building and resolution are testable without a network.
//! - Nothing is cached, retried or cancelled.

pub mod accessor;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod param;
pub mod state_sync;
pub mod transport;

pub use accessor::{AccessorConfig, DataAccessor, IncompletePolicy};
pub use client::{decode_as, parse_json, parse_text, RemoteClient};
pub use config::ClientConfig;
pub use error::{CallError, ConfigError, DecodeError, RemoteError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use param::{classify, CallParameter, Classified, CustomSerialize, Params, PartialParams, Primitive};
pub use state_sync::{QueryParameterStore, StateSync, UrlQueryStore};
pub use transport::{Transport, UreqTransport};
