//! zkv-core: types shared by every zkvault crate
//!
//! - `config`: `zkv.toml` schema
//! - `error`: the protocol / auth / integrity / transport error taxonomy
//! - `types`: upload records, chunk descriptors, the identity record
//! - `api`: JSON request/response bodies and multipart part names of the HTTP API

pub mod api;
pub mod config;
pub mod error;
pub mod types;

pub use error::{AuthFailure, ZkvError, ZkvResult};
