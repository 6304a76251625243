//! HTTP transport for the campus API.
//!
//! This module provides the raw client and the endpoint catalogue. It knows
//! nothing about sessions; credentials are passed in per request.

mod client;
pub(crate) mod endpoints;

pub use client::{ApiClient, ApiRequest, ApiResponse, Method};
