//! Integration tests for longshot-api
//!
//! Uses wiremock to simulate the Longshot server and verifies the request
//! bodies, millisecond timestamps, and status mapping of LongshotClient.

mod common;

mod test_declare;
mod test_errors;
mod test_orders;
mod test_sync_values;
