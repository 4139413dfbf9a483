//! Integration tests for spsync-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and verifies
//! end-to-end behavior of library resolution, inventory listing, uploads,
//! fingerprint writes and folder management.

mod common;

mod test_inventory;
mod test_metadata;
mod test_resolution;
mod test_upload;
