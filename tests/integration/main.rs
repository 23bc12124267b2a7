//! Integration tests for Market-Scout
//!
//! These tests drive the public API end-to-end: real HTTP clients against wiremock
//! servers, the fetch pool under load, and whole jobs through the runner with
//! scripted collaborators.

mod collaborator_tests;
mod fetch_tests;
mod pipeline_tests;
mod support;
