//! Integration tests for xscrape
//!
//! These tests use wiremock to create mock HTTP servers and run the
//! scraping services end-to-end against real storage.

mod retriever_tests;
mod scrape_tests;
