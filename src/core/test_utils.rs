//! Test utilities for arena-based testing.
//!
//! Tests that build syntax trees need an arena that outlives the session and
//! every node allocated through it.
