//! Relay module tests.

mod line_test;
