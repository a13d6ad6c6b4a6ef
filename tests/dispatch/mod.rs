//! Dispatch module tests.
