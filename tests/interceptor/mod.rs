//! Interceptor module tests.

mod runner_test;
