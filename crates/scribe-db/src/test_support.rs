//! Shared test utilities for scribe-db unit tests.
