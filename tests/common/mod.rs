//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use rtapp_builder::{BuildError, ErrorKind};

/// Assert that a build failed with the given kind
pub fn assert_kind<T: std::fmt::Debug>(result: Result<T, BuildError>, expected: ErrorKind) {
    match result {
        Ok(value) => panic!("Expected {:?} failure, got {:?}", expected, value),
        Err(e) => assert_eq!(
            e.kind(),
            Some(expected),
            "Expected {:?}, got error: {}",
            expected,
            e
        ),
    }
}
