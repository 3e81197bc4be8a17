// SPDX-License-Identifier: MIT OR Apache-2.0

/// Wraps the supplied `ErrorInt` and returns it as an `Err`.
macro_rules! bail {
    ($e:expr) => {
        return Err(crate::error::Error(std::sync::Arc::new($e)))
    };
}

/// Wraps the supplied `ErrorInt` as an `Error`, without returning it.
macro_rules! wrap {
    ($e:expr) => {
        crate::error::Error(std::sync::Arc::new($e))
    };
}
