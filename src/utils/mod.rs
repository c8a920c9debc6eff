//! The `utils` module provides definitions shared across the `seqmq`
//! application: the error taxonomy and tracing initialisation.

pub mod error;
pub mod logging;
