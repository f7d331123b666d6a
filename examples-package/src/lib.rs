//! Runnable examples for the query memo workspace. See `examples/`.
