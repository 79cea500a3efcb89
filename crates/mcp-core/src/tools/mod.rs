//! Bundled tool modules. None of these are required by a deployment —
//! they exist to exercise the dispatcher end to end in tests and to give
//! a fresh server something to call on day one.

pub mod demo;
