//! Bank-specific transport implementations.

pub mod comdirect;

pub use comdirect::ComdirectTransport;
