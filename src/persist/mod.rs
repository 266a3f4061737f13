//! Persistence boundary: the remote plan document store.
//!
//! `RemoteStore` is the pure I/O seam; `HttpStore` talks to the hosted
//! backend, `MemoryStore` backs tests. `PersistenceClient` is the thin
//! typed wrapper the rest of the engine uses.

mod client;
mod http;
mod memory;

pub use client::{PersistenceClient, RemoteStore};
pub use http::HttpStore;
pub use memory::MemoryStore;
