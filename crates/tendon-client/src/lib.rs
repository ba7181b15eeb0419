//! Tendon Client - Robot description loading
//!
//! A [`ModelLoader`] fetches a robot description from a [`ParamStore`],
//! parses it, builds the scene subtree and attaches it to a target root.

pub mod loader;
pub mod store;

pub use loader::{LoadError, LoadStatus, LoaderConfig, ModelLoader, DEFAULT_PARAM};
pub use store::{FileParamStore, HttpParamStore, MemoryParamStore, ParamStore, StoreError};
