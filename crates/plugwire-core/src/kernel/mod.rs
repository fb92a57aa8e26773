//! # Plugwire Kernel
//!
//! The [`System`] facade owns every piece of engine state: the provider
//! registry, the loader caches, the event dispatcher, the host's module loader
//! and the default requirement map. Hosts build one `System`, point it at
//! plugin folders or enable descriptors directly, and load components from it.
pub mod constants;
pub mod error;
pub mod system;

pub use error::{Error, Result};
pub use system::System;
