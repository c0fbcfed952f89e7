//! Store configuration
//!
//! - `StoreConfig` - what a store needs before bootstrap: built-in identity,
//!   directories, storage backend and write policy
//! - `StoreConfigBuilder` - fluent construction of a `StoreConfig`
//! - `EnvSource` - where environment variables come from

mod types;

pub use types::{
    DEFAULT_MRU_CAPACITY, DefaultEnvSource, EnvSource, StoreConfig, StoreConfigBuilder,
    WritePolicy,
};
