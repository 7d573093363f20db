pub(crate) mod client;
pub(crate) mod registry;

pub use client::{BuildError, Client, ClientBuilder};
pub use registry::Registry;
