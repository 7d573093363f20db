pub(crate) mod consistency;
pub(crate) mod precision;
pub(crate) mod transport;

pub use consistency::Consistency;
pub use precision::Precision;
pub use transport::Transport;
