//! Channel transport credentials.
//!
//! Safe construction, composition, and lifetime management of TLS channel
//! credentials on top of an opaque [`TlsPrimitive`]:
//!
//! - [`CredentialsContext`]: builds credentials from PEM material and
//!   verification options
//! - [`ChannelCredentials::compose`]: layers call credentials on top
//! - [`bridge`]: runs peer verification callbacks for the TLS layer on the
//!   [`Dispatcher`] and maps the outcome to accept/reject
//! - [`roots`]: process-wide default root certificates
//!
//! TLS itself is not implemented here. `chancred-rustls` provides a
//! `rustls`-backed primitive; [`MemoryPrimitive`] is an in-memory one.

pub mod bridge;
pub mod call;
mod compose;
pub mod config;
pub mod construct;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod memory;
pub mod pem;
pub mod primitive;
pub mod roots;
pub mod store;
pub mod verify;

pub use call::CallCredentials;
pub use config::CredentialsConfig;
pub use construct::CredentialsContext;
pub use dispatch::Dispatcher;
pub use error::CredentialsError;
pub use memory::MemoryPrimitive;
pub use pem::PemBuffer;
pub use primitive::TlsPrimitive;
pub use store::ChannelCredentials;
pub use verify::{VerifyCallback, VerifyOptions, VerifyRejection};
