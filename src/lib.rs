//! Web configuration core for small networked devices.
//!
//! A device registers its configuration parameters in ordered groups,
//! persists them through a byte-addressable non-volatile store behind
//! a version tag, and serves a self-describing HTML form to edit them.
//! While the device runs as an access point, requests for foreign
//! hosts are redirected back to the device (captive portal).
//!
//! The network stack, the HTTP server and the concrete store are
//! supplied by the embedding binary through the [`ConfigStore`],
//! [`WebRequest`] and [`portal::ServerDriver`] traits; [`mock`] has
//! in-memory implementations for tests and host-side simulation.

pub mod mock;
pub mod parameter;
pub mod persist;
pub mod portal;
pub mod request;
pub mod store;

pub use parameter::{Node, NodeRef, ParamKind, Parameter, ParameterGroup};
pub use persist::{VersionedStorage, VERSION_TAG_LEN};
pub use portal::{ConfigPortal, DefaultHtmlProvider, HtmlFormatProvider, ServerDriver};
pub use request::WebRequest;
pub use store::ConfigStore;
