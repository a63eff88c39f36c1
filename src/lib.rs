//! # hublink
//!
//! Host-side client for LEGO SPIKE Prime hubs over Bluetooth Low Energy.
//!
//! The crate covers the whole path from bytes to programs:
//!
//! - **Framing** ([`protocol`]): the hub's COBS variant, the XOR mask, the
//!   frame delimiter, and the CRC-32 used for uploads.
//! - **Messages** ([`message`]): typed requests, responses, and
//!   notifications with their binary layout.
//! - **Session** ([`Session`]): connection lifecycle, packet fragmentation,
//!   notification reassembly, and request/response correlation.
//! - **Uploads** ([`ProgramUploader`]): slot clearing, chunked transfer with
//!   a running checksum, and program start/stop.
//!
//! The BLE backend is behind the `btleplug` feature; any other link can be
//! plugged in by implementing [`transport::HubAdapter`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hublink::transport::btle::BtleAdapter;
//! use hublink::{ProgramUploader, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> hublink::Result<()> {
//!     let adapter = BtleAdapter::first().await?;
//!     let session = Session::new(SessionConfig::default(), Arc::new(adapter))?;
//!     session.connect().await?;
//!
//!     let uploader = ProgramUploader::new(session.clone());
//!     uploader
//!         .upload_and_run("program.py", 0, b"print('hello')\n")
//!         .await?;
//!
//!     session.disconnect().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;
pub mod uploader;

mod writer;

pub use config::SessionConfig;
pub use error::{HubError, Result, UploadStage};
pub use message::Message;
pub use retry::{Backoff, RetryPolicy};
pub use session::{ConnectionState, Session};
pub use uploader::ProgramUploader;
