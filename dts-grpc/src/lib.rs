//! Thin client helpers for the Draw Things gRPCServerCLI.
//!
//! The service contract lives in `proto/image_generation.proto` and is owned
//! by the server binary; this crate only compiles it and wraps call sites:
//! - [`channel`]: [`ConnectionConfig`] and [`create_channel_and_stub`]
//! - [`guard`]: maps `tonic::Status` into a [`CallError`] with a [`CallCategory`]
//! - [`health`]: [`is_server_running`] / [`probe`]
//! - [`calls`]: `Echo`, `FilesExist` and `UploadFile` through the guard

pub mod calls;
pub mod channel;
mod error;
pub mod guard;
pub mod health;

/// Generated messages, client stub and server trait for `drawthings`.
pub mod proto {
    tonic::include_proto!("drawthings");
}

pub use calls::{echo, files_exist, upload_file, FileStatus, UPLOAD_CHUNK_SIZE};
pub use channel::{
    create_channel_and_stub, ConnectionConfig, ImageGenerationClient, SecretInterceptor,
    SHARED_SECRET_METADATA,
};
pub use error::{CallCategory, CallError, ChannelError};
pub use guard::{guard, guard_with};
pub use health::{is_server_running, probe, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PROBE_TIMEOUT};
