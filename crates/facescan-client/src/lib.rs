//! facescan-client — Talks to the face recognition service.
//!
//! Wraps the remote contract (collection listing, registration,
//! recognition, authentication) with bearer-token attachment, error
//! classification, per-kind single-flight admission and a cached face
//! collection.

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod remote;
pub mod session;
pub mod transport;

pub use auth::{validate_credentials, AuthClient, AuthError};
pub use cache::{MutationKind, RequestCache, RequestError};
pub use client::FaceClient;
pub use remote::RemoteError;
pub use session::{FileSessionStore, MemorySessionStore, SessionError, SessionStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport, TransportError};
