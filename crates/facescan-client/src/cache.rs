//! Request cache: the face collection cache plus single-flight admission
//! for mutations.
//!
//! At most one `register` and one `recognize` call are outstanding at any
//! time. A second call of the same kind is refused, not queued. Different
//! kinds run independently.

use crate::api::{
    FacesResponse, RecogniseRequest, RecogniseResponse, RegisterFaceRequest, FACES_PATH,
    RECOGNISE_PATH, REGISTER_PATH,
};
use crate::remote::{round_trip, RemoteError};
use crate::session::SessionStore;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use facescan_core::{EncodedImage, FaceRecord, RecognitionResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Register,
    Recognize,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Register => "register",
            Self::Recognize => "recognize",
        })
    }
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("a {0} request is already in flight")]
    InFlight(MutationKind),
    #[error("{0}")]
    InvalidName(String),
    #[error("no face image captured")]
    MissingPayload,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

impl RequestError {
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.remote().is_some_and(RemoteError::is_not_found)
    }
}

/// Check a face name and return it trimmed.
pub fn validate_face_name(name: &str) -> Result<&str, RequestError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        Err(RequestError::InvalidName("Face name is required".into()))
    } else if len < MIN_NAME_LEN {
        Err(RequestError::InvalidName(format!(
            "Name must be at least {MIN_NAME_LEN} characters"
        )))
    } else if len > MAX_NAME_LEN {
        Err(RequestError::InvalidName(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )))
    } else {
        Ok(trimmed)
    }
}

#[derive(Default)]
struct FacesSlot {
    /// Bumped on every invalidation; a fetch only stores its result if the
    /// epoch it started under is still current.
    epoch: u64,
    entries: Option<Vec<FaceRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held for the lifetime of one admitted mutation; releases the slot on
/// drop, whether the call settled, failed, or was abandoned.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<MutationKind>>,
    kind: MutationKind,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.kind);
        tracing::trace!(kind = %self.kind, "mutation settled");
    }
}

pub struct RequestCache {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
    faces: Mutex<FacesSlot>,
    in_flight: Mutex<HashSet<MutationKind>>,
}

impl RequestCache {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            transport,
            session,
            faces: Mutex::new(FacesSlot::default()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// The face collection, from cache when present.
    pub async fn faces(&self) -> Result<Vec<FaceRecord>, RequestError> {
        let epoch = {
            let slot = lock(&self.faces);
            if let Some(entries) = &slot.entries {
                return Ok(entries.clone());
            }
            slot.epoch
        };

        let resp = self
            .send(ApiRequest::get(FACES_PATH), "Failed to load faces")
            .await?;
        let faces = resp.json::<FacesResponse>()?.faces;

        let mut slot = lock(&self.faces);
        if slot.epoch == epoch {
            slot.entries = Some(faces.clone());
        } else {
            tracing::debug!("collection invalidated during fetch; not caching");
        }
        Ok(faces)
    }

    /// Drop the cached collection and fetch it again.
    pub async fn refresh_faces(&self) -> Result<Vec<FaceRecord>, RequestError> {
        self.invalidate_faces();
        self.faces().await
    }

    pub fn invalidate_faces(&self) {
        let mut slot = lock(&self.faces);
        slot.epoch += 1;
        slot.entries = None;
    }

    pub fn cached_faces(&self) -> Option<Vec<FaceRecord>> {
        lock(&self.faces).entries.clone()
    }

    /// Forget all client-side state, e.g. on logout.
    pub fn clear(&self) {
        self.invalidate_faces();
    }

    pub fn is_pending(&self, kind: MutationKind) -> bool {
        lock(&self.in_flight).contains(&kind)
    }

    /// Register a face under `name`. On success the cached collection is
    /// invalidated so the next read carries the server's record.
    pub async fn register(&self, name: &str, payload: &EncodedImage) -> Result<(), RequestError> {
        let name = validate_face_name(name)?;
        if payload.is_empty() {
            return Err(RequestError::MissingPayload);
        }
        let _guard = self.admit(MutationKind::Register)?;

        let body = serde_json::to_value(RegisterFaceRequest {
            name,
            face_data: payload.body(),
        })?;
        self.send(ApiRequest::post(REGISTER_PATH, body), "Registration failed")
            .await?;

        self.invalidate_faces();
        tracing::info!(name, "face registered");
        Ok(())
    }

    /// Match an image against the collection. A 404 means nothing is
    /// registered yet and surfaces as [`RemoteError::NotFound`].
    pub async fn recognize(&self, payload: &EncodedImage) -> Result<RecognitionResult, RequestError> {
        if payload.is_empty() {
            return Err(RequestError::MissingPayload);
        }
        let _guard = self.admit(MutationKind::Recognize)?;

        let body = serde_json::to_value(RecogniseRequest {
            face_data: payload.body(),
        })?;
        let resp = self
            .send(ApiRequest::post(RECOGNISE_PATH, body), "Recognition failed")
            .await?;
        let result = resp.json::<RecogniseResponse>()?.into_result();

        tracing::info!(name = %result.name, ratio = result.match_ratio, "face recognized");
        Ok(result)
    }

    fn admit(&self, kind: MutationKind) -> Result<FlightGuard<'_>, RequestError> {
        if !lock(&self.in_flight).insert(kind) {
            tracing::debug!(%kind, "refused: already in flight");
            return Err(RequestError::InFlight(kind));
        }
        Ok(FlightGuard {
            in_flight: &self.in_flight,
            kind,
        })
    }

    async fn send(&self, request: ApiRequest, fallback: &str) -> Result<ApiResponse, RemoteError> {
        let request = request.with_bearer(self.session.token());
        let result = round_trip(self.transport.as_ref(), request, fallback).await;
        if let Err(RemoteError::Unauthorized { .. }) = &result {
            self.session.on_unauthorized();
            self.clear();
        }
        result
    }
}
