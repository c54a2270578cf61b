//! Request and response bodies of the recognition service.

use facescan_core::{FaceRecord, RecognitionResult};
use serde::{Deserialize, Serialize};

pub const FACES_PATH: &str = "/faces";
pub const REGISTER_PATH: &str = "/register";
pub const RECOGNISE_PATH: &str = "/recognise";
pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const LOGOUT_PATH: &str = "/logout";

#[derive(Debug, Clone, Deserialize)]
pub struct FacesResponse {
    pub faces: Vec<FaceRecord>,
}

#[derive(Debug, Serialize)]
pub struct RegisterFaceRequest<'a> {
    pub name: &'a str,
    /// Bare base64 image body.
    pub face_data: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RecogniseRequest<'a> {
    pub face_data: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecogniseResponse {
    pub name: String,
    pub face_match_ratio: f64,
}

impl RecogniseResponse {
    pub fn into_result(self) -> RecognitionResult {
        let ratio = if self.face_match_ratio.is_finite() {
            self.face_match_ratio.clamp(0.0, 100.0)
        } else {
            0.0
        };
        if ratio != self.face_match_ratio {
            tracing::warn!(
                reported = self.face_match_ratio,
                clamped = ratio,
                "match ratio outside [0, 100]"
            );
        }
        RecognitionResult {
            name: self.name,
            match_ratio: ratio,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Error body: `{ "msg": "..." }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    pub msg: String,
}
