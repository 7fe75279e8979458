//! # Intake Client
//!
//! REST implementation of [`PatientDirectory`] for the hospital backend.
//!
//! Two endpoints are used, both relative to a configured base URL:
//!
//! - `POST {base}/patients` with a [`CreatePatientRequest`], answering
//!   `{"patientId": "...", "recordNumber": "..."}`
//! - `POST {base}/patients/{patientId}/vitals` with the readings and `recordedBy`,
//!   answering the persisted vital signs
//!
//! Requests carry an `x-api-key` header when a key is configured. There are no retries;
//! timeouts are whatever the supplied [`reqwest::Client`] is configured with.

use async_trait::async_trait;
use intake_core::{
    CreatePatientRequest, CreatedPatient, DirectoryError, DirectoryResult, PatientDirectory,
    RecordVitalsRequest, VitalSigns,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// Header used to authenticate against the backend.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("INTAKE_API_URL is not set")]
    MissingBaseUrl,
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("base URL must be http or https, got '{0}'")]
    UnsupportedScheme(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Body of the vitals endpoint; the patient id travels in the path.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VitalsBody<'a> {
    #[serde(flatten)]
    vitals: &'a VitalSigns,
    recorded_by: &'a intake_core::Author,
}

/// Error bodies the backend is known to send.
#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// A [`PatientDirectory`] talking to the hospital REST API.
#[derive(Debug, Clone)]
pub struct HttpPatientDirectory {
    http_client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpPatientDirectory {
    /// Creates a directory client with a default [`reqwest::Client`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidBaseUrl` or `ClientError::UnsupportedScheme` if
    /// `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str, api_key: Option<String>) -> ClientResult<Self> {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    /// Creates a directory client that sends requests through `http_client`.
    pub fn with_client(
        http_client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(base_url.trim())?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ClientError::UnsupportedScheme(base_url.scheme().to_string()));
        }

        Ok(Self {
            http_client,
            base_url,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// Builds a client from the raw `INTAKE_API_URL` and `INTAKE_API_KEY` values.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingBaseUrl` if no URL is given, otherwise as
    /// [`new`](Self::new).
    pub fn from_env_values(url: Option<String>, api_key: Option<String>) -> ClientResult<Self> {
        let url = url
            .filter(|value| !value.trim().is_empty())
            .ok_or(ClientError::MissingBaseUrl)?;
        Self::new(&url, api_key)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DirectoryError::Transport(format!("unusable base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B, T>(&self, url: Url, body: &B) -> DirectoryResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {}", url);

        let mut request = self.http_client.post(url.clone()).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("POST {} answered {}", url, status);
            return Err(rejection(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))
    }
}

/// Maps a non-2xx answer to a rejection, preferring the backend's own message.
fn rejection(status: StatusCode, body: &str) -> DirectoryError {
    let from_json = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty());

    let message = from_json
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "request failed".to_string());

    DirectoryError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl PatientDirectory for HttpPatientDirectory {
    async fn create_patient(
        &self,
        request: &CreatePatientRequest,
    ) -> DirectoryResult<CreatedPatient> {
        let url = self.endpoint(&["patients"])?;
        self.post(url, request).await
    }

    async fn record_vitals(&self, request: &RecordVitalsRequest) -> DirectoryResult<VitalSigns> {
        let url = self.endpoint(&["patients", request.patient_id.as_str(), "vitals"])?;
        let body = VitalsBody {
            vitals: &request.vitals,
            recorded_by: &request.recorded_by,
        };
        self.post(url, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::{AccountType, Author, PersonalInfo, StaffRole};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn directory(base: &str) -> HttpPatientDirectory {
        HttpPatientDirectory::new(base, Some("secret".into())).expect("valid base URL")
    }

    #[test]
    fn endpoints_join_onto_base_path() {
        let with_slash = directory("https://hospital.example/api/v1/");
        let without_slash = directory("https://hospital.example/api/v1");

        for d in [with_slash, without_slash] {
            assert_eq!(
                d.endpoint(&["patients"]).unwrap().as_str(),
                "https://hospital.example/api/v1/patients"
            );
        }
    }

    #[test]
    fn patient_id_is_encoded_as_one_segment() {
        let d = directory("http://localhost:8080");
        let url = d.endpoint(&["patients", "a/b c", "vitals"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/patients/a%2Fb%20c/vitals");
    }

    #[test]
    fn construction_rejects_bad_urls() {
        assert!(matches!(
            HttpPatientDirectory::new("not a url", None),
            Err(ClientError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            HttpPatientDirectory::new("ftp://hospital.example", None),
            Err(ClientError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            HttpPatientDirectory::from_env_values(Some("  ".into()), None),
            Err(ClientError::MissingBaseUrl)
        ));
    }

    #[test]
    fn blank_api_key_is_dropped() {
        let d = HttpPatientDirectory::new("https://hospital.example", Some(" ".into())).unwrap();
        assert!(d.api_key.is_none());
    }

    #[test]
    fn rejection_prefers_backend_message() {
        let err = rejection(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"duplicate patient"}"#,
        );
        assert_eq!(
            err,
            DirectoryError::Rejected {
                status: 422,
                message: "duplicate patient".into()
            }
        );

        let err = rejection(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert!(matches!(err, DirectoryError::Rejected { status: 502, ref message } if message == "upstream down"));

        let err = rejection(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, DirectoryError::Rejected { ref message, .. } if message == "Service Unavailable"));
    }

    #[test]
    fn vitals_body_flattens_readings() {
        let author = Author::new("Nurse Joy", StaffRole::Nurse, "joy@example.com").unwrap();
        let vitals = VitalSigns {
            heart_rate: Some(72.0),
            ..Default::default()
        };
        let json = serde_json::to_value(VitalsBody {
            vitals: &vitals,
            recorded_by: &author,
        })
        .unwrap();

        assert_eq!(json["heartRate"], 72.0);
        assert_eq!(json["recordedBy"]["role"], "nurse");
        assert!(json.get("patientId").is_none());
    }

    fn author() -> Author {
        Author::new("Front Desk", StaffRole::Receptionist, "desk@example.com").unwrap()
    }

    fn create_request() -> CreatePatientRequest {
        CreatePatientRequest {
            account_type: AccountType::Personal,
            personal_info: PersonalInfo {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                ..Default::default()
            },
            contact_info: None,
            next_of_kin: None,
            family_members: vec![],
            created_by: author(),
        }
    }

    /// True once `raw` holds the request headers and the body they announce.
    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= end + 4 + length
    }

    /// Accepts one connection, answers it with `status` and `body`, and hands back the
    /// raw request it received.
    async fn answer_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("listener address");

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept connection");
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&raw) {
                let n = socket.read(&mut buf).await.expect("read request");
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write response");
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&raw).into_owned()
        });

        (format!("http://{addr}/api"), handle)
    }

    #[tokio::test]
    async fn create_patient_decodes_assigned_identifiers() {
        let (base, server) =
            answer_once("201 Created", r#"{"patientId":"p1","recordNumber":"TH001"}"#).await;

        let created = directory(&base)
            .create_patient(&create_request())
            .await
            .expect("backend accepted the patient");
        assert_eq!(created.patient_id.as_str(), "p1");
        assert_eq!(created.record_number.as_str(), "TH001");

        let raw = server.await.expect("server task");
        let lower = raw.to_ascii_lowercase();
        assert!(raw.starts_with("POST /api/patients HTTP/1.1"), "{raw}");
        assert!(lower.contains("x-api-key: secret"), "{raw}");
        assert!(raw.contains(r#""createdBy":{"#), "{raw}");
        assert!(raw.contains(r#""firstName":"Ada""#), "{raw}");
    }

    #[tokio::test]
    async fn record_vitals_maps_error_status_to_rejection() {
        let (base, server) = answer_once(
            "422 Unprocessable Entity",
            r#"{"message":"patient is archived"}"#,
        )
        .await;

        let request = RecordVitalsRequest {
            patient_id: intake_core::PatientId::new("p1").unwrap(),
            vitals: VitalSigns {
                heart_rate: Some(72.0),
                ..Default::default()
            },
            recorded_by: author(),
        };
        let err = directory(&base)
            .record_vitals(&request)
            .await
            .expect_err("backend refused the vitals");
        assert_eq!(
            err,
            DirectoryError::Rejected {
                status: 422,
                message: "patient is archived".into()
            }
        );

        let raw = server.await.expect("server task");
        assert!(raw.starts_with("POST /api/patients/p1/vitals HTTP/1.1"), "{raw}");
        assert!(raw.contains(r#""heartRate":72.0"#), "{raw}");
    }

    #[tokio::test]
    async fn malformed_success_body_is_an_invalid_response() {
        let (base, server) = answer_once("200 OK", r#"{"patientId":""}"#).await;

        let err = directory(&base)
            .create_patient(&create_request())
            .await
            .expect_err("body lacks a record number");
        assert!(matches!(err, DirectoryError::InvalidResponse(_)));
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let d = directory("http://127.0.0.1:9");

        let err = d
            .create_patient(&create_request())
            .await
            .expect_err("nothing listens on port 9");
        assert!(matches!(err, DirectoryError::Transport(_)));
    }
}
