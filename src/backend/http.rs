use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use tracing::debug;

use super::types::Recording;
use super::RecordingBackend;
use crate::error::BackendError;

/// HTTP client for the recording service.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BackendError::Status {
                status: status.as_u16(),
            })
        }
    }
}

/// A request that never reached the backend is `Unavailable`; everything
/// else stays a transport error.
fn transport(e: reqwest::Error) -> BackendError {
    if e.is_connect() || e.is_timeout() {
        BackendError::Unavailable(e.to_string())
    } else {
        BackendError::Http(e)
    }
}

#[async_trait]
impl RecordingBackend for HttpBackend {
    async fn create_recording(&self) -> Result<Recording, BackendError> {
        let response = self
            .request(Method::POST, "/recordings")
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response)?;
        let recording: Recording = response.json().await?;
        debug!(id = %recording.id, "created recording");
        Ok(recording)
    }

    async fn upload_chunk(
        &self,
        recording_id: &str,
        chunk_index: u64,
        payload: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let part = Part::bytes(payload)
            .file_name(format!("chunk_{chunk_index}.pcm"))
            .mime_str(content_type)?;
        let form = Form::new()
            .text("chunk_index", chunk_index.to_string())
            .part("audio_chunk", part);

        let response = self
            .request(Method::POST, &format!("/recordings/{recording_id}/chunks"))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response)?;
        debug!(recording_id, chunk_index, "chunk accepted");
        Ok(())
    }

    async fn pause_recording(&self, recording_id: &str) -> Result<(), BackendError> {
        let response = self
            .request(Method::PATCH, &format!("/recordings/{recording_id}/pause"))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response)?;
        Ok(())
    }

    async fn finish_recording(&self, recording_id: &str) -> Result<(), BackendError> {
        let response = self
            .request(Method::POST, &format!("/recordings/{recording_id}/finish"))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response)?;
        Ok(())
    }

    async fn update_notes(
        &self,
        recording_id: &str,
        notes: &str,
    ) -> Result<Recording, BackendError> {
        let form = Form::new().text("notes", notes.to_string());
        let response = self
            .request(Method::PATCH, &format!("/recordings/{recording_id}/notes"))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response)?;
        Ok(response.json().await?)
    }

    async fn list_recordings(&self) -> Result<Vec<Recording>, BackendError> {
        let response = self
            .request(Method::GET, "/recordings")
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response)?;
        Ok(response.json().await?)
    }

    async fn get_recording(&self, recording_id: &str) -> Result<Recording, BackendError> {
        let response = self
            .request(Method::GET, &format!("/recordings/{recording_id}"))
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response)?;
        Ok(response.json().await?)
    }
}
