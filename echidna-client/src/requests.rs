//! Publication request endpoints

use std::path::Path;
use std::time::{Duration, Instant};

use echidna_core::domain::request::RequestRecord;
use reqwest::multipart::{Form, Part};
use uuid::Uuid;

use crate::EchidnaClient;
use crate::error::{ClientError, Result};

/// How a tar submission is authorized
#[derive(Debug, Clone)]
pub enum TarAuth {
    /// Publication token
    Token(String),
    /// W3C account, sent as HTTP basic credentials
    Credentials { username: String, password: String },
}

impl EchidnaClient {
    // =============================================================================
    // Submission
    // =============================================================================

    /// Submit a document by URL
    ///
    /// # Arguments
    /// * `url` - URL of the document or its manifest
    /// * `token` - Publication token
    /// * `decision` - URL of the publication decision
    /// * `dry_run` - Run the checks without publishing
    /// * `cc` - Extra recipient of the notification
    ///
    /// # Returns
    /// The ID of the new request
    pub async fn submit_url(
        &self,
        url: &str,
        token: &str,
        decision: &str,
        dry_run: bool,
        cc: Option<&str>,
    ) -> Result<Uuid> {
        let mut fields = vec![("url", url), ("token", token), ("decision", decision)];
        if dry_run {
            fields.push(("dry-run", "true"));
        }
        if let Some(cc) = cc {
            fields.push(("cc", cc));
        }

        let response = self
            .client
            .post(self.url("/api/request"))
            .form(&fields)
            .send()
            .await?;

        self.accepted(response).await
    }

    /// Submit a tar archive
    ///
    /// # Arguments
    /// * `path` - Archive to upload
    /// * `auth` - Token or basic credentials
    /// * `decision` - URL of the publication decision
    /// * `dry_run` - Run the checks without publishing
    /// * `cc` - Extra recipient of the notification
    ///
    /// # Returns
    /// The ID of the new request
    pub async fn submit_tar(
        &self,
        path: &Path,
        auth: TarAuth,
        decision: &str,
        dry_run: bool,
        cc: Option<&str>,
    ) -> Result<Uuid> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.tar")
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/x-tar")?;
        let mut form = Form::new()
            .part("tar", part)
            .text("decision", decision.to_string());
        if dry_run {
            form = form.text("dry-run", "true");
        }
        if let Some(cc) = cc {
            form = form.text("cc", cc.to_string());
        }

        let mut request = self.client.post(self.url("/api/request"));
        match auth {
            TarAuth::Token(token) => form = form.text("token", token),
            TarAuth::Credentials { username, password } => {
                request = request.basic_auth(username, Some(password));
            }
        }

        let response = request.multipart(form).send().await?;
        self.accepted(response).await
    }

    async fn accepted(&self, response: reqwest::Response) -> Result<Uuid> {
        let body = self.handle_text_response(response).await?;
        body.trim()
            .parse()
            .map_err(|e| ClientError::ParseError(format!("Invalid request ID '{}': {}", body, e)))
    }

    // =============================================================================
    // Status
    // =============================================================================

    /// Current record of a request
    pub async fn status(&self, id: Uuid) -> Result<RequestRecord> {
        let response = self
            .client
            .get(self.url("/api/status"))
            .query(&[("id", id.to_string())])
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Poll a request until its status is terminal
    ///
    /// # Arguments
    /// * `id` - The request ID
    /// * `interval` - Delay between two polls
    /// * `timeout` - Give up after this long
    pub async fn wait(&self, id: Uuid, interval: Duration, timeout: Duration) -> Result<RequestRecord> {
        let started = Instant::now();

        loop {
            let record = self.status(id).await?;
            let status = record.results.status();
            if status.is_terminal() {
                return Ok(record);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ClientError::Timeout { id, waited });
            }

            tracing::debug!("Request {} is {}, polling again in {:?}", id, status, interval);
            tokio::time::sleep(interval.min(timeout - waited)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echidna_core::domain::state::RequestStatus;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves the given responses in order, one per connection, and records
    /// the raw requests
    async fn serve(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (base, seen)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    return text;
                }
            }
            if n == 0 {
                return String::from_utf8_lossy(&data).to_string();
            }
        }
    }

    fn record_json(id: Uuid, job_status: &str, status: &str) -> String {
        serde_json::json!({
            "id": id,
            "url": "https://example.org/doc",
            "version": "0.1.0",
            "version-specberus": "5.4.1",
            "decision": "d",
            "results": {
                "jobs": { "metadata": { "status": job_status, "errors": [] } },
                "status": status
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_submit_url() {
        let id = Uuid::new_v4();
        let (base, seen) = serve(vec![(202, id.to_string())]).await;
        let client = EchidnaClient::new(base);

        let got = client
            .submit_url("https://example.org/doc", "abc", "d", true, Some("me@example.org"))
            .await
            .unwrap();
        assert_eq!(got, id);

        let request = seen.lock().unwrap()[0].clone();
        assert!(request.starts_with("POST /api/request "));
        assert!(request.contains("application/x-www-form-urlencoded"));
        assert!(request.contains("dry-run=true"));
        assert!(request.contains("cc=me%40example.org"));
    }

    #[tokio::test]
    async fn test_submit_rejected() {
        let (base, _) = serve(vec![(500, "Missing required parameters".to_string())]).await;
        let client = EchidnaClient::new(base);

        let err = client
            .submit_url("https://example.org/doc", "abc", "", false, None)
            .await
            .unwrap_err();
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn test_submit_tar_missing_file() {
        let client = EchidnaClient::new("http://127.0.0.1:1");
        let err = client
            .submit_tar(
                Path::new("/nonexistent/spec.tar"),
                TarAuth::Token("abc".to_string()),
                "d",
                false,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ReadFailed { .. }));
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let (base, _) = serve(vec![(404, "No job found".to_string())]).await;
        let client = EchidnaClient::new(base);

        let err = client.status(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_wait_until_terminal() {
        let id = Uuid::new_v4();
        let (base, seen) = serve(vec![
            (200, record_json(id, "running", "running")),
            (200, record_json(id, "success", "success")),
        ])
        .await;
        let client = EchidnaClient::new(base);

        let record = client
            .wait(id, Duration::from_millis(10), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.results.status(), RequestStatus::Success);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let id = Uuid::new_v4();
        let (base, _) = serve(vec![(200, record_json(id, "running", "running"))]).await;
        let client = EchidnaClient::new(base);

        let err = client
            .wait(id, Duration::from_millis(10), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
    }
}
