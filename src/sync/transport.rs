//! HTTP transport for replaying sync actions against the remote API.
//!
//! The dispatcher builds a `RemoteRequest` per action and hands it to a
//! `RemoteTransport`. `HttpTransport` sends it with reqwest; `DryRunTransport`
//! only logs the request line, which is useful when pointing the service at a
//! remote that should not be written to.

use crate::sync::DispatchError;

use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP verb for a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMethod {
	/// Create under the list resource.
	Post,
	/// Replace the item resource.
	Put,
	/// Remove the item resource.
	Delete,
}

impl fmt::Display for RemoteMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			RemoteMethod::Post => "POST",
			RemoteMethod::Put => "PUT",
			RemoteMethod::Delete => "DELETE",
		})
	}
}

/// A fully resolved request for one sync action.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
	pub method: RemoteMethod,
	pub url: String,
	/// Wire-format entity state; absent for deletes.
	pub body: Option<serde_json::Value>,
}

impl fmt::Display for RemoteRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.body {
			Some(body) => write!(f, "{} {} data='{}'", self.method, self.url, body),
			None => write!(f, "{} {}", self.method, self.url),
		}
	}
}

/// Trait for sending resolved requests to the remote side.
///
/// Implementations make one attempt per call. Any transport error, timeout or
/// non-success status is returned as a `DispatchError`.
#[async_trait::async_trait]
pub trait RemoteTransport: Send + Sync {
	async fn send(&self, request: &RemoteRequest) -> Result<(), DispatchError>;

	/// Get the name of this transport for logging.
	fn name(&self) -> &'static str;
}

/// Transport that sends requests over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
	/// The underlying HTTP client.
	http_client: Client,
}

impl HttpTransport {
	/// Create a new HTTP transport.
	///
	/// # Arguments
	/// * `timeout` - Per-request timeout; an expired request counts as a failed dispatch.
	pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
		let http_client = Client::builder().timeout(timeout).build()?;
		Ok(Self { http_client })
	}
}

#[async_trait::async_trait]
impl RemoteTransport for HttpTransport {
	async fn send(&self, request: &RemoteRequest) -> Result<(), DispatchError> {
		debug!("Sending {} {}", request.method, request.url);

		let builder = match request.method {
			RemoteMethod::Post => self.http_client.post(&request.url),
			RemoteMethod::Put => self.http_client.put(&request.url),
			RemoteMethod::Delete => self.http_client.delete(&request.url),
		};
		let builder = match &request.body {
			Some(body) => builder.json(body),
			None => builder,
		};

		let response = builder.send().await?;

		if !response.status().is_success() {
			return Err(DispatchError::HttpStatus {
				method: request.method,
				url: request.url.clone(),
				status: response.status().as_u16(),
			});
		}

		debug!(
			"{} {} answered {}",
			request.method,
			request.url,
			response.status()
		);
		Ok(())
	}

	fn name(&self) -> &'static str {
		"http"
	}
}

/// Transport that logs each request instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTransport;

#[async_trait::async_trait]
impl RemoteTransport for DryRunTransport {
	async fn send(&self, request: &RemoteRequest) -> Result<(), DispatchError> {
		info!("{}", request);
		Ok(())
	}

	fn name(&self) -> &'static str {
		"dry-run"
	}
}
