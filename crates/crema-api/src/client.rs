// Machine gateway HTTP client
//
// Wraps `reqwest::Client` with machine-scoped URL construction and
// `{ "data": ... }` envelope unwrapping. The push websocket lives in
// `websocket.rs`; this client only derives its URL and hands over the
// transport settings.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::command::MachineCommand;
use crate::error::Error;
use crate::status::{PushDelta, StatusMap, map_from_json};
use crate::transport::TransportConfig;
use crate::websocket::{PushRegistration, ReconnectConfig};

const API_PREFIX: &str = "api/v1/machines";

/// HTTP client for a single machine behind its gateway.
pub struct MachineClient {
    http: reqwest::Client,
    base_url: Url,
    serial_number: String,
    bearer: Option<String>,
}

impl MachineClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the gateway root (e.g. `https://gw.example.com` or a
    /// local bridge such as `http://192.168.1.40:8081`).
    pub fn new(
        base_url: Url,
        serial_number: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
            serial_number: serial_number.into(),
            bearer: transport.bearer(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client` and no token.
    pub fn from_reqwest(
        base_url: &str,
        serial_number: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            serial_number: serial_number.into(),
            bearer: None,
        })
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/v1/machines/{serial}/{path}`
    fn machine_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/{API_PREFIX}/{}/{path}",
            self.base_url.as_str().trim_end_matches('/'),
            self.serial_number,
        );
        Ok(Url::parse(&full)?)
    }

    /// Websocket endpoint for push deltas (`ws://` or `wss://` mirror of the base).
    pub fn events_url(&self) -> Result<Url, Error> {
        let mut url = self.machine_url("events")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(Error::WebSocketConnect(format!(
                    "no websocket scheme for '{other}'"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot switch scheme to {scheme}")))?;
        Ok(url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Pull the complete current status as one snapshot.
    pub async fn fetch_status(&self) -> Result<StatusMap, Error> {
        let url = self.machine_url("status")?;
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let body = check_status(resp).await?;
        parse_status_envelope(&body)
    }

    /// Write a single property on the machine.
    pub async fn send_command(&self, command: &MachineCommand) -> Result<(), Error> {
        let url = self.machine_url("commands")?;
        debug!(property = %command.property, "POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(command)
            .send()
            .await
            .map_err(Error::Transport)?;
        check_status(resp).await?;
        Ok(())
    }

    /// Open the push channel. Deltas flow into `deltas` until `cancel` fires.
    pub fn open_push(
        &self,
        deltas: mpsc::Sender<PushDelta>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<PushRegistration, Error> {
        let url = self.events_url()?;
        Ok(PushRegistration::connect(
            url,
            reconnect,
            cancel,
            self.bearer.clone(),
            deltas,
        ))
    }
}

/// Map HTTP status codes onto the error taxonomy, returning the body on success.
async fn check_status(resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::Transport)?;

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("token rejected (HTTP {})", status.as_u16()),
        });
    }

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        });
    }

    Ok(body)
}

/// Unwrap `{ "data": { ... } }` into a [`StatusMap`].
fn parse_status_envelope(body: &str) -> Result<StatusMap, Error> {
    let malformed = |message: String| Error::Deserialization {
        message,
        body: body.to_owned(),
    };

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    match value {
        serde_json::Value::Object(mut envelope) => match envelope.remove("data") {
            Some(serde_json::Value::Object(data)) => Ok(map_from_json(data)),
            Some(_) => Err(malformed("`data` is not an object".into())),
            None => Err(malformed("missing `data` field".into())),
        },
        _ => Err(malformed("status response is not an object".into())),
    }
}
