use super::{AppInfo, DesignerApi, ExecRequest, GraphInfo, LineStream};
use crate::config::ClientConfig;
use crate::error::{LifecycleError, LifecycleResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const API_PREFIX: &str = "/api/designer/v1";

/// Response envelope shared by every designer endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self, what: &str) -> LifecycleResult<Option<T>> {
        if self.status.eq_ignore_ascii_case("ok") {
            Ok(self.data)
        } else {
            Err(LifecycleError::Transport(
                self.message
                    .unwrap_or_else(|| format!("{what} failed with status {}", self.status)),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppList {
    #[serde(default)]
    app_info: Vec<AppInfo>,
}

#[derive(Debug, Serialize)]
struct BaseDirBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_dir: Option<&'a str>,
}

#[derive(Clone)]
pub struct HttpDesignerClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: std::time::Duration,
}

impl HttpDesignerClient {
    pub fn new(cfg: &ClientConfig) -> LifecycleResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.request_timeout)
            .build()
            .map_err(|e| LifecycleError::Transport(format!("http client init: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            request_timeout: cfg.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn decode<T: DeserializeOwned>(
        resp: reqwest::Response,
        what: &str,
    ) -> LifecycleResult<Option<T>> {
        let status = resp.status();
        let body = resp.bytes().await?;
        // Failed requests usually still carry an envelope with a message.
        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(envelope) if status.is_success() => envelope.into_result(what),
            Ok(envelope) => Err(LifecycleError::Transport(envelope.message.unwrap_or_else(
                || format!("{what} failed: HTTP {status}"),
            ))),
            Err(_) if !status.is_success() => Err(LifecycleError::Transport(format!(
                "{what} failed: HTTP {status}"
            ))),
            Err(e) => Err(LifecycleError::Validation(format!("{what}: {e}"))),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> LifecycleResult<Option<T>> {
        let resp = self
            .http
            .get(self.url(path))
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::decode(resp, what).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        what: &str,
    ) -> LifecycleResult<Option<T>> {
        let resp = self
            .http
            .post(self.url(path))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(resp, what).await
    }
}

#[async_trait]
impl DesignerApi for HttpDesignerClient {
    async fn list_apps(&self) -> LifecycleResult<Vec<AppInfo>> {
        let list: Option<AppList> = self.get("/apps", "list apps").await?;
        Ok(list.map(|l| l.app_info).unwrap_or_default())
    }

    async fn load_app(&self, base_dir: &str) -> LifecycleResult<()> {
        let body = BaseDirBody {
            base_dir: Some(base_dir),
        };
        self.post::<_, serde_json::Value>("/apps/load", &body, "load app")
            .await
            .map(|_| ())
    }

    async fn unload_app(&self, base_dir: &str) -> LifecycleResult<()> {
        let body = BaseDirBody {
            base_dir: Some(base_dir),
        };
        self.post::<_, serde_json::Value>("/apps/unload", &body, "unload app")
            .await
            .map(|_| ())
    }

    async fn reload_app(&self, base_dir: Option<&str>) -> LifecycleResult<()> {
        let body = BaseDirBody { base_dir };
        self.post::<_, serde_json::Value>("/apps/reload", &body, "reload app")
            .await
            .map(|_| ())
    }

    async fn list_scripts(&self, base_dir: &str) -> LifecycleResult<Vec<String>> {
        let body = BaseDirBody {
            base_dir: Some(base_dir),
        };
        let scripts: Option<Vec<String>> = self.post("/apps/scripts", &body, "list scripts").await?;
        Ok(scripts.unwrap_or_default())
    }

    async fn list_graphs(&self) -> LifecycleResult<Vec<GraphInfo>> {
        let graphs: Option<Vec<GraphInfo>> = self.get("/graphs", "list graphs").await?;
        Ok(graphs.unwrap_or_default())
    }

    async fn exec(&self, request: ExecRequest) -> LifecycleResult<LineStream> {
        // No request timeout: the body streams for as long as the job runs.
        let resp = self.http.post(self.url("/exec")).json(&request).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(LifecycleError::Transport(format!(
                "exec `{}` failed: HTTP {status}",
                request.cmd
            )));
        }
        Ok(split_lines(resp.bytes_stream()))
    }
}

/// Re-chunk a byte stream into `\n`-terminated lines. A trailing partial line
/// is emitted when the stream ends; a transport error ends the stream.
pub(crate) fn split_lines<S, E>(stream: S) -> LineStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send,
{
    let stream = Box::pin(stream);
    futures::stream::unfold(
        (stream, Vec::<u8>::new(), false),
        |(mut stream, mut buf, mut done)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                        .trim_end_matches('\r')
                        .to_string();
                    return Some((Ok(line), (stream, buf, done)));
                }
                if done {
                    if buf.is_empty() {
                        return None;
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();
                    return Some((Ok(line), (stream, buf, done)));
                }
                match stream.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buf.clear();
                        done = true;
                        let err = LifecycleError::Transport(format!("log stream: {e}"));
                        return Some((Err(err), (stream, buf, done)));
                    }
                    None => done = true,
                }
            }
        },
    )
    .boxed()
}
