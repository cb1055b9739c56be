use crate::model::{Entry, ItemsQuery, PageResult};
use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

pub trait CatalogApi: Send + Sync + 'static {
    fn list(&self, query: &ItemsQuery) -> Result<PageResult>;
    fn get(&self, id: u64) -> Result<Entry>;
}

pub struct HttpCatalogApi {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpCatalogApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T> {
        let body = response
            .into_string()
            .context("failed to read response body")?;
        serde_json::from_str(&body).context("failed to decode response")
    }
}

impl CatalogApi for HttpCatalogApi {
    fn list(&self, query: &ItemsQuery) -> Result<PageResult> {
        let url = format!("{}/items", self.base_url);
        let mut request = self.agent.get(&url);
        for (key, value) in query.to_params() {
            request = request.query(key, &value);
        }
        match request.call() {
            Ok(response) => Self::read_json(response),
            Err(ureq::Error::Status(code, _)) => Err(anyhow!("Failed to fetch items ({code})")),
            Err(err) => Err(err).context("Failed to fetch items"),
        }
    }

    fn get(&self, id: u64) -> Result<Entry> {
        let url = format!("{}/items/{id}", self.base_url);
        match self.agent.get(&url).call() {
            Ok(response) => Self::read_json(response),
            Err(ureq::Error::Status(404, _)) => Err(anyhow!("Item {id} not found")),
            Err(ureq::Error::Status(code, _)) => Err(anyhow!("Failed to fetch item ({code})")),
            Err(err) => Err(err).context("Failed to fetch item"),
        }
    }
}

/// Cooperative cancellation: a ticket is live while no newer ticket has been
/// issued from the same generation counter.
#[derive(Debug, Clone)]
pub struct CancelToken {
    request_id: u64,
    latest: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn new(request_id: u64, latest: Arc<AtomicU64>) -> Self {
        Self { request_id, latest }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.request_id
    }
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub token: CancelToken,
    pub query: ItemsQuery,
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub request_id: u64,
    pub outcome: std::result::Result<PageResult, String>,
}

#[derive(Debug, Clone)]
pub struct DetailRequest {
    pub token: CancelToken,
    pub id: u64,
}

#[derive(Debug, Clone)]
pub struct DetailResponse {
    pub request_id: u64,
    pub outcome: std::result::Result<Entry, String>,
}

/// Runs `handle` on a background thread. Requests queued while the worker is
/// busy collapse to the newest one; `None` from `handle` sends nothing.
fn spawn_worker<Req, Res, F>(handle: F) -> (Sender<Req>, Receiver<Res>)
where
    Req: Send + 'static,
    Res: Send + 'static,
    F: Fn(Req) -> Option<Res> + Send + 'static,
{
    let (tx_req, rx_req) = mpsc::channel::<Req>();
    let (tx_res, rx_res) = mpsc::channel::<Res>();

    thread::spawn(move || {
        while let Ok(mut req) = rx_req.recv() {
            while let Ok(newer) = rx_req.try_recv() {
                req = newer;
            }
            let Some(res) = handle(req) else {
                continue;
            };
            if tx_res.send(res).is_err() {
                break;
            }
        }
    });

    (tx_req, rx_res)
}

pub fn spawn_page_worker(api: Arc<dyn CatalogApi>) -> (Sender<PageRequest>, Receiver<PageResponse>) {
    spawn_worker(move |req: PageRequest| {
        if req.token.is_cancelled() {
            debug!(request_id = req.token.request_id(), "skipping superseded page fetch");
            return None;
        }
        let outcome = api.list(&req.query).map_err(|err| format!("{err:#}"));
        if req.token.is_cancelled() {
            debug!(request_id = req.token.request_id(), "dropping superseded page result");
            return None;
        }
        Some(PageResponse {
            request_id: req.token.request_id(),
            outcome,
        })
    })
}

pub fn spawn_detail_worker(
    api: Arc<dyn CatalogApi>,
) -> (Sender<DetailRequest>, Receiver<DetailResponse>) {
    spawn_worker(move |req: DetailRequest| {
        if req.token.is_cancelled() {
            return None;
        }
        let outcome = api.get(req.id).map_err(|err| format!("{err:#}"));
        if req.token.is_cancelled() {
            return None;
        }
        Some(DetailResponse {
            request_id: req.token.request_id(),
            outcome,
        })
    })
}
