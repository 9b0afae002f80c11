//! Mock Docker registry server.

use crate::config::RegistryConfig;
use crate::error::{Result, API_VERSION, API_VERSION_HEADER};
use crate::handlers;
use crate::storage::{FlatFileStore, RegistryStore};
use axum::{
    extract::Request,
    handler::Handler,
    http::{HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

const SERVER_NAME: &str = concat!("mock-docker-registry/", env!("CARGO_PKG_VERSION"));
const REQUEST_ID_HEADER: &str = "request-id";

pub type SharedStore = Arc<dyn RegistryStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: SharedStore,
}

type Mount = Box<dyn FnOnce(MethodFilter) -> MethodRouter<AppState> + Send>;

/// One row of the route table. The route is mounted for `method` only.
pub struct Endpoint {
    pub name: &'static str,
    pub method: Method,
    pub path: &'static str,
    mount: Mount,
}

impl Endpoint {
    fn new<H, T>(name: &'static str, method: Method, path: &'static str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        Self {
            name,
            method,
            path,
            mount: Box::new(move |filter| on(filter, handler)),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Every route the server answers.
///
/// `/v2/` is matched exactly; `/v2` without the slash is a different path.
pub fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new("V2", Method::GET, "/v2/", handlers::api_version),
        Endpoint::new(
            "V2GetManifest",
            Method::GET,
            "/v2/{repo}/manifests/{reference}",
            handlers::get_manifest,
        ),
        Endpoint::new(
            "V2GetBlob",
            Method::GET,
            "/v2/{repo}/blobs/{digest}",
            handlers::get_blob,
        ),
        Endpoint::new("Ping", Method::GET, "/ping", handlers::ping),
    ]
}

/// Every response under `/v2/` carries the API version header, including the
/// router's own 404 and 405 responses.
async fn v2_version_header(request: Request, next: Next) -> Response {
    let is_v2 = request.uri().path().starts_with("/v2/");
    let mut response = next.run(request).await;
    if is_v2 {
        response
            .headers_mut()
            .entry(API_VERSION_HEADER)
            .or_insert(HeaderValue::from_static(API_VERSION));
    }
    response
}

/// Builds the application router over `store`.
pub fn router(store: SharedStore) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let app = endpoints()
        .into_iter()
        .fold(Router::new(), |app, endpoint| {
            match MethodFilter::try_from(endpoint.method.clone()) {
                Ok(filter) => {
                    info!(
                        "Mounting {} {} {}",
                        endpoint.name, endpoint.method, endpoint.path
                    );
                    app.route(endpoint.path, (endpoint.mount)(filter))
                }
                Err(err) => {
                    error!("Skipping {} {}: {}", endpoint.name, endpoint.path, err);
                    app
                }
            }
        });

    app.layer(
        tower::ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(PropagateRequestIdLayer::new(request_id))
            .layer(middleware::from_fn(v2_version_header))
            .layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static("server"),
                HeaderValue::from_static(SERVER_NAME),
            )),
    )
    .with_state(AppState { store })
}

/// The main registry server.
///
/// Serves the seeded contents of a data directory over the read-only subset
/// of the Docker Registry V2 API.
pub struct RegistryServer {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl RegistryServer {
    /// Creates and starts a new registry server with the given configuration.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mock_docker_registry::{RegistryConfig, RegistryServer};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = RegistryConfig::new("/srv/registry-data");
    /// let server = RegistryServer::new(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: RegistryConfig) -> Result<Self> {
        let store = Arc::new(FlatFileStore::new(config.data_dir.clone()));
        Self::with_store(config, store).await
    }

    /// Starts a server over any [`RegistryStore`].
    pub async fn with_store(config: RegistryConfig, store: SharedStore) -> Result<Self> {
        let app = router(store);

        let listener = TcpListener::bind(config.bind_addr()).await?;
        let addr = listener.local_addr()?;

        info!("Registry listening on {}", addr);

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!("Registry server stopped: {}", err);
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the socket address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the full URL of the registry server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Returns the port number the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Runs until the server task ends.
    pub async fn wait(self) {
        if let Err(err) = self.handle.await {
            error!("Registry server task failed: {}", err);
        }
    }
}
