//! HTTP front of the proxy
//! Accepts connections, routes requests to the [`Frontend`] handlers and
//! turns their results into responses

use crate::error::ProxyError;
use crate::handler::{Frontend, ImageRequest, InterstitialPage, ProxiedPage, ProxyRequest, Rendered, Template};
use crate::render;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

type ResponseBody = BoxBody<Bytes, hyper::Error>;

const CONTENT_SECURITY_POLICY: HeaderName = HeaderName::from_static("content-security-policy");
const X_CONTENT_TYPE_OPTIONS: HeaderName = HeaderName::from_static("x-content-type-options");
const X_FRAME_OPTIONS: HeaderName = HeaderName::from_static("x-frame-options");

/// Images opened directly (an SVG in particular) get no script, no
/// subresources and a sandboxed origin
const IMAGE_POLICY: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: 8080,
        }
    }
}

/// Proxy server
pub struct ProxyServer {
    config: ServerConfig,
    frontend: Arc<Frontend>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, frontend: Arc<Frontend>) -> Self {
        Self { config, frontend }
    }

    /// Bind and serve until the listener fails
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.http_port);
        info!("Proxy server starting on {}", addr);
        self.run_http_server(addr).await
    }

    async fn run_http_server(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("HTTP server listening on {}", addr);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let frontend = self.frontend.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, remote_addr, frontend).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Serve one connection. A client that disconnects drops the in-flight
    /// handler future, which cancels its outbound fetch.
    async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, frontend: Arc<Frontend>) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let frontend = frontend.clone();
                    async move { Self::handle_request(req, remote_addr, frontend).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    async fn handle_request<B>(
        req: Request<B>,
        remote_addr: SocketAddr,
        frontend: Arc<Frontend>,
    ) -> Result<Response<ResponseBody>, Infallible> {
        Ok(Self::process_request(req, remote_addr, &frontend).await)
    }

    /// Route a request. The request body is never read.
    async fn process_request<B>(req: Request<B>, remote_addr: SocketAddr, frontend: &Frontend) -> Response<ResponseBody> {
        let (parts, _) = req.into_parts();
        let path = parts.uri.path();
        let query = parts.uri.query();

        debug!("{} {} from {}", parts.method, path, remote_addr);

        if parts.method != Method::GET && parts.method != Method::HEAD {
            let mut response = Self::error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        let json = Self::wants_json(&parts.headers);

        match path {
            "/health" => Self::text_response(StatusCode::OK, "OK"),
            "/out" => {
                let target = query.and_then(|q| Self::query_param(q, "u")).filter(|u| !u.is_empty());
                match target {
                    Some(target) => Self::interstitial_response(&frontend.interstitial(&target), json),
                    None => Self::handler_error(&ProxyError::MissingParameter("u")),
                }
            }
            "/proxy" => {
                let request = ProxyRequest::from_query(query.unwrap_or(""));
                match frontend.proxy(&request).await {
                    Ok(rendered) => Self::page_response(&rendered, json),
                    Err(e) => Self::handler_error(&e),
                }
            }
            _ if path.starts_with("/image/") => match ImageRequest::from_path(path, query) {
                Some(request) => match frontend.image(&request).await {
                    Ok(image) => {
                        let mut response = Self::bytes_response(StatusCode::OK, image.body);
                        let content_type = HeaderValue::from_str(&image.content_type)
                            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
                        let headers = response.headers_mut();
                        headers.insert(CONTENT_TYPE, content_type);
                        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
                        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(IMAGE_POLICY));
                        response
                    }
                    Err(e) => Self::handler_error(&e),
                },
                None => Self::error_response(StatusCode::BAD_REQUEST, "Malformed image path"),
            },
            _ => Self::error_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    /// First value of `name` in a query string
    fn query_param(query: &str, name: &str) -> Option<String> {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn wants_json(headers: &HeaderMap) -> bool {
        headers
            .get(ACCEPT)
            .and_then(|h| h.to_str().ok())
            .map(|accept| accept.contains("application/json"))
            .unwrap_or(false)
    }

    fn interstitial_response(rendered: &Rendered<InterstitialPage>, json: bool) -> Response<ResponseBody> {
        if json {
            return Self::json_response(rendered);
        }
        let mut response = Self::bytes_response(StatusCode::OK, Bytes::from(render::interstitial_html(rendered)));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        response
    }

    fn page_response(rendered: &Rendered<ProxiedPage>, json: bool) -> Response<ResponseBody> {
        let mut response = if json {
            Self::json_response(rendered)
        } else {
            let content_type = match rendered.template {
                Template::ProxyCss => "text/css; charset=utf-8",
                _ => "text/html; charset=utf-8",
            };
            let mut response = Self::bytes_response(StatusCode::OK, Bytes::from(rendered.data.content.clone()));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            response
        };

        let headers = response.headers_mut();
        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static("script-src 'none'"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        if rendered.template == Template::Proxy {
            headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        }
        response
    }

    fn json_response<T: Serialize>(rendered: &Rendered<T>) -> Response<ResponseBody> {
        match render::to_json(rendered) {
            Ok(body) => {
                let status = StatusCode::from_u16(rendered.status).unwrap_or(StatusCode::OK);
                let mut response = Self::bytes_response(status, Bytes::from(body));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                Self::error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    fn handler_error(err: &ProxyError) -> Response<ResponseBody> {
        let status = err.status();
        if err.is_client_error() {
            warn!("Request rejected ({}): {}", status.as_u16(), err);
        } else {
            error!("Request failed ({}): {}", status.as_u16(), err);
        }
        Self::error_response(status, &err.to_string())
    }

    fn text_response(status: StatusCode, body: &str) -> Response<ResponseBody> {
        let mut response = Self::bytes_response(status, Bytes::from(body.to_string()));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response
    }

    fn error_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
        Self::text_response(status, message)
    }

    fn bytes_response(status: StatusCode, body: Bytes) -> Response<ResponseBody> {
        let body = if body.is_empty() {
            Self::empty_body()
        } else {
            Self::full_body(body)
        };
        let mut response = Response::new(body);
        *response.status_mut() = status;
        response
    }

    fn full_body(bytes: Bytes) -> ResponseBody {
        Full::new(bytes).map_err(|never| match never {}).boxed()
    }

    fn empty_body() -> ResponseBody {
        Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
    }
}
