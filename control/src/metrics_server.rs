//! `/metrics` and `/healthz` listener

use crate::apis::metrics::gather_controller_metrics;
use crate::error::ControllerError;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Bind `bind_addr` and serve in the background
///
/// Binding happens before returning so a bad address fails startup.
pub async fn serve_metrics(
    bind_addr: &str,
) -> Result<(SocketAddr, JoinHandle<()>), ControllerError> {
    let listener = TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Metrics listener bound to {}", local_addr);

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("Accepted metrics connection from {}", peer_addr);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(|req: Request<Incoming>| async move {
                            Ok::<_, Infallible>(route(req.method(), req.uri().path()))
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Metrics connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept metrics connection: {}", e);
                }
            }
        }
    });

    Ok((local_addr, handle))
}

fn route(method: &Method, path: &str) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => match gather_controller_metrics() {
            Ok(text) => respond(StatusCode::OK, "text/plain; version=0.0.4", text),
            Err(e) => {
                error!("Failed to gather metrics: {}", e);
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e)
            }
        },
        (&Method::GET, "/healthz") => respond(StatusCode::OK, "text/plain", "ok".to_string()),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found".to_string()),
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}
