//! Metrics endpoint
//!
//! Serves `GET /metrics` in the Prometheus text format.

use crate::apis::metrics::gather_exporter_metrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Bind the metrics listener
pub async fn bind_metrics(addr: &str) -> Result<TcpListener, std::io::Error> {
    TcpListener::bind(addr).await
}

/// Accept connections until cancelled
pub async fn serve_metrics(listener: TcpListener, token: CancellationToken) {
    let local_addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    info!(addr = %local_addr, "Metrics endpoint listening");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted metrics connection from {}", peer_addr);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                                Ok::<_, Infallible>(handle_request(req.method(), req.uri().path()))
                            });
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Accept error on {}: {}", local_addr, e),
                }
            }
        }
    }

    info!(addr = %local_addr, "Metrics endpoint stopped");
}

fn handle_request(method: &Method, path: &str) -> Response<Full<Bytes>> {
    if path != "/metrics" || method != Method::GET {
        return text_response(StatusCode::NOT_FOUND, "not found\n".to_string());
    }

    match gather_exporter_metrics() {
        Ok(body) => text_response(StatusCode::OK, body),
        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
