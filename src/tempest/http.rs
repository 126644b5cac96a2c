// Tempest - Weather metrics exporter for Prometheus
//
// Copyright 2023 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::metrics::SnapshotHandle;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::Arc;

const TEXT_FORMAT: &str = "text/plain";

const HTML_FORMAT: &str = "text/html; charset=utf-8";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Tempest</title></head>
<body>
<h1>Tempest</h1>
<p>Weather metrics exporter for Prometheus.</p>
<p><a href="__ROUTE__">Metrics</a></p>
</body>
</html>
"#;

/// Global state shared between all HTTP requests via Arc.
pub struct RequestContext {
    snapshot: Arc<SnapshotHandle>,
    metrics_path: String,
    index_page: String,
}

impl RequestContext {
    pub fn new(snapshot: Arc<SnapshotHandle>, metrics_path: String) -> Self {
        let index_page = INDEX_HTML.replace("__ROUTE__", &metrics_path);
        RequestContext {
            snapshot,
            metrics_path,
            index_page,
        }
    }
}

/// Route requests to the landing page or the metrics snapshot.
///
/// The snapshot is served verbatim with a 200, even while it is still the
/// empty pre-first-refresh document: upstream provider health never shows
/// up as an HTTP error here.
pub async fn http_route(req: Request<Body>, context: Arc<RequestContext>) -> Result<Response<Body>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let res = match (&method, path.as_ref()) {
        (&Method::GET, "/") => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, HTML_FORMAT)
            .body(Body::from(context.index_page.clone()))
            .unwrap(),

        (&Method::GET, p) if p == context.metrics_path => {
            let document = context.snapshot.current();
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, TEXT_FORMAT)
                .body(Body::from(document.as_str().to_owned()))
                .unwrap()
        }

        (_, "/") => http_status_no_body(StatusCode::METHOD_NOT_ALLOWED),
        (_, p) if p == context.metrics_path => http_status_no_body(StatusCode::METHOD_NOT_ALLOWED),

        _ => http_status_no_body(StatusCode::NOT_FOUND),
    };

    Ok(res)
}

fn http_status_no_body(code: StatusCode) -> Response<Body> {
    Response::builder().status(code).body(Body::empty()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::{http_route, RequestContext};
    use crate::metrics::SnapshotHandle;
    use hyper::header::CONTENT_TYPE;
    use hyper::{Body, Method, Request, Response, StatusCode};
    use std::sync::Arc;

    fn context(snapshot: Arc<SnapshotHandle>) -> Arc<RequestContext> {
        Arc::new(RequestContext::new(snapshot, "/metrics".to_owned()))
    }

    fn request(method: Method, path: &str) -> Request<Body> {
        Request::builder().method(method).uri(path).body(Body::empty()).unwrap()
    }

    async fn body_text(res: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_before_first_refresh() {
        let context = context(Arc::new(SnapshotHandle::new()));

        let res = http_route(request(Method::GET, "/metrics"), context).await.unwrap();

        // The empty document is the defined initial state, not an error
        assert_eq!(StatusCode::OK, res.status());
        assert_eq!("text/plain", res.headers()[CONTENT_TYPE]);
        assert_eq!("", body_text(res).await);
    }

    #[tokio::test]
    async fn test_metrics_serves_published_snapshot() {
        let snapshot = Arc::new(SnapshotHandle::new());
        snapshot.publish("weather_n_calls 5\n".to_owned());
        let context = context(snapshot);

        let res = http_route(request(Method::GET, "/metrics"), context).await.unwrap();

        assert_eq!(StatusCode::OK, res.status());
        assert_eq!("weather_n_calls 5\n", body_text(res).await);
    }

    #[tokio::test]
    async fn test_metrics_configurable_path() {
        let context = Arc::new(RequestContext::new(Arc::new(SnapshotHandle::new()), "/weather".to_owned()));

        let res = http_route(request(Method::GET, "/weather"), context.clone()).await.unwrap();
        assert_eq!(StatusCode::OK, res.status());

        let res = http_route(request(Method::GET, "/metrics"), context).await.unwrap();
        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }

    #[tokio::test]
    async fn test_index_page() {
        let context = context(Arc::new(SnapshotHandle::new()));

        let res = http_route(request(Method::GET, "/"), context).await.unwrap();

        assert_eq!(StatusCode::OK, res.status());
        let body = body_text(res).await;
        assert!(body.contains("<html>"));
        assert!(body.contains("href=\"/metrics\""));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let context = context(Arc::new(SnapshotHandle::new()));

        let res = http_route(request(Method::POST, "/metrics"), context).await.unwrap();

        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, res.status());
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = context(Arc::new(SnapshotHandle::new()));

        let res = http_route(request(Method::GET, "/other"), context).await.unwrap();

        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }
}
