//! Request-boundary instrumentation.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::AppState;

/// Endpoint label for requests that matched no route.
pub const UNMATCHED: &str = "unmatched";

/// Wraps every request in an in-flight guard: `active_requests` is raised for
/// the duration, and the request count and latency are recorded under the
/// matched route template. A request dropped mid-flight is still released by
/// the guard.
pub async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED.to_owned());
    let method = req.method().as_str().to_owned();

    let guard = state.commands.metrics().begin_request(&endpoint, &method);
    let response = next.run(req).await;
    guard.finish(response.status().as_u16());
    response
}
