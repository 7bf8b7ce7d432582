use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// `Json` with the API's error body on rejection instead of axum's plain text.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| AppJson(value))
            .map_err(reject)
    }
}

fn reject(rejection: JsonRejection) -> Response {
    // keep axum's status: 415 for a missing content type, 422 for schema errors
    let status = rejection.status();
    let message = rejection.body_text();
    tracing::warn!("Rejected request body ({}): {}", status, message);

    (
        status,
        Json(json!({
            "message": message,
            "status": status.as_u16(),
        })),
    )
        .into_response()
}
