//! Request extractors

use axum::extract::{FromRequest, Request};
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;

use crate::gateway::dto::{ApiError, ApiFailure};

/// JSON body that rejects with the API error shape instead of axum's plain text
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let (status, Json(mut body)) = ApiError::bad_request("Invalid request body");
                body.details = rejection.body_text();
                Err((status, Json(body)))
            }
        }
    }
}
