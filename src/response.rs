use axum::{response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

/// JSON envelope for every successful response. `message` plays the role of
/// a one-shot flash message.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_only_envelope() {
        let value = serde_json::to_value(ApiResponse::message("Done")).unwrap();
        assert_eq!(value["success"], true);
        assert!(value["data"].is_null());
        assert_eq!(value["message"], "Done");
    }

    #[test]
    fn data_with_message_envelope() {
        let value = serde_json::to_value(ApiResponse::with_message(7, "Seven")).unwrap();
        assert_eq!(value["data"], 7);
        assert_eq!(value["message"], "Seven");
    }
}
