//! Recolor endpoint.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use roofpaint_models::media::OUTPUT_FILENAME;
use roofpaint_models::RecolorInput;
use tracing::{debug, field, info_span, Instrument, Span};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /recolor` with multipart fields `image` (file) and `color` (text).
///
/// If the client disconnects, axum drops this future and with it the
/// in-flight provider call.
pub async fn recolor(
    State(state): State<AppState>,
    request_id: Option<Extension<String>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let request_id = request_id.map(|Extension(id)| id).unwrap_or_default();
    let span = info_span!("recolor", request_id = %request_id, filename = field::Empty);

    async move {
        let multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
        let input = read_form(multipart).await?;

        if let Some(filename) = &input.filename {
            Span::current().record("filename", filename.as_str());
        }

        let image = state.pipeline.recolor(input).await?;

        let headers = [
            (CONTENT_TYPE, image.content_type),
            (
                CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", OUTPUT_FILENAME),
            ),
        ];
        Ok::<_, ApiError>((headers, image.bytes).into_response())
    }
    .instrument(span)
    .await
}

/// Collect the form fields. Unknown fields are skipped; later duplicates win.
async fn read_form(mut multipart: Multipart) -> ApiResult<RecolorInput> {
    let mut input = RecolorInput::default();

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().map(str::to_string);

        match name.as_deref() {
            Some("image") => {
                input.filename = field.file_name().map(str::to_string);
                input.image = Some(field.bytes().await.map_err(form_error)?);
            }
            Some("color") => {
                input.colour = Some(field.text().await.map_err(form_error)?);
            }
            other => {
                debug!(field = ?other, "Ignoring unknown form field");
            }
        }
    }

    Ok(input)
}

fn form_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::bad_request(format!("Malformed multipart body: {}", err.body_text()))
    }
}
