//! The outbound HTTP endpoints. Every route validates its fields, builds one
//! `OutboundRequest`, and hands it to the dispatcher.

use std::{path::Path, sync::Arc};

use {
    axum::{
        Json,
        extract::{Multipart, State},
        http::StatusCode,
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::{error, info},
    walink_common::types::{DeliveryReceipt, MediaDescriptor, UploadParts},
    walink_media::mime::mime_for_path,
    walink_whatsapp::OutboundRequest,
};

use crate::{
    api_error::ApiError,
    extract::{JsonOrForm, lenient_string, require},
    state::GatewayState,
};

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendMessageBody {
    #[serde(deserialize_with = "lenient_string")]
    pub number: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendUrlBody {
    #[serde(deserialize_with = "lenient_string")]
    pub number: Option<String>,
    pub caption: Option<String>,
    /// Remote URL of the media.
    pub file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendFilesBody {
    #[serde(deserialize_with = "lenient_string")]
    pub number: Option<String>,
    pub caption: Option<String>,
}

fn sent(receipt: DeliveryReceipt) -> Json<Value> {
    Json(json!({ "status": true, "response": receipt }))
}

async fn dispatch(state: &GatewayState, request: OutboundRequest) -> ApiResult {
    let receipt = state.dispatcher.dispatch(request).await?;
    Ok(sent(receipt))
}

/// `POST /send-Message` `{number, message}`
pub async fn send_message(
    State(state): State<Arc<GatewayState>>,
    JsonOrForm(body): JsonOrForm<SendMessageBody>,
) -> ApiResult {
    let mut missing = Vec::new();
    let number = require(&mut missing, "number", body.number);
    let message = require(&mut missing, "message", body.message);
    if !missing.is_empty() {
        return Err(ApiError::invalid_fields(&missing));
    }

    dispatch(&state, OutboundRequest::text(number, message)).await
}

/// `POST /send-browse`, multipart with `file`, `number` and `caption`.
pub async fn send_browse(
    State(state): State<Arc<GatewayState>>,
    mut multipart: Multipart,
) -> ApiResult {
    let mut number = None;
    let mut caption = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Malformed(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                // Browsers send a nameless, empty part when no file was picked.
                let picked = field.file_name().is_some_and(|n| !n.is_empty());
                let filename = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or("file")
                    .to_string();
                let mime_type = match field.content_type() {
                    Some(declared) => declared.to_string(),
                    None => mime_for_path(Path::new(&filename)).to_string(),
                };
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Malformed(e.body_text()))?;
                if picked || !bytes.is_empty() {
                    upload = Some(UploadParts {
                        bytes,
                        mime_type,
                        filename,
                    });
                }
            },
            Some("number") => {
                number = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::Malformed(e.body_text()))?,
                );
            },
            Some("caption") => {
                caption = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::Malformed(e.body_text()))?,
                );
            },
            _ => {},
        }
    }

    let mut missing = Vec::new();
    let number = require(&mut missing, "number", number);
    if upload.is_none() {
        missing.push("file");
    }
    if !missing.is_empty() {
        return Err(ApiError::invalid_fields(&missing));
    }

    let media = MediaDescriptor::from_parts(None, upload, None)
        .map_err(|e| ApiError::invalid_field("file", e.to_string()))?;
    dispatch(
        &state,
        OutboundRequest::media(number, media).with_caption(caption),
    )
    .await
}

/// `POST /send-url` `{number, caption, file}` where `file` is a URL.
pub async fn send_url(
    State(state): State<Arc<GatewayState>>,
    JsonOrForm(body): JsonOrForm<SendUrlBody>,
) -> ApiResult {
    let mut missing = Vec::new();
    let number = require(&mut missing, "number", body.number);
    let url = require(&mut missing, "file", body.file);
    if !missing.is_empty() {
        return Err(ApiError::invalid_fields(&missing));
    }

    let media = MediaDescriptor::from_parts(None, None, Some(url))
        .map_err(|_| ApiError::invalid_fields(&["file"]))?;
    dispatch(
        &state,
        OutboundRequest::media(number, media).with_caption(body.caption),
    )
    .await
}

/// `POST /send-files` `{number, caption}`: sends the configured default file.
pub async fn send_files(
    State(state): State<Arc<GatewayState>>,
    JsonOrForm(body): JsonOrForm<SendFilesBody>,
) -> ApiResult {
    let mut missing = Vec::new();
    let number = require(&mut missing, "number", body.number);
    if !missing.is_empty() {
        return Err(ApiError::invalid_fields(&missing));
    }

    let media = MediaDescriptor::local(&state.options.default_file);
    dispatch(
        &state,
        OutboundRequest::media(number, media).with_caption(body.caption),
    )
    .await
}

/// `POST /delete`: drop the stored session. Always 200.
pub async fn delete_session(State(state): State<Arc<GatewayState>>) -> StatusCode {
    match state.store.clear().await {
        Ok(()) => info!("stored session cleared"),
        Err(e) => error!(error = %e, "failed to clear stored session"),
    }
    StatusCode::OK
}
