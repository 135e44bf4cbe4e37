//! Content upload.

use crate::coordinator::User;
use crate::error::{ApiError, ApiResult};
use crate::ingest::{self, IngestError};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Extension, Multipart, State};
use serde::Serialize;
use shuttle_storage::StagingArea;
use tracing::{info, instrument};

const DATA_FIELD: &str = "data";
const COLLECTION_FIELD: &str = "collection";

/// Upload response.
#[derive(Debug, Serialize)]
pub struct AddContentResponse {
    pub cid: String,
}

/// POST /content/add - Chunk an uploaded file, register it with the
/// coordinator and pin it.
///
/// The staging area is removed in the background whatever the outcome.
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn add_content(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Multipart,
) -> ApiResult<Json<AddContentResponse>> {
    if user.storage_disabled {
        return Err(ApiError::ContentAddingDisabled);
    }

    let staging = state.shuttle.staging().alloc_new().await?;
    let result = add_staged(&state, &user, &staging, multipart).await;
    state.shuttle.schedule_cleanup(staging.id);
    result.map(Json)
}

async fn add_staged(
    state: &AppState,
    user: &User,
    staging: &StagingArea,
    mut multipart: Multipart,
) -> ApiResult<AddContentResponse> {
    let params = state.shuttle.ingester().config().import_params();
    let mut upload = None;
    let mut collection = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some(DATA_FIELD) => {
                if upload.is_some() {
                    return Err(ApiError::BadRequest(
                        "only one data field is allowed".to_string(),
                    ));
                }
                let name = field.file_name().unwrap_or_default().to_string();
                let outcome = ingest::import(params, staging.store.as_ref(), field)
                    .await
                    .map_err(|e| match e {
                        IngestError::Read(msg) => {
                            ApiError::BadRequest(format!("failed to read upload: {msg}"))
                        }
                        other => other.into(),
                    })?;
                upload = Some((name, outcome));
            }
            Some(COLLECTION_FIELD) => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid collection: {e}")))?;
                collection = Some(value);
            }
            _ => {}
        }
    }

    let (name, outcome) =
        upload.ok_or_else(|| ApiError::BadRequest("missing data field".to_string()))?;

    let content = state
        .coordinator
        .create_content(user, &outcome.root, &name, collection.as_deref())
        .await?;
    state
        .shuttle
        .pin_upload(content, user.id, outcome.root, staging.store.as_ref())
        .await?;

    info!(
        content,
        root = %outcome.root,
        bytes = outcome.bytes,
        blocks = outcome.blocks,
        "content added"
    );
    Ok(AddContentResponse {
        cid: outcome.root.to_string(),
    })
}
