//! Multipart extraction into the decoder's field list.
//!
//! Any rejection from the body (missing boundary, truncated part) becomes
//! `AppError::MalformedBody`, which answers with an empty 400.

use axum::extract::{FromRequest, Multipart, Request};
use webwrap_core::{FieldPart, PostedFields};

use crate::error::AppError;

pub struct PostedForm(pub PostedFields);

impl<S> FromRequest<S> for PostedForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| AppError::MalformedBody(rejection.body_text()))?;

        let mut fields = PostedFields::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| AppError::MalformedBody(err.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|err| AppError::MalformedBody(err.body_text()))?;
            fields.push(FieldPart {
                name,
                filename,
                content_type,
                data: data.to_vec(),
            });
        }
        tracing::debug!(parts = fields.len(), "multipart body read");
        Ok(PostedForm(fields))
    }
}
