use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::TryStreamExt;

use crate::ai::{AiClient, ConsultationAnalysis};
use crate::auth::CurrentUser;
use crate::error::ApiError;

pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

// Handler to transcribe an uploaded audio file (multipart field "file")
pub async fn transcribe(
    ai: web::Data<AiClient>,
    _current: CurrentUser,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let bad_body = |e: actix_multipart::MultipartError| {
        ApiError::BadRequest(format!("Invalid multipart body: {e}"))
    };

    let mut audio: Option<Vec<u8>> = None;
    while let Some(mut field) = payload.try_next().await.map_err(bad_body)? {
        let is_file = field.name() == Some("file");
        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_body)? {
            if is_file {
                if bytes.len() + chunk.len() > MAX_AUDIO_BYTES {
                    return Err(ApiError::BadRequest("Audio file is too large".into()));
                }
                bytes.extend_from_slice(&chunk);
            }
        }
        if is_file {
            audio = Some(bytes);
        }
    }

    let audio = audio
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::BadRequest("An audio file is required in field \"file\"".into()))?;

    let result = ai.transcribe(audio).await?;
    Ok(HttpResponse::Ok().json(result))
}

// Handler to turn a consultation transcript into a SOAP note
pub async fn analyze_consultation(
    ai: web::Data<AiClient>,
    _current: CurrentUser,
    request: web::Json<ConsultationAnalysis>,
) -> Result<HttpResponse, ApiError> {
    let request = request.into_inner();
    if request.transcript.trim().is_empty() {
        return Err(ApiError::BadRequest("transcript must not be empty".into()));
    }
    let soap = ai.analyze(&request).await?;
    Ok(HttpResponse::Ok().json(soap))
}
