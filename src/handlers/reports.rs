use actix_web::http::header;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use uuid::Uuid;

use crate::DbPool;
use crate::access;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::report::{self, ReportAssets, ReportData, ReportQuery, ReportWindow};
use crate::store;

// Handler to render a PDF summary of a patient's notes and vitals
pub async fn generate_report(
    pool: web::Data<DbPool>,
    assets: web::Data<ReportAssets>,
    current: CurrentUser,
    patient_id: web::Path<Uuid>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = patient_id.into_inner();
    let user_id = current.id();
    let query = query.into_inner();
    let period = query.period;
    let now = Utc::now().naive_utc();

    let data = store::run(&pool, move |conn| {
        let (patient, _) = access::authorize(conn, patient_id, user_id)?;
        let window = ReportWindow::resolve(&query, now)?;
        let notes = store::notes_for_patient(conn, patient_id, Some(&window))?;
        let vitals = store::vitals_for_patient(conn, patient_id, Some(&window))?;
        Ok(ReportData {
            patient,
            notes,
            vitals,
            window,
            generated_at: now,
        })
    })
    .await?;

    let filename = report::report_filename(&data.patient, period);
    let pdf = web::block(move || report::render_pdf(&data, assets.devanagari_font())).await??;

    tracing::info!(%patient_id, period = period.as_str(), bytes = pdf.len(), "report generated");
    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={filename}"),
        ))
        .body(pdf))
}
