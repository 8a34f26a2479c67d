//! CSV report endpoints

use axum::{
    extract::State,
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
};

use crate::error::AppResult;

fn csv_response(filename: &str, body: String) -> impl IntoResponse {
    (
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
}

/// Overdue loans of last month as CSV
#[utoipa::path(
    get,
    path = "/reports/overdue/last-month.csv",
    tag = "reports",
    responses(
        (status = 200, description = "CSV download", content_type = "text/csv")
    )
)]
pub async fn overdue_last_month(
    State(state): State<crate::AppState>,
) -> AppResult<impl IntoResponse> {
    let csv = state.services.reports.overdue_last_month_csv().await?;
    Ok(csv_response("overdue-loans-last-month.csv", csv))
}

/// All borrows of last month as CSV
#[utoipa::path(
    get,
    path = "/reports/borrows/last-month.csv",
    tag = "reports",
    responses(
        (status = 200, description = "CSV download", content_type = "text/csv")
    )
)]
pub async fn borrows_last_month(
    State(state): State<crate::AppState>,
) -> AppResult<impl IntoResponse> {
    let csv = state.services.reports.borrows_last_month_csv().await?;
    Ok(csv_response("loans-last-month.csv", csv))
}
