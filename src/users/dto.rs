use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub sugar: f64,
}

#[derive(Debug, Serialize)]
pub struct ScanQuotaResponse {
    pub scan_quota: i64,
}
