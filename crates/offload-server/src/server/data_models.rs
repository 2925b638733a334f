use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ComputeResponse {
    pub sum: u128,
    pub message: String,
}

impl ComputeResponse {
    pub fn completed(sum: u128) -> Self {
        Self {
            sum,
            message: "completed".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PidResponse {
    pub processid: u32,
}
