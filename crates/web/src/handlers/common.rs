/// Liveness check.
pub async fn get_index() -> &'static str { "GitHub Secret Scanner" }
