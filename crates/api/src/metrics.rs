use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use lazy_static::lazy_static;

lazy_static! {
    // recorded by the error monitor
    pub static ref API_ERRORS: IntCounterVec =
        register_int_counter_vec!("api_errors_total", "Number of error responses by error code", &["code"]).unwrap();
}

/// Text exposition of the default registry.
pub fn render() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
