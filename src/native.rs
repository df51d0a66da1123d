use lazy_static::lazy_static;
use napi_derive::napi;

use crate::config::PreviewConfig;
use crate::service::PreviewService;

lazy_static! {
    static ref SERVICE: PreviewService = PreviewService::new(PreviewConfig::default());
}

/// JSON in, JSON out. Never throws; failures come back as `{ success: false }`.
#[napi]
pub fn generate_preview_native(request_json: String) -> String {
    SERVICE.generate_json(&request_json)
}

#[napi]
pub fn analyze_component_native(code: String) -> napi::Result<serde_json::Value> {
    serde_json::to_value(SERVICE.analyze(&code)).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[napi]
pub fn generate_preview_with_config_native(
    request_json: String,
    config_json: String,
) -> napi::Result<String> {
    let config =
        PreviewConfig::from_json(&config_json).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(PreviewService::new(config).generate_json(&request_json))
}
