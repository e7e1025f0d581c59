//! ROI提取客户端
//!
//! 将RT-STRUCT实例标识符发送到提取服务，返回ROI记录列表。

use async_trait::async_trait;
use rtedit_core::{InstanceId, Result, RoiRecord, RtEditError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::endpoints::{ensure_success, Service, ServiceEndpoints};

/// ROI提取接口
#[async_trait]
pub trait RoiExtractor: Send + Sync {
    async fn extract_rois(&self, rtstruct: &InstanceId) -> Result<Vec<RoiRecord>>;
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    rtstruct_uid: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    rois: Option<Vec<RoiRecord>>,
}

/// 基于HTTP的ROI提取客户端
#[derive(Debug, Clone)]
pub struct HttpRoiExtractor {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl HttpRoiExtractor {
    pub fn new(client: reqwest::Client, endpoints: ServiceEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl RoiExtractor for HttpRoiExtractor {
    async fn extract_rois(&self, rtstruct: &InstanceId) -> Result<Vec<RoiRecord>> {
        let url = self
            .endpoints
            .url(Service::Extraction, "/api/rt/extract-rois")?;
        debug!("POST {} for RT-STRUCT {}", url, rtstruct);

        let response = self
            .client
            .post(&url)
            .json(&ExtractRequest {
                rtstruct_uid: rtstruct.as_str(),
            })
            .send()
            .await?;
        let body = ensure_success(Service::Extraction, response)?.bytes().await?;

        let parsed: ExtractResponse = serde_json::from_slice(&body)
            .map_err(|e| RtEditError::Decode(format!("extract-rois: {}", e)))?;
        let rois = parsed
            .rois
            .ok_or_else(|| RtEditError::Decode("extract-rois: missing `rois`".to_string()))?;

        info!("Extracted {} ROIs from RT-STRUCT {}", rois.len(), rtstruct);
        Ok(rois)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn extractor_for(base: String) -> HttpRoiExtractor {
        HttpRoiExtractor::new(
            reqwest::Client::new(),
            ServiceEndpoints {
                extraction_url: Some(base),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_extract_rois_sends_rtstruct_uid() {
        let router = Router::new().route(
            "/api/rt/extract-rois",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["rtstruct_uid"], "rt-inst-1");
                Json(json!({
                    "rois": [
                        { "name": "GTV", "volume": 42.5 },
                        { "name": "Spinal Cord" }
                    ]
                }))
            }),
        );
        let extractor = extractor_for(spawn(router).await);

        let rois = extractor
            .extract_rois(&InstanceId::from("rt-inst-1"))
            .await
            .unwrap();
        assert_eq!(rois.len(), 2);
        assert_eq!(rois[0].volume, Some(42.5));
        assert_eq!(rois[1].name, "Spinal Cord");
        assert_eq!(rois[1].volume, None);
    }

    #[tokio::test]
    async fn test_missing_rois_field_is_decode_error() {
        let router = Router::new().route(
            "/api/rt/extract-rois",
            post(|| async { Json(json!({ "error": "rtstruct_uid required" })) }),
        );
        let extractor = extractor_for(spawn(router).await);

        let err = extractor
            .extract_rois(&InstanceId::from("rt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RtEditError::Decode(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let router = Router::new().route("/api/rt/extract-rois", post(|| async { "not json" }));
        let extractor = extractor_for(spawn(router).await);

        let err = extractor
            .extract_rois(&InstanceId::from("rt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RtEditError::Decode(_)));
    }
}
