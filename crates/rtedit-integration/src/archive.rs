//! 影像归档客户端
//!
//! 对归档网关HTTP接口的薄封装：检查列表、检查/系列详情、文件上传、
//! 原始DICOM对象读取。

use async_trait::async_trait;
use bytes::Bytes;
use rtedit_core::{ImageRef, InstanceId, Result, RtEditError, Series, SeriesId, Study, StudyId};
use serde::Deserialize;
use tracing::{debug, info};

use crate::endpoints::{ensure_success, Service, ServiceEndpoints};

/// 待上传的DICOM文件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// 上传回执
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub file_name: String,
    pub instance_id: Option<InstanceId>,
}

/// 归档客户端接口
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// 列出检查标识符（按归档索引顺序）
    async fn list_studies(&self) -> Result<Vec<StudyId>>;

    /// 获取检查详情
    async fn fetch_study(&self, id: &StudyId) -> Result<Study>;

    /// 获取系列详情
    async fn fetch_series(&self, id: &SeriesId) -> Result<Series>;

    /// 上传单个DICOM文件
    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt>;

    /// 读取切片对应的原始DICOM对象
    async fn fetch_image(&self, image: &ImageRef) -> Result<Bytes>;

    /// 下载生成的DICOM-SEG
    async fn fetch_segmentation(&self, instance: &InstanceId) -> Result<Bytes>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MainTags {
    study_date: Option<String>,
    modality: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PatientTags {
    patient_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StudyResource {
    #[serde(default)]
    main_dicom_tags: MainTags,
    #[serde(default)]
    patient_main_dicom_tags: PatientTags,
    #[serde(default)]
    series: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SeriesResource {
    #[serde(default)]
    main_dicom_tags: MainTags,
    #[serde(default)]
    instances: Vec<String>,
    #[serde(default)]
    parent_study: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    orthanc_response: Option<serde_json::Value>,
}

/// 基于HTTP的归档客户端
#[derive(Debug, Clone)]
pub struct HttpArchiveClient {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl HttpArchiveClient {
    pub fn new(client: reqwest::Client, endpoints: ServiceEndpoints) -> Self {
        Self { client, endpoints }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.endpoints.url(Service::Archive, path)?;
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        ensure_success(Service::Archive, response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get(path).await?.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| RtEditError::Decode(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl ArchiveClient for HttpArchiveClient {
    async fn list_studies(&self) -> Result<Vec<StudyId>> {
        let ids: Vec<String> = self.get_json("/api/studies").await?;
        Ok(ids.into_iter().map(StudyId).collect())
    }

    async fn fetch_study(&self, id: &StudyId) -> Result<Study> {
        let resource: StudyResource = self.get_json(&format!("/api/studies/{}", id)).await?;
        Ok(Study {
            id: id.clone(),
            patient_name: resource
                .patient_main_dicom_tags
                .patient_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            study_date: resource.main_dicom_tags.study_date,
            series: resource.series.into_iter().map(SeriesId).collect(),
        })
    }

    async fn fetch_series(&self, id: &SeriesId) -> Result<Series> {
        let resource: SeriesResource = self.get_json(&format!("/api/series/{}", id)).await?;
        Ok(Series {
            id: id.clone(),
            study_id: StudyId(resource.parent_study.unwrap_or_default()),
            modality: resource.main_dicom_tags.modality,
            instances: resource.instances.into_iter().map(InstanceId).collect(),
        })
    }

    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt> {
        let url = self.endpoints.url(Service::Archive, "/api/upload")?;
        let part = reqwest::multipart::Part::bytes(file.data.to_vec())
            .file_name(file.name.clone())
            .mime_str("application/dicom")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;
        let response = ensure_success(Service::Archive, response)?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| RtEditError::Decode(format!("upload response: {}", e)))?;

        let instance_id = body
            .orthanc_response
            .as_ref()
            .and_then(|value| value.get("ID"))
            .and_then(|id| id.as_str())
            .map(InstanceId::from);

        info!("Uploaded {} ({} bytes)", file.name, file.data.len());
        Ok(UploadReceipt {
            file_name: file.name.clone(),
            instance_id,
        })
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Bytes> {
        Ok(self.get(&image.path()).await?.bytes().await?)
    }

    async fn fetch_segmentation(&self, instance: &InstanceId) -> Result<Bytes> {
        let path = format!("/api/export/dicom-seg/{}", instance);
        Ok(self.get(&path).await?.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Multipart, Path},
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base: String) -> HttpArchiveClient {
        HttpArchiveClient::new(
            reqwest::Client::new(),
            ServiceEndpoints {
                archive_url: Some(base),
                ..Default::default()
            },
        )
    }

    fn archive_router() -> Router {
        Router::new()
            .route("/api/studies", get(|| async { Json(json!(["s1", "s2"])) }))
            .route(
                "/api/studies/:id",
                get(|Path(id): Path<String>| async move {
                    Json(json!({
                        "ID": id,
                        "MainDicomTags": { "StudyDate": "20240315" },
                        "PatientMainDicomTags": { "PatientName": "DOE^JANE" },
                        "Series": ["ct-1", "rt-1"]
                    }))
                }),
            )
            .route(
                "/api/series/:id",
                get(|Path(id): Path<String>| async move {
                    let modality = if id.starts_with("ct") { "CT" } else { "RTSTRUCT" };
                    Json(json!({
                        "ID": id,
                        "ParentStudy": "s1",
                        "MainDicomTags": { "Modality": modality },
                        "Instances": ["i1", "i2", "i3"]
                    }))
                }),
            )
            .route(
                "/api/upload",
                post(|mut multipart: Multipart| async move {
                    let mut field_name = String::new();
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        field_name = field.name().unwrap_or_default().to_string();
                    }
                    if field_name != "file" {
                        return (StatusCode::BAD_REQUEST, Json(json!({"error": "No file provided"})));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({"success": true, "orthanc_response": {"ID": "inst-9"}})),
                    )
                }),
            )
            .route(
                "/api/orthanc/instances/:id/file",
                get(|Path(id): Path<String>| async move { format!("DICM:{}", id) }),
            )
    }

    #[tokio::test]
    async fn test_study_and_series_detail() {
        let client = client_for(spawn(archive_router()).await);

        let ids = client.list_studies().await.unwrap();
        assert_eq!(ids, vec![StudyId::from("s1"), StudyId::from("s2")]);

        let study = client.fetch_study(&ids[0]).await.unwrap();
        assert_eq!(study.patient_name, "DOE^JANE");
        assert_eq!(study.display_date(), "15/03/2024");
        assert_eq!(study.series.len(), 2);

        let series = client.fetch_series(&SeriesId::from("ct-1")).await.unwrap();
        assert_eq!(series.modality.as_deref(), Some("CT"));
        assert_eq!(series.instances.len(), 3);
        assert_eq!(series.study_id, StudyId::from("s1"));
    }

    #[tokio::test]
    async fn test_upload_uses_file_field() {
        let client = client_for(spawn(archive_router()).await);
        let receipt = client
            .upload(&UploadFile::new("ct_001.dcm", vec![0u8; 16]))
            .await
            .unwrap();
        assert_eq!(receipt.instance_id, Some(InstanceId::from("inst-9")));
    }

    #[tokio::test]
    async fn test_fetch_image_follows_reference_path() {
        let client = client_for(spawn(archive_router()).await);
        let data = client
            .fetch_image(&ImageRef::wado(InstanceId::from("i2")))
            .await
            .unwrap();
        assert_eq!(&data[..], b"DICM:i2");
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_error() {
        let router = Router::new().route(
            "/api/studies",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = client_for(spawn(router).await);
        let err = client.list_studies().await.unwrap_err();
        assert!(matches!(err, RtEditError::Http { service: "archive", status: 500 }));
    }

    #[tokio::test]
    async fn test_missing_patient_name_defaults_to_unknown() {
        let router = Router::new().route(
            "/api/studies/:id",
            get(|| async { Json(json!({ "Series": [] })) }),
        );
        let client = client_for(spawn(router).await);
        let study = client.fetch_study(&StudyId::from("x")).await.unwrap();
        assert_eq!(study.patient_name, "Unknown");
        assert_eq!(study.display_date(), "N/A");
    }

    #[tokio::test]
    async fn test_unconfigured_archive_fails_without_panicking() {
        let client = HttpArchiveClient::new(reqwest::Client::new(), ServiceEndpoints::default());
        let err = client.list_studies().await.unwrap_err();
        assert!(matches!(err, RtEditError::NotConfigured("archive")));
    }
}
