//! 检查/系列目录
//!
//! 维护检查列表快照，并在选择检查时把系列分类为CT与RT-STRUCT两种角色。

use rtedit_core::{InstanceId, Result, Series, SeriesId, SeriesRole, Study, StudyId};
use rtedit_integration::{ArchiveClient, ProcessingRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 检查列表的硬上限
pub const MAX_LISTED_STUDIES: usize = 20;

/// 系列分类结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub study_id: StudyId,
    pub ct: Option<Series>,
    pub rtstruct: Option<Series>,
    pub other: Vec<SeriesId>,
}

impl Classification {
    /// 同时存在CT与RT-STRUCT时才允许处理
    pub fn can_process(&self) -> bool {
        self.ct.is_some() && self.rtstruct.is_some()
    }

    /// RT-STRUCT系列的第一个实例
    pub fn rtstruct_instance(&self) -> Option<&InstanceId> {
        self.rtstruct.as_ref().and_then(|s| s.instances.first())
    }

    pub fn processing_request(&self) -> Option<ProcessingRequest> {
        let ct = self.ct.as_ref()?;
        let rtstruct_instance = self.rtstruct_instance()?.clone();
        Some(ProcessingRequest {
            study_id: self.study_id.clone(),
            ct_series: ct.id.clone(),
            rtstruct_instance,
        })
    }
}

/// 按目录顺序分类系列；同一模态出现多次时最后一个生效
pub fn classify_series<I>(study_id: &StudyId, series: I) -> Classification
where
    I: IntoIterator<Item = Series>,
{
    let mut classification = Classification {
        study_id: study_id.clone(),
        ct: None,
        rtstruct: None,
        other: Vec::new(),
    };

    for s in series {
        match s.role() {
            SeriesRole::Ct => classification.ct = Some(s),
            SeriesRole::RtStruct => classification.rtstruct = Some(s),
            SeriesRole::Other => classification.other.push(s.id),
        }
    }

    classification
}

/// 检查目录，检查与系列记录的唯一写入者
pub struct StudyCatalog {
    archive: Arc<dyn ArchiveClient>,
    limit: usize,
    studies: RwLock<Vec<Study>>,
    series: RwLock<HashMap<SeriesId, Series>>,
}

impl StudyCatalog {
    pub fn new(archive: Arc<dyn ArchiveClient>, limit: usize) -> Self {
        Self {
            archive,
            limit: limit.clamp(1, MAX_LISTED_STUDIES),
            studies: RwLock::new(Vec::new()),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// 重新获取检查列表
    ///
    /// 列表本身获取失败时保留上一份快照；某个检查详情获取失败时，
    /// 发布在它之前已取到的检查。
    pub async fn refresh(&self) -> Result<Vec<Study>> {
        let ids = self.archive.list_studies().await?;
        debug!("Archive lists {} studies, showing up to {}", ids.len(), self.limit);

        let mut studies = Vec::with_capacity(ids.len().min(self.limit));
        for id in ids.into_iter().take(self.limit) {
            match self.archive.fetch_study(&id).await {
                Ok(study) => studies.push(study),
                Err(e) => {
                    warn!("Failed to fetch study {}: {}", id, e);
                    break;
                }
            }
        }

        *self.studies.write().await = studies.clone();
        info!("Catalog refreshed with {} studies", studies.len());
        Ok(studies)
    }

    pub async fn studies(&self) -> Vec<Study> {
        self.studies.read().await.clone()
    }

    pub async fn study(&self, id: &StudyId) -> Option<Study> {
        self.studies.read().await.iter().find(|s| &s.id == id).cloned()
    }

    pub async fn series(&self, id: &SeriesId) -> Option<Series> {
        self.series.read().await.get(id).cloned()
    }

    /// 获取检查的全部系列详情并分类
    pub async fn classify(&self, study_id: &StudyId) -> Result<(Study, Classification)> {
        let study = match self.study(study_id).await {
            Some(study) => study,
            None => self.archive.fetch_study(study_id).await?,
        };

        let mut fetched = Vec::with_capacity(study.series.len());
        for series_id in &study.series {
            let mut series = self.archive.fetch_series(series_id).await?;
            series.study_id = study.id.clone();
            fetched.push(series);
        }

        {
            let mut index = self.series.write().await;
            for series in &fetched {
                index.insert(series.id.clone(), series.clone());
            }
        }

        let classification = classify_series(&study.id, fetched);
        info!(
            "Study {} classified: CT={:?} RTSTRUCT={:?}",
            study.id,
            classification.ct.as_ref().map(|s| s.id.as_str()),
            classification.rtstruct.as_ref().map(|s| s.id.as_str())
        );
        Ok((study, classification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeArchive};

    #[test]
    fn test_last_match_wins() {
        let study_id = StudyId::from("s1");
        let list = vec![
            testing::series("A", "s1", "CT", 3),
            testing::series("B", "s1", "RTSTRUCT", 1),
            testing::series("C", "s1", "CT", 5),
            testing::series("D", "s1", "RTSTRUCT", 1),
        ];

        let classification = classify_series(&study_id, list);
        assert_eq!(classification.ct.unwrap().id, SeriesId::from("C"));
        assert_eq!(classification.rtstruct.unwrap().id, SeriesId::from("D"));
    }

    #[test]
    fn test_partial_classification_disables_processing() {
        let study_id = StudyId::from("s1");
        let classification = classify_series(
            &study_id,
            vec![
                testing::series("A", "s1", "CT", 3),
                testing::series("M", "s1", "MR", 2),
            ],
        );
        assert!(!classification.can_process());
        assert!(classification.processing_request().is_none());
        assert_eq!(classification.other, vec![SeriesId::from("M")]);
    }

    #[test]
    fn test_rtstruct_without_instances_cannot_build_request() {
        let study_id = StudyId::from("s1");
        let classification = classify_series(
            &study_id,
            vec![
                testing::series("A", "s1", "CT", 3),
                testing::series("B", "s1", "RTSTRUCT", 0),
            ],
        );
        assert!(classification.can_process());
        assert!(classification.processing_request().is_none());
    }

    #[tokio::test]
    async fn test_refresh_caps_at_twenty() {
        let archive = Arc::new(FakeArchive::default());
        for i in 0..25 {
            archive.add_study(testing::study(&format!("s{}", i), &[]), vec![]);
        }
        let catalog = StudyCatalog::new(archive, 50);

        let studies = catalog.refresh().await.unwrap();
        assert_eq!(studies.len(), MAX_LISTED_STUDIES);
        assert_eq!(studies[0].id, StudyId::from("s0"));
        assert_eq!(studies[19].id, StudyId::from("s19"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let ct = testing::series("ct", "s1", "CT", 2);
        let archive = FakeArchive::with_study(testing::study("s1", &[&ct]), vec![ct.clone()]);
        let catalog = StudyCatalog::new(archive.clone(), MAX_LISTED_STUDIES);
        catalog.refresh().await.unwrap();

        *archive.offline.lock().unwrap() = true;
        assert!(catalog.refresh().await.is_err());
        assert_eq!(catalog.studies().await.len(), 1);
    }

    #[tokio::test]
    async fn test_study_fetch_failure_publishes_earlier_studies() {
        let archive = Arc::new(FakeArchive::default());
        for id in ["s1", "s2", "s3"] {
            archive.add_study(testing::study(id, &[]), vec![]);
        }
        archive.broken_studies.lock().unwrap().insert(StudyId::from("s2"));
        let catalog = StudyCatalog::new(archive, MAX_LISTED_STUDIES);

        let studies = catalog.refresh().await.unwrap();
        assert_eq!(studies.len(), 1);
        assert_eq!(studies[0].id, StudyId::from("s1"));
        assert_eq!(catalog.studies().await, studies);
    }

    #[tokio::test]
    async fn test_classify_fetches_series_in_order() {
        let a = testing::series("A", "s1", "CT", 3);
        let b = testing::series("B", "s1", "RTSTRUCT", 1);
        let c = testing::series("C", "s1", "CT", 4);
        let archive = FakeArchive::with_study(
            testing::study("s1", &[&a, &b, &c]),
            vec![a.clone(), b.clone(), c.clone()],
        );
        let catalog = StudyCatalog::new(archive.clone(), MAX_LISTED_STUDIES);

        let (study, classification) = catalog.classify(&StudyId::from("s1")).await.unwrap();
        assert_eq!(study.series.len(), 3);
        assert_eq!(classification.ct.as_ref().unwrap().id, SeriesId::from("C"));
        assert!(classification.can_process());
        assert_eq!(*archive.series_fetches.lock().unwrap(), 3);
        assert!(catalog.series(&SeriesId::from("A")).await.is_some());
    }
}
