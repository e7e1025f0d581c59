//! RT-STRUCT 编辑流水线命令行工具

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use rtedit_admin::{init_logging, AppConfig, ConfigManager};
use rtedit_core::{ImageRef, StudyId};
use rtedit_integration::{build_client, HttpArchiveClient, HttpRoiExtractor, UploadFile};
use rtedit_workflow::{
    Collaborators, ControllerSettings, Notification, NotificationLevel, PipelineController,
    ProgressReporter, SliceDisplay, ViewerTool,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "rtedit-cli")]
#[command(about = "RT-STRUCT 编辑流水线：上传、浏览、ROI提取与DICOM-SEG生成")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别（覆盖配置）
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 列出归档中的检查
    Studies,
    /// 按顺序上传DICOM文件
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 分类检查的系列并列出ROI
    Inspect { study: String },
    /// 运行处理流水线
    Process {
        study: String,
        /// 完成后把DICOM-SEG写入该文件
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// 导出第 k 张切片（从1开始）
    Slice {
        study: String,
        index: usize,
        #[arg(long)]
        out: PathBuf,
        /// 查看器工具
        #[arg(long, default_value = "zoom")]
        tool: String,
    },
    /// 打印生效的配置
    Config {
        /// 打印内置默认值
        #[arg(long)]
        defaults: bool,
    },
}

/// 输出到终端的上报器
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn status(&self, message: &str) {
        println!("⏳ {}", message);
    }

    fn progress(&self, percent: f64) {
        println!("   {:>3.0}%", percent);
    }

    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => println!("✅ {}", notification.message),
            NotificationLevel::Error => eprintln!("❌ {}", notification.message),
            NotificationLevel::Info => println!("ℹ️  {}", notification.message),
        }
    }
}

/// 把显示的切片写入文件
struct FileDisplay {
    path: PathBuf,
}

#[async_trait]
impl SliceDisplay for FileDisplay {
    async fn show(&self, image: &ImageRef, data: Bytes) -> rtedit_core::Result<()> {
        tokio::fs::write(&self.path, &data).await?;
        info!("Slice {} written to {}", image, self.path.display());
        Ok(())
    }
}

/// 不输出切片
struct NullDisplay;

#[async_trait]
impl SliceDisplay for NullDisplay {
    async fn show(&self, _image: &ImageRef, _data: Bytes) -> rtedit_core::Result<()> {
        Ok(())
    }
}

fn build_controller(config: &AppConfig, display: Arc<dyn SliceDisplay>) -> Result<PipelineController> {
    let client = build_client(config.connect_timeout())?;
    let endpoints = config.endpoints();

    let collaborators = Collaborators {
        archive: Arc::new(HttpArchiveClient::new(client.clone(), endpoints.clone())),
        extractor: Arc::new(HttpRoiExtractor::new(client.clone(), endpoints)),
        backend: config.processing_backend(client),
        display,
        reporter: Arc::new(ConsoleReporter),
    };
    let settings = ControllerSettings {
        study_limit: config.catalog.study_limit,
        upload_budget: config.upload_timeout(),
        extraction_budget: config.extraction_timeout(),
        step_budget: config.step_timeout(),
    };
    Ok(PipelineController::new(collaborators, settings))
}

/// Ctrl-C 取消当前操作
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling current operation");
            child.cancel();
        }
    });
    token
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(UploadFile::new(name, data));
    }
    Ok(files)
}

async fn print_selection(
    controller: &PipelineController,
    study: &StudyId,
    cancel: &CancellationToken,
) -> Result<()> {
    let summary = controller.select_study(study, cancel).await?;
    let session = controller.session().await;

    if let Some(study) = &session.study {
        println!("检查 {} | 患者 {} | 日期 {}", study.id, study.patient_name, study.display_date());
    }
    match &summary.ct_series {
        Some(series) => println!("  CT: {} ({} 张切片)", series, summary.slices),
        None => println!("  CT: -"),
    }
    match &summary.rtstruct_series {
        Some(series) => println!("  RT-STRUCT: {}", series),
        None => println!("  RT-STRUCT: -"),
    }
    if session.rois.is_empty() {
        println!("  ROI: 无");
    }
    for (i, roi) in session.rois.iter().enumerate() {
        println!("  [{}] {} {} {}", i, roi.color, roi.name, roi.volume_label());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigManager::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging)?;

    match args.command {
        Command::Config { defaults } => {
            let text = if defaults {
                ConfigManager::default_toml()?
            } else {
                ConfigManager::to_toml(&config)?
            };
            println!("{}", text);
        }
        Command::Studies => {
            let controller = build_controller(&config, Arc::new(NullDisplay))?;
            let studies = controller.refresh_catalog().await?;
            if studies.is_empty() {
                println!("No studies");
            }
            for study in studies {
                println!(
                    "{}  {}  {}  ({} series)",
                    study.id,
                    study.patient_name,
                    study.display_date(),
                    study.series.len()
                );
            }
        }
        Command::Upload { files } => {
            let controller = build_controller(&config, Arc::new(NullDisplay))?;
            let files = read_files(&files).await?;
            let report = controller.import_files(&files, &cancel_on_interrupt()).await?;
            for receipt in report.receipts {
                match receipt.instance_id {
                    Some(id) => println!("  {} -> {}", receipt.file_name, id),
                    None => println!("  {}", receipt.file_name),
                }
            }
        }
        Command::Inspect { study } => {
            let controller = build_controller(&config, Arc::new(NullDisplay))?;
            print_selection(&controller, &StudyId::new(study), &cancel_on_interrupt()).await?;
        }
        Command::Process { study, export } => {
            let controller = build_controller(&config, Arc::new(NullDisplay))?;
            let cancel = cancel_on_interrupt();
            print_selection(&controller, &StudyId::new(study), &cancel).await?;
            controller.process(&cancel).await?;

            if let Some(path) = export {
                let data = controller.export().await?;
                tokio::fs::write(&path, &data)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("DICOM-SEG saved to {}", path.display());
            }
        }
        Command::Slice {
            study,
            index,
            out,
            tool,
        } => {
            let tool: ViewerTool = tool.parse()?;
            let display = Arc::new(FileDisplay { path: out.clone() });
            let controller = build_controller(&config, display)?;
            controller
                .select_study(&StudyId::new(study), &cancel_on_interrupt())
                .await?;
            controller.select_tool(tool).await?;
            let image = controller.navigate_slice(index).await?;

            let session = controller.session().await;
            if let Some(viewer) = session.viewer {
                println!(
                    "切片 {}/{} ({}) -> {}",
                    viewer.counter_text(),
                    viewer.len(),
                    image.instance,
                    out.display()
                );
            }
        }
    }

    Ok(())
}
