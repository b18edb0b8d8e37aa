//! 参考服务端：目录列表片段接口 + multipart 上传接口。
//!
//! 组件只依赖这里输出的 HTML 契约，真实部署中由 CMS 提供同样的接口。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::html::{render_entry, render_listing, render_upload_response, EntryKind, ListingEntry};
use crate::path::EncodedPath;
use crate::upload::UploadStatus;

const UPLOAD_LABEL: &str = "Upload file";

#[derive(Clone)]
struct AppState {
    root: Arc<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ListingQuery {
    #[serde(default)]
    dir: String,
}

pub fn router(root: PathBuf) -> Router {
    Router::new()
        .route("/listing", get(listing))
        .route("/upload", post(upload))
        .with_state(AppState {
            root: Arc::new(root),
        })
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(listener: TcpListener, root: &Path) -> anyhow::Result<()> {
    // 规范化为绝对路径，后续的越界检查都基于它
    let root = tokio::fs::canonicalize(root)
        .await
        .with_context(|| format!("无法访问根目录 {}", root.display()))?;
    info!(addr = %listener.local_addr()?, root = %root.display(), "serving bucket listing");
    axum::serve(listener, router(root)).await?;
    Ok(())
}

/// 解析相对目录并确认其仍在根目录内
async fn resolve_dir(root: &Path, dir: &str) -> Result<PathBuf, StatusCode> {
    let full_path = root.join(dir.trim_start_matches('/'));
    let canonical = tokio::fs::canonicalize(&full_path)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    if !canonical.starts_with(root) {
        return Err(StatusCode::FORBIDDEN);
    }
    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    if !metadata.is_dir() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(canonical)
}

/// 相对根目录的 `/` 分隔路径
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn entry_for(root: &Path, path: &Path, is_dir: bool, size: u64) -> ListingEntry {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut rel = relative_path(root, path);
    if is_dir {
        rel.push('/');
    }
    ListingEntry {
        name,
        rel: EncodedPath::encode(&rel),
        kind: if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: (!is_dir).then_some(size),
    }
}

async fn read_entries(root: &Path, dir: &Path, buckets_only: bool) -> std::io::Result<Vec<ListingEntry>> {
    let mut dir_entries = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = dir_entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        let is_dir = metadata.is_dir();
        if buckets_only && !is_dir {
            continue;
        }
        entries.push(entry_for(root, &entry.path(), is_dir, metadata.len()));
    }

    // 目录在前，各自按名称不区分大小写排序
    entries.sort_by(|a, b| {
        (a.kind == EntryKind::File, a.name.to_lowercase())
            .cmp(&(b.kind == EntryKind::File, b.name.to_lowercase()))
    });
    Ok(entries)
}

async fn listing(State(state): State<AppState>, Query(query): Query<ListingQuery>) -> Response {
    let dir = match resolve_dir(&state.root, &query.dir).await {
        Ok(dir) => dir,
        Err(status) => return status.into_response(),
    };

    let is_root = query.dir.trim_matches('/').is_empty();
    match read_entries(&state.root, &dir, is_root).await {
        Ok(entries) => {
            let upload = (!is_root).then_some(UPLOAD_LABEL);
            Html(render_listing(&entries, upload)).into_response()
        }
        Err(e) => {
            warn!(dir = %query.dir, error = %e, "failed to list directory");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

struct Stored {
    upload_id: String,
    entry: ListingEntry,
}

struct Rejected {
    upload_id: String,
    message: String,
}

impl Rejected {
    fn new(upload_id: &str, message: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.to_string(),
            message: message.into(),
        }
    }
}

/// 上传结果总是以响应文档返回，由客户端框架解析
async fn upload(State(state): State<AppState>, multipart: Multipart) -> Html<String> {
    match receive(&state.root, multipart).await {
        Ok(stored) => {
            info!(upload_id = %stored.upload_id, file = %stored.entry.name, "stored upload");
            let item = render_entry(&stored.entry);
            Html(render_upload_response(
                UploadStatus::Success,
                "File uploaded.",
                &stored.upload_id,
                Some(&item),
            ))
        }
        Err(rejected) => {
            warn!(upload_id = %rejected.upload_id, reason = %rejected.message, "upload rejected");
            Html(render_upload_response(
                UploadStatus::Failure,
                &rejected.message,
                &rejected.upload_id,
                None,
            ))
        }
    }
}

/// 字段顺序与客户端表单一致：path、upload_id、file
async fn receive(root: &Path, mut multipart: Multipart) -> Result<Stored, Rejected> {
    let mut path: Option<EncodedPath> = None;
    let mut upload_id = String::new();

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| Rejected::new(&upload_id, format!("malformed upload: {e}")))?;
        let Some(mut field) = field else {
            return Err(Rejected::new(&upload_id, "no file received"));
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "path" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Rejected::new(&upload_id, e.to_string()))?;
                path = Some(EncodedPath::new(value));
            }
            "upload_id" => {
                upload_id = field
                    .text()
                    .await
                    .map_err(|e| Rejected::new(&upload_id, e.to_string()))?;
            }
            "file" => {
                let Some(path) = path.as_ref() else {
                    return Err(Rejected::new(&upload_id, "path must precede file"));
                };
                let filename = field
                    .file_name()
                    .map(sanitize_filename::sanitize)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| Rejected::new(&upload_id, "missing file name"))?;

                let target_dir = resolve_dir(root, &path.decode())
                    .await
                    .map_err(|_| Rejected::new(&upload_id, "unknown upload folder"))?;
                let file_path = target_dir.join(&filename);

                let mut file = tokio::fs::File::create(&file_path)
                    .await
                    .map_err(|e| Rejected::new(&upload_id, e.to_string()))?;
                let mut written = 0u64;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| Rejected::new(&upload_id, e.to_string()))?
                {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| Rejected::new(&upload_id, e.to_string()))?;
                    written += chunk.len() as u64;
                }
                file.flush()
                    .await
                    .map_err(|e| Rejected::new(&upload_id, e.to_string()))?;

                return Ok(Stored {
                    entry: entry_for(root, &file_path, false, written),
                    upload_id,
                });
            }
            _ => {}
        }
    }
}
