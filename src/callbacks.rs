//! 宿主回调。全部可选，默认什么都不做。

use std::fmt;

use crate::dom::NodeId;
use crate::path::EncodedPath;
use crate::upload::{UploadId, UploadStatus};

/// 非根分支加载完成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchLoad {
    pub node: NodeId,
    pub encoded_path: EncodedPath,
}

/// 点击了文件项；`file_name` 是该项的编码路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClick {
    pub node: NodeId,
    pub file_name: EncodedPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStart {
    pub file_name: String,
    pub id: UploadId,
}

/// 上传结果，成功和失败回调共用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub list_item: String,
    pub message: String,
    pub status: UploadStatus,
    pub upload_id: String,
}

type Handler<T> = Box<dyn FnMut(T)>;

pub struct Callbacks {
    branch_load: Handler<BranchLoad>,
    file_click: Handler<FileClick>,
    upload_start: Handler<UploadStart>,
    upload_success: Handler<UploadOutcome>,
    upload_failure: Handler<UploadOutcome>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            branch_load: Box::new(|_| {}),
            file_click: Box::new(|_| {}),
            upload_start: Box::new(|_| {}),
            upload_success: Box::new(|_| {}),
            upload_failure: Box::new(|_| {}),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_branch_load(mut self, handler: impl FnMut(BranchLoad) + 'static) -> Self {
        self.branch_load = Box::new(handler);
        self
    }

    pub fn on_file_click(mut self, handler: impl FnMut(FileClick) + 'static) -> Self {
        self.file_click = Box::new(handler);
        self
    }

    pub fn on_upload_start(mut self, handler: impl FnMut(UploadStart) + 'static) -> Self {
        self.upload_start = Box::new(handler);
        self
    }

    pub fn on_upload_success(mut self, handler: impl FnMut(UploadOutcome) + 'static) -> Self {
        self.upload_success = Box::new(handler);
        self
    }

    pub fn on_upload_failure(mut self, handler: impl FnMut(UploadOutcome) + 'static) -> Self {
        self.upload_failure = Box::new(handler);
        self
    }

    pub(crate) fn branch_load(&mut self, params: BranchLoad) {
        (self.branch_load)(params)
    }

    pub(crate) fn file_click(&mut self, params: FileClick) {
        (self.file_click)(params)
    }

    pub(crate) fn upload_start(&mut self, params: UploadStart) {
        (self.upload_start)(params)
    }

    pub(crate) fn upload_success(&mut self, params: UploadOutcome) {
        (self.upload_success)(params)
    }

    pub(crate) fn upload_failure(&mut self, params: UploadOutcome) {
        (self.upload_failure)(params)
    }
}
