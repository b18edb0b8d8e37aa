//! 组件实例：目录树和上传关联共享的状态都挂在这里。
//!
//! 组件本身不做任何 I/O。它产生 [`Command`]，由宿主执行后
//! 再通过 `fetch_completed` / `frame_loaded` 把结果送回来；
//! “下一轮事件循环再执行”的步骤放在延迟队列里，由宿主调用
//! [`BucketList::run_deferred`] 驱动。

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::debug;

use crate::callbacks::Callbacks;
use crate::config::Config;
use crate::dom::{Document, EventKind, NodeId, SelectedFile};
use crate::error::{BucketListError, Result};
use crate::path::{AutoNavigation, EncodedPath};
use crate::upload::{HiddenFrame, PendingSubmit, UploadId, UploadSession};

/// 目录请求的关联票据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTicket(pub(crate) u64);

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 需要宿主执行的 I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `GET url?dir=<dir>`，`dir` 是解码后的路径
    FetchListing {
        ticket: FetchTicket,
        url: String,
        dir: String,
    },
    /// 在隐藏框架里提交上传表单，响应文档通过 `frame_loaded` 送回
    SubmitUpload {
        frame: NodeId,
        submission: UploadSubmission,
    },
    /// 框架跳转，完成后同样调用 `frame_loaded`（不带内容）
    NavigateFrame { frame: NodeId, url: String },
}

/// 从框架内表单读出的 multipart 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSubmission {
    pub action: String,
    pub fields: Vec<(String, String)>,
    pub file: Option<SelectedFile>,
}

pub(crate) enum Deferred {
    SubmitUpload(PendingSubmit),
}

#[derive(Debug, Clone)]
pub(crate) struct PendingFetch {
    pub(crate) node: NodeId,
    pub(crate) path: EncodedPath,
}

pub struct BucketList {
    pub(crate) doc: Document,
    pub(crate) root: NodeId,
    pub(crate) config: Config,
    pub(crate) callbacks: Callbacks,
    /// 上传中的会话：upload id -> 目标分支
    pub(crate) uploads: HashMap<UploadId, UploadSession>,
    /// 首次加载提示是否还在
    pub(crate) initial_load: bool,
    pub(crate) auto_nav: Option<AutoNavigation>,
    pub(crate) fetches: HashMap<FetchTicket, PendingFetch>,
    /// 每个节点最近一次请求的票据，旧票据的结果会被丢弃
    pub(crate) loading: HashMap<NodeId, FetchTicket>,
    pub(crate) frames: HashMap<NodeId, HiddenFrame>,
    pub(crate) deferred: VecDeque<Deferred>,
    pub(crate) commands: VecDeque<Command>,
    next_ticket: u64,
}

impl fmt::Debug for BucketList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketList")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("uploads", &self.uploads.len())
            .field("initial_load", &self.initial_load)
            .field("pending_fetches", &self.fetches.len())
            .field("frames", &self.frames.len())
            .finish_non_exhaustive()
    }
}

impl BucketList {
    /// 绑定到 `root`，注册委托点击并发出根目录请求
    pub fn new(doc: Document, root: NodeId, config: Config, callbacks: Callbacks) -> Result<Self> {
        if !doc.contains(root) {
            return Err(BucketListError::StaleNode(root));
        }

        let auto_nav = AutoNavigation::new(&config.initial_file);
        let mut widget = Self {
            doc,
            root,
            config,
            callbacks,
            uploads: HashMap::new(),
            initial_load: true,
            auto_nav,
            fetches: HashMap::new(),
            loading: HashMap::new(),
            frames: HashMap::new(),
            deferred: VecDeque::new(),
            commands: VecDeque::new(),
            next_ticket: 0,
        };

        widget.doc.listen(root, EventKind::Click);
        widget.show_tree(root, EncodedPath::default());
        debug!(root = ?root, "bucketlist initialised");
        Ok(widget)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// 宿主用来设置布局等信息；结构性修改请通过组件事件完成
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn next_command(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// 执行上一轮排入的延迟任务，返回执行数量。
    /// 本轮执行中新排入的任务留到下一轮。
    pub fn run_deferred(&mut self) -> usize {
        let tasks = std::mem::take(&mut self.deferred);
        let count = tasks.len();
        for task in tasks {
            match task {
                Deferred::SubmitUpload(pending) => self.submit_upload(pending),
            }
        }
        count
    }

    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    pub fn has_session(&self, id: UploadId) -> bool {
        self.uploads.contains_key(&id)
    }

    pub(crate) fn issue_ticket(&mut self) -> FetchTicket {
        self.next_ticket += 1;
        FetchTicket(self.next_ticket)
    }

    pub(crate) fn ensure_alive(&self, node: NodeId) -> Result<()> {
        if self.doc.contains(node) {
            Ok(())
        } else {
            Err(BucketListError::StaleNode(node))
        }
    }
}
