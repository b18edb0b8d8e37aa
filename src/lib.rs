//! 按需展开的桶/文件树组件，附带基于隐藏框架的上传关联。
//!
//! [`BucketList`] 不做 I/O：它维护一棵 [`Document`]，把需要的网络
//! 请求作为 [`Command`] 交给宿主。[`client::HttpHost`] 是基于 reqwest
//! 的宿主实现，[`server`] 提供与之配套的参考接口。

pub mod callbacks;
pub mod client;
pub mod config;
pub mod dom;
pub mod error;
pub mod html;
pub mod path;
pub mod server;
pub mod tree;
pub mod upload;
pub mod widget;

pub use callbacks::{BranchLoad, Callbacks, FileClick, UploadOutcome, UploadStart};
pub use client::HttpHost;
pub use config::Config;
pub use dom::{Animation, Document, EventKind, Layout, NodeId, SelectedFile};
pub use error::{BucketListError, Result};
pub use path::{AutoNavigation, EncodedPath};
pub use tree::{ClickOutcome, DirectoryState};
pub use upload::{UploadId, UploadStatus};
pub use widget::{BucketList, Command, FetchTicket, UploadSubmission};
