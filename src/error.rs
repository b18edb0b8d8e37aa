use std::path::PathBuf;

use thiserror::Error;

use crate::dom::NodeId;
use crate::widget::FetchTicket;

/// 组件对外的错误类型。
///
/// 只有宿主误用（失效句柄、未知票据）和边缘 I/O 会走到这里；
/// 上传失败、目录加载失败这类业务结果通过回调上报，不会变成 `Err`。
#[derive(Debug, Error)]
pub enum BucketListError {
    #[error("无法解析 HTML 片段: {0}")]
    Markup(#[from] quick_xml::Error),

    #[error("节点 {0:?} 已不在文档中")]
    StaleNode(NodeId),

    #[error("未知的目录请求票据 {0}")]
    UnknownTicket(FetchTicket),

    #[error("未知的上传框架 {0:?}")]
    UnknownFrame(NodeId),

    #[error("读取配置文件 {} 失败: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置格式错误: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BucketListError>;
