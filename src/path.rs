//! 百分号编码路径。
//!
//! 服务端输出的路径始终保持编码形式写回文档和回调；
//! 只有目录请求在构造 `dir` 参数时才临时解码。

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// 编码后的路径分隔符
pub const SEPARATOR: &str = "%2F";

/// 与 PHP `rawurlencode` 相同：只保留字母数字和 `-_.~`
const RAW_URL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EncodedPath(String);

impl EncodedPath {
    /// 包装一个已经编码好的路径（例如 `rel` 属性的值）
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// 对原始路径做 raw-url 编码，`/` 也会被编码
    pub fn encode(raw: &str) -> Self {
        Self(utf8_percent_encode(raw, RAW_URL).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 空路径表示根（桶列表）
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn decode(&self) -> String {
        percent_decode_str(&self.0).decode_utf8_lossy().into_owned()
    }
}

impl fmt::Display for EncodedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 初始文件的自动展开游标，每次目录加载完成前进一级
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoNavigation {
    segments: Vec<String>,
    step: usize,
}

impl AutoNavigation {
    /// 空字符串表示不需要自动展开
    pub fn new(initial_file: &str) -> Option<Self> {
        if initial_file.is_empty() {
            return None;
        }
        Some(Self {
            segments: initial_file.split(SEPARATOR).map(str::to_string).collect(),
            step: 0,
        })
    }

    /// 当前一步要点击的 `rel`；除最后一步外都带上结尾分隔符
    pub fn current_target(&self) -> Option<EncodedPath> {
        if self.is_finished() {
            return None;
        }
        let mut target = self.segments[..=self.step].join(SEPARATOR);
        if self.step + 1 < self.segments.len() {
            target.push_str(SEPARATOR);
        }
        Some(EncodedPath(target))
    }

    pub fn advance(&mut self) {
        self.step = (self.step + 1).min(self.segments.len());
    }

    pub fn abandon(&mut self) {
        self.step = self.segments.len();
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.segments.len()
    }
}
