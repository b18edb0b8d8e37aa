use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BucketListError, Result};

/// 单个组件实例的配置。
///
/// 所有字段都有默认值；同时接受驼峰写法（`ajaxScriptURL` 等），
/// 方便直接沿用宿主 CMS 里的配置键。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// 目录列表接口，以 `GET ?dir=<解码后的路径>` 调用
    #[serde(alias = "ajaxScriptURL")]
    pub ajax_script_url: String,

    /// 上传接口，multipart POST
    #[serde(alias = "uploadFormAction")]
    pub upload_form_action: String,

    /// 加载后自动展开到的文件（百分号编码）
    #[serde(alias = "initialFile")]
    pub initial_file: String,

    #[serde(alias = "languageStrings")]
    pub language_strings: BTreeMap<String, String>,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| BucketListError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// 查找本地化文本，缺失时返回 id 本身
    pub fn language_string<'a>(&'a self, id: &'a str) -> &'a str {
        self.language_strings
            .get(id)
            .map(String::as_str)
            .unwrap_or(id)
    }
}
