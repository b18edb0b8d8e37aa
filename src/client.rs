//! HTTP 宿主：依次执行组件产生的命令，并把结果送回组件。

use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use crate::error::Result;
use crate::widget::{BucketList, Command, UploadSubmission};

#[derive(Debug, Clone, Default)]
pub struct HttpHost {
    client: reqwest::Client,
}

impl HttpHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// 一直执行到没有命令、也没有延迟任务为止
    pub async fn run_until_idle(&self, widget: &mut BucketList) -> Result<()> {
        loop {
            widget.run_deferred();
            match widget.next_command() {
                Some(command) => self.execute(widget, command).await?,
                None if widget.has_deferred() => continue,
                None => return Ok(()),
            }
        }
    }

    pub async fn execute(&self, widget: &mut BucketList, command: Command) -> Result<()> {
        match command {
            Command::FetchListing { ticket, url, dir } => {
                match self.fetch_listing(&url, &dir).await {
                    Ok(fragment) => widget.fetch_completed(ticket, Some(&fragment)),
                    Err(e) => {
                        warn!(url = %url, dir = %dir, error = %e, "listing request failed");
                        widget.fetch_completed(ticket, None)
                    }
                }
            }
            Command::SubmitUpload { frame, submission } => {
                // 请求失败时框架里只会有一个空文档，组件会按格式错误处理
                let document = self.submit(&submission).await.unwrap_or_else(|e| {
                    warn!(action = %submission.action, error = %e, "upload request failed");
                    String::new()
                });
                widget.frame_loaded(frame, Some(&document))
            }
            Command::NavigateFrame { frame, url } => {
                debug!(frame = ?frame, url = %url, "frame navigated");
                widget.frame_loaded(frame, None)
            }
        }
    }

    async fn fetch_listing(&self, url: &str, dir: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .query(&[("dir", dir)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn submit(&self, submission: &UploadSubmission) -> Result<String> {
        let mut form = Form::new();
        for (name, value) in &submission.fields {
            form = form.text(name.clone(), value.clone());
        }
        if let Some(file) = &submission.file {
            let bytes = tokio::fs::read(&file.path).await?;
            form = form.part("file", Part::bytes(bytes).file_name(file.name.clone()));
        }

        let response = self
            .client
            .post(&submission.action)
            .multipart(form)
            .send()
            .await?;
        Ok(response.text().await?)
    }
}
