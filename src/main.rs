use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bucketlist::path::SEPARATOR;
use bucketlist::{
    BucketList, Callbacks, Config, Document, EncodedPath, HttpHost, NodeId, SelectedFile, server,
};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 单个目录请求或上传的超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "bucketlist", version, about = "桶/文件树组件与参考接口")]
struct Cli {
    #[command(subcommand)]
    command: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// 运行目录列表 + 上传参考接口
    Serve {
        /// 对外提供的根目录，其下的一级目录即为桶
        #[arg(long, env = "BUCKETLIST_ROOT")]
        root: PathBuf,
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
    /// 通过 HTTP 驱动组件并打印最终的目录树
    Browse {
        #[arg(long)]
        config: PathBuf,
        /// 展开编码目录（如 `photos%2F2024%2F`）后把本地文件上传进去
        #[arg(long, num_args = 2, value_names = ["ENCODED_DIR", "FILE"])]
        upload: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bucketlist=info,tower_http=info")),
        )
        .init();

    match Cli::parse().command {
        Mode::Serve { root, bind } => {
            let listener = TcpListener::bind(bind)
                .await
                .with_context(|| format!("无法监听 {bind}"))?;
            if let Some(local_ip) = get_local_ip().filter(|_| bind.ip().is_unspecified()) {
                println!("Listing available at: http://{}:{}/listing", local_ip, bind.port());
            }
            server::serve(listener, &root).await
        }
        Mode::Browse { config, upload } => {
            let config = Config::load(&config)?;
            let upload = match upload.as_deref() {
                Some([dir, file]) => Some((EncodedPath::new(dir.as_str()), PathBuf::from(file))),
                Some(_) => return Err(anyhow!("--upload 需要目录和文件两个参数")),
                None => None,
            };
            browse(config, upload).await
        }
    }
}

fn reporting_callbacks(config: &Config) -> Callbacks {
    let started = config.language_string("uploadStarted").to_string();
    let succeeded = config.language_string("uploadSucceeded").to_string();
    let failed = config.language_string("uploadFailed").to_string();

    Callbacks::new()
        .on_branch_load(|load| info!(path = %load.encoded_path, "branch loaded"))
        .on_file_click(|click| info!(file = %click.file_name, "file selected"))
        .on_upload_start(move |start| println!("{started}: {} ({})", start.file_name, start.id))
        .on_upload_success(move |outcome| println!("{succeeded}: {}", outcome.message))
        .on_upload_failure(move |outcome| eprintln!("{failed}: {}", outcome.message))
}

async fn browse(config: Config, upload: Option<(EncodedPath, PathBuf)>) -> Result<()> {
    let callbacks = reporting_callbacks(&config);
    let (doc, root) = Document::with_placeholder(config.language_string("loading"));
    let mut widget = BucketList::new(doc, root, config, callbacks)?;
    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let host = HttpHost::with_client(client);
    host.run_until_idle(&mut widget).await?;

    if let Some((dir, file)) = upload {
        open_directory(&host, &mut widget, &dir).await?;
        let input = upload_input(&widget, &dir)
            .ok_or_else(|| anyhow!("目录 {dir} 没有上传入口"))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("无效的文件路径 {}", file.display()))?;
        widget.file_selected(input, SelectedFile { name, path: file })?;
        host.run_until_idle(&mut widget).await?;
    }

    print!("{}", widget.outline());
    Ok(())
}

/// 逐级点击 `dir` 的每一层祖先，已展开的层级跳过
async fn open_directory(host: &HttpHost, widget: &mut BucketList, dir: &EncodedPath) -> Result<()> {
    let segments: Vec<&str> = dir
        .as_str()
        .trim_end_matches(SEPARATOR)
        .split(SEPARATOR)
        .collect();
    for depth in 1..=segments.len() {
        let rel = format!("{}{SEPARATOR}", segments[..depth].join(SEPARATOR));
        let doc = widget.document();
        let anchor = doc
            .find_descendant(widget.root(), |d, n| d.attr(n, "rel") == Some(rel.as_str()))
            .ok_or_else(|| anyhow!("树中没有目录 {rel}"))?;
        let item = doc.parent(anchor).ok_or_else(|| anyhow!("目录 {rel} 不在列表项内"))?;
        if doc.has_class(item, "expanded") {
            continue;
        }
        widget.click(anchor)?;
        host.run_until_idle(widget).await?;
    }
    Ok(())
}

fn upload_input(widget: &BucketList, dir: &EncodedPath) -> Option<NodeId> {
    let doc = widget.document();
    let wrapper = doc.find_descendant(widget.root(), |d, n| {
        d.has_class(n, "bucketload")
            && d.find_descendant(n, |d, c| {
                d.attr(c, "name") == Some("path") && d.attr(c, "value") == Some(dir.as_str())
            })
            .is_some()
    })?;
    doc.find_descendant(wrapper, |d, n| {
        d.is_element(n, "input") && d.attr(n, "type") == Some("file")
    })
}

fn get_local_ip() -> Option<String> {
    use std::net::{IpAddr, Ipv4Addr};

    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?; // 80主要是防止防火墙拦截

    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ipv4) if !ipv4.is_loopback() && ipv4 != Ipv4Addr::UNSPECIFIED => {
            Some(ipv4.to_string())
        }
        _ => None,
    }
}
