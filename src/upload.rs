//! 上传关联：隐藏表单 + 隐藏框架模拟异步上传，
//! 再按 upload id 把服务端响应路由回触发它的分支。

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::callbacks::{UploadOutcome, UploadStart};
use crate::dom::{Animation, Document, EventKind, NodeId, SelectedFile};
use crate::error::{BucketListError, Result};
use crate::html;
use crate::path::EncodedPath;
use crate::widget::{BucketList, Command, Deferred, UploadSubmission};

/// 清理用的空跳转地址；带着它触发的 load 不是真正的响应
pub const SENTINEL_URL: &str = "javascript: false;";

/// 新文件项出现的动画时长
pub const LIST_ITEM_SLIDE: Duration = Duration::from_millis(350);

/// 文件按钮相对指针的水平偏移
const FILE_BUTTON_OFFSET: f64 = 30.0;

/// 随机部分占用的低位数
const RANDOM_BITS: u32 = 20;

static UPLOAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// 上传会话标识：高位是进程内单调递增的序号，低位是随机数，
/// 因此同一进程内不会重复。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadId(u64);

impl UploadId {
    pub fn generate() -> Self {
        let sequence = UPLOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let random = (uuid::Uuid::new_v4().as_u128() as u64) & ((1 << RANDOM_BITS) - 1);
        Self((sequence << RANDOM_BITS) | random)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UploadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Success,
    Failure,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

impl UploadStatus {
    /// 只有 `success` 算成功
    pub fn parse(text: &str) -> Self {
        if text.trim() == "success" {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// 解析后的上传响应文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: UploadStatus,
    pub message: String,
    pub upload_id: String,
    pub list_item: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Valid(UploadResponse),
    /// `status`、`message`、`uploadId` 缺失或为空
    Malformed { upload_id: Option<String> },
}

impl ResponseOutcome {
    pub fn from_document(doc: &Document) -> Self {
        let field = |id: &str| {
            doc.element_by_id(id)
                .map(|node| doc.text_content(node))
                .filter(|text| !text.is_empty())
        };

        let status = field("status");
        let message = field("message");
        let upload_id = field("uploadId");
        let list_item = doc
            .element_by_id("listItem")
            .map(|node| html::inner_html(doc, node))
            .unwrap_or_default();

        match (status, message, upload_id) {
            (Some(status), Some(message), Some(upload_id)) => Self::Valid(UploadResponse {
                status: UploadStatus::parse(&status),
                message,
                upload_id,
                list_item,
            }),
            (_, _, upload_id) => Self::Malformed { upload_id },
        }
    }

    pub fn from_markup(markup: &str) -> Result<Self> {
        let doc = frame_document(markup)?;
        Ok(Self::from_document(&doc))
    }
}

fn frame_document(markup: &str) -> Result<Document> {
    let mut doc = Document::new();
    let body = doc.body();
    for node in html::parse_fragment(&mut doc, markup)? {
        doc.append_child(body, node);
    }
    Ok(doc)
}

/// 一次进行中的上传
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub id: UploadId,
    pub file_name: String,
    /// 弱引用：分支被收起后句柄失效，结果不再插入
    pub target_branch: Option<NodeId>,
}

/// 隐藏框架及其内部文档
#[derive(Debug)]
pub(crate) struct HiddenFrame {
    pub(crate) name: String,
    pub(crate) content: Document,
}

/// 等待下一轮执行的提交
pub(crate) struct PendingSubmit {
    pub(crate) frame: NodeId,
    pub(crate) form: NodeId,
    pub(crate) wrapper: NodeId,
    pub(crate) session: UploadSession,
}

impl UploadSubmission {
    fn from_form(doc: &Document, form: NodeId) -> Self {
        let inputs = doc.find_descendants(form, |d, n| d.is_element(n, "input"));
        let fields = inputs
            .iter()
            .filter(|n| doc.attr(**n, "type") != Some("file"))
            .filter_map(|n| {
                let name = doc.attr(*n, "name")?;
                Some((name.to_string(), doc.attr(*n, "value").unwrap_or_default().to_string()))
            })
            .collect();
        let file = inputs
            .iter()
            .find_map(|n| doc.selected_file(*n))
            .cloned();

        Self {
            action: doc.attr(form, "action").unwrap_or_default().to_string(),
            fields,
            file,
        }
    }
}

fn is_file_input(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node, "input") && doc.attr(node, "type") == Some("file")
}

fn anchor_text(doc: &Document, item: NodeId) -> String {
    let anchor = doc
        .find_descendant(item, |d, n| d.is_element(n, "a"))
        .unwrap_or(item);
    doc.text_content(anchor).to_lowercase()
}

impl BucketList {
    /// 把分支里的 `.upload a` 包进 `div.bucketload`，叠上真正的文件控件
    pub(crate) fn attach_upload_affordance(&mut self, branch_root: NodeId, path: &EncodedPath) {
        let Some(link) = self.doc.find_descendant(branch_root, |d, n| {
            d.is_element(n, "a") && d.parent(n).is_some_and(|p| d.has_class(p, "upload"))
        }) else {
            return;
        };

        let doc = &mut self.doc;
        let wrapper = doc.create_element("div");
        doc.set_attr(wrapper, "class", "bucketload");
        doc.insert_before(link, wrapper);
        doc.append_child(wrapper, link);

        self.create_file_input(wrapper);

        let doc = &mut self.doc;
        let hidden = doc.create_element("input");
        doc.set_attr(hidden, "type", "hidden");
        doc.set_attr(hidden, "name", "path");
        doc.set_attr(hidden, "value", path.as_str());
        doc.append_child(wrapper, hidden);

        if doc.is_element(link, "a") {
            doc.listen(link, EventKind::Click);
        }
        doc.listen(wrapper, EventKind::MouseMove);
    }

    fn create_file_input(&mut self, wrapper: NodeId) {
        let doc = &mut self.doc;
        let input = doc.create_element("input");
        doc.set_attr(input, "name", "file");
        doc.set_attr(input, "type", "file");
        doc.append_child(wrapper, input);
        doc.listen(input, EventKind::Change);
    }

    /// 鼠标在包装层内移动时，让文件按钮始终位于指针下方
    pub fn mouse_moved(&mut self, wrapper: NodeId, page_x: f64, page_y: f64) -> Result<()> {
        self.ensure_alive(wrapper)?;
        if !self.doc.is_listening(wrapper, EventKind::MouseMove) {
            return Ok(());
        }
        let Some(file) = self.doc.find_descendant(wrapper, is_file_input) else {
            return Ok(());
        };
        let (Some(offset), Some(button)) = (self.doc.layout(wrapper), self.doc.layout(file)) else {
            return Ok(());
        };

        let left = page_x - offset.left - (button.width - FILE_BUTTON_OFFSET);
        let top = page_y - offset.top - button.height / 2.0;
        self.doc.set_style(file, "left", format!("{left}px"));
        self.doc.set_style(file, "top", format!("{top}px"));
        Ok(())
    }

    /// 文件控件的 change 事件：建立会话、生成表单和隐藏框架，
    /// 真正的提交推迟到下一轮。未绑定的控件返回 `None`。
    pub fn file_selected(&mut self, input: NodeId, file: SelectedFile) -> Result<Option<UploadId>> {
        self.ensure_alive(input)?;
        if !self.doc.is_listening(input, EventKind::Change) {
            return Ok(None);
        }
        let Some(wrapper) = self
            .doc
            .parent(input)
            .filter(|p| self.doc.has_class(*p, "bucketload"))
        else {
            return Ok(None);
        };

        // 1. 会话
        let id = UploadId::generate();
        let path = self
            .doc
            .find_descendant(wrapper, |d, n| {
                d.is_element(n, "input") && d.attr(n, "name") == Some("path")
            })
            .and_then(|n| self.doc.attr(n, "value"))
            .unwrap_or_default()
            .to_string();
        let target_branch = self.doc.closest(wrapper, |d, n| {
            d.is_element(n, "ul") && d.has_class(n, "bucketlist-tree")
        });
        let session = UploadSession {
            id,
            file_name: file.name.clone(),
            target_branch,
        };

        // 2. 表单；先解绑 change 再移入
        let doc = &mut self.doc;
        let form = doc.create_element("form");
        doc.set_attr(form, "accept-charset", "utf-8");
        doc.set_attr(form, "action", self.config.upload_form_action.as_str());
        doc.set_attr(form, "enctype", "multipart/form-data");
        doc.set_attr(form, "method", "post");
        for (name, value) in [("path", path), ("upload_id", id.to_string())] {
            let field = doc.create_element("input");
            doc.set_attr(field, "type", "hidden");
            doc.set_attr(field, "name", name);
            doc.set_attr(field, "value", value);
            doc.append_child(form, field);
        }
        doc.unlisten(input, EventKind::Change);
        doc.set_selected_file(input, file);
        doc.append_child(form, input);

        // 3. 隐藏框架
        let name = format!("bucketload-iframe-{id}");
        let frame = doc.create_element("iframe");
        doc.set_attr(frame, "id", name.as_str());
        doc.set_attr(frame, "name", name.as_str());
        doc.set_hidden(frame, true);
        let body = doc.body();
        doc.append_child(body, frame);
        self.frames.insert(
            frame,
            HiddenFrame {
                name,
                content: Document::new(),
            },
        );

        // 4. 等框架进入文档后再提交
        self.deferred.push_back(Deferred::SubmitUpload(PendingSubmit {
            frame,
            form,
            wrapper,
            session,
        }));
        Ok(Some(id))
    }

    pub(crate) fn submit_upload(&mut self, pending: PendingSubmit) {
        let PendingSubmit {
            frame,
            form,
            wrapper,
            session,
        } = pending;

        let Some(state) = self.frames.get_mut(&frame) else {
            warn!(upload_id = %session.id, "upload frame vanished before submit");
            self.doc.remove(form);
            return;
        };

        let content = &mut state.content;
        let body = content.body();
        if let Some(copy) = content.import(&self.doc, form) {
            content.append_child(body, copy);
        }
        self.doc.remove(form);
        debug!(frame = %state.name, contents = %html::inner_html(content, body), "created upload frame");

        let Some(injected) = content.find_descendant(body, |d, n| d.is_element(n, "form")) else {
            return;
        };
        let submission = UploadSubmission::from_form(content, injected);
        self.commands
            .push_back(Command::SubmitUpload { frame, submission });

        // 5. 监听响应，登记会话，换上新的文件控件
        self.doc.listen(frame, EventKind::Load);
        let start = UploadStart {
            file_name: session.file_name.clone(),
            id: session.id,
        };
        info!(upload_id = %session.id, file = %session.file_name, "upload submitted");
        self.uploads.insert(session.id, session);
        if self.doc.contains(wrapper) {
            self.create_file_input(wrapper);
        }
        self.callbacks.upload_start(start);
    }

    /// 隐藏框架的 load 事件。`content` 是新加载的文档；
    /// 跳转到清理地址后再次触发时为 `None`。
    pub fn frame_loaded(&mut self, frame: NodeId, content: Option<&str>) -> Result<()> {
        if !self.frames.contains_key(&frame) {
            return Err(BucketListError::UnknownFrame(frame));
        }
        if !self.doc.is_listening(frame, EventKind::Load) {
            debug!(frame = ?frame, "load before submit, ignored");
            return Ok(());
        }

        // 第二轮：清理
        if self
            .doc
            .attr(frame, "src")
            .is_some_and(|src| src.starts_with("javascript:"))
        {
            self.doc.unlisten(frame, EventKind::Load);
            self.doc.remove(frame);
            self.frames.remove(&frame);
            return Ok(());
        }

        let outcome = match content.map(frame_document).transpose() {
            Ok(loaded) => {
                let Some(state) = self.frames.get_mut(&frame) else {
                    return Err(BucketListError::UnknownFrame(frame));
                };
                if let Some(doc) = loaded {
                    state.content = doc;
                }
                let body = state.content.body();
                debug!(frame = %state.name, contents = %html::inner_html(&state.content, body), "upload frame loaded");
                ResponseOutcome::from_document(&state.content)
            }
            Err(e) => {
                warn!(frame = ?frame, error = %e, "unparseable upload response");
                ResponseOutcome::Malformed { upload_id: None }
            }
        };
        self.resolve_upload(outcome);

        self.doc.set_attr(frame, "src", SENTINEL_URL);
        self.commands.push_back(Command::NavigateFrame {
            frame,
            url: SENTINEL_URL.to_string(),
        });
        Ok(())
    }

    fn resolve_upload(&mut self, outcome: ResponseOutcome) {
        match outcome {
            ResponseOutcome::Malformed { upload_id } => {
                warn!(upload_id = ?upload_id, "malformed upload response");
                if let Some(id) = upload_id.as_deref().and_then(|raw| raw.parse().ok()) {
                    self.uploads.remove(&id);
                }
                self.callbacks.upload_failure(UploadOutcome {
                    list_item: String::new(),
                    message: String::new(),
                    status: UploadStatus::Failure,
                    upload_id: upload_id.unwrap_or_default(),
                });
            }
            ResponseOutcome::Valid(response) => {
                let params = UploadOutcome {
                    list_item: response.list_item.clone(),
                    message: response.message,
                    status: response.status,
                    upload_id: response.upload_id.clone(),
                };
                match response.status {
                    UploadStatus::Success => {
                        info!(upload_id = %params.upload_id, "upload succeeded");
                        self.callbacks.upload_success(params)
                    }
                    UploadStatus::Failure => {
                        info!(upload_id = %params.upload_id, message = %params.message, "upload failed");
                        self.callbacks.upload_failure(params)
                    }
                }

                let session = response
                    .upload_id
                    .parse::<UploadId>()
                    .ok()
                    .and_then(|id| self.uploads.remove(&id));
                let Some(session) = session else {
                    debug!(upload_id = %response.upload_id, "no session for response");
                    return;
                };
                if response.list_item.is_empty() {
                    return;
                }
                match session.target_branch.filter(|b| self.doc.contains(*b)) {
                    Some(branch) => self.insert_list_item(branch, &response.list_item),
                    None => debug!(upload_id = %session.id, "target branch no longer rendered"),
                }
            }
        }
    }

    /// 按文件名（不区分大小写，逐字符比较）插入到分支的文件项之间
    fn insert_list_item(&mut self, branch: NodeId, markup: &str) {
        let nodes = html::parse_fragment(&mut self.doc, markup).unwrap_or_else(|e| {
            warn!(error = %e, "unparseable list item");
            Vec::new()
        });
        let mut item = None;
        for node in nodes {
            if item.is_none() && self.doc.tag(node).is_some() {
                item = Some(node);
            } else {
                self.doc.remove(node);
            }
        }
        let Some(item) = item else {
            return;
        };

        let key = anchor_text(&self.doc, item);
        let successor = self
            .doc
            .children(branch)
            .iter()
            .copied()
            .filter(|c| self.doc.is_element(*c, "li") && self.doc.has_class(*c, "file"))
            .find(|c| anchor_text(&self.doc, *c) > key);

        self.doc.set_hidden(item, true);
        match successor {
            Some(next) => self.doc.insert_before(next, item),
            None => self.doc.append_child(branch, item),
        }
        self.doc.animate(item, Animation::SlideDown(LIST_ITEM_SLIDE));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::rc::Rc;

    use super::*;
    use crate::callbacks::Callbacks;
    use crate::dom::Layout;
    use crate::html::{render_entry, render_upload_response, EntryKind, ListingEntry};
    use crate::widget::test_support::*;

    #[derive(Default)]
    struct Recorded {
        started: Vec<UploadStart>,
        succeeded: Vec<UploadOutcome>,
        failed: Vec<UploadOutcome>,
    }

    fn recording() -> (Callbacks, Rc<RefCell<Recorded>>) {
        let log = Rc::new(RefCell::new(Recorded::default()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let callbacks = Callbacks::new()
            .on_upload_start(move |p| a.borrow_mut().started.push(p))
            .on_upload_success(move |p| b.borrow_mut().succeeded.push(p))
            .on_upload_failure(move |p| c.borrow_mut().failed.push(p));
        (callbacks, log)
    }

    /// 根目录下展开 `dir`，其中已有 `files`
    fn expanded(dir: &str, files: &[&str], callbacks: Callbacks) -> BucketList {
        let mut widget = widget(config(), callbacks);
        let (ticket, _) = expect_fetch(&mut widget);
        widget
            .fetch_completed(ticket, Some(&listing(&[(dir, "bucket")], false)))
            .expect("根加载");

        widget.click(anchor_by_rel(&widget, dir)).expect("展开");
        let (ticket, _) = expect_fetch(&mut widget);
        let rels: Vec<(String, String)> = files
            .iter()
            .map(|f| (format!("{dir}{f}"), f.to_string()))
            .collect();
        let entries: Vec<(&str, &str)> = rels.iter().map(|(r, n)| (r.as_str(), n.as_str())).collect();
        widget
            .fetch_completed(ticket, Some(&listing(&entries, true)))
            .expect("分支加载");
        widget
    }

    /// 分支自己的上传入口（嵌套分支的入口也在它的子树里）
    fn file_input(widget: &BucketList, dir: &str) -> NodeId {
        let doc = widget.document();
        let wrapper = doc
            .find_descendant(item_of(widget, dir), |d, n| {
                d.has_class(n, "bucketload")
                    && d.find_descendant(n, |d, c| {
                        d.attr(c, "name") == Some("path") && d.attr(c, "value") == Some(dir)
                    })
                    .is_some()
            })
            .expect("上传入口");
        doc.find_descendant(wrapper, |d, n| {
            is_file_input(d, n) && d.is_listening(n, EventKind::Change)
        })
        .expect("文件控件")
    }

    fn chosen(name: &str) -> SelectedFile {
        SelectedFile {
            name: name.into(),
            path: PathBuf::from(format!("/tmp/{name}")),
        }
    }

    /// 选择文件并执行延迟提交，返回 (id, frame)
    fn start_upload(widget: &mut BucketList, dir: &str, name: &str) -> (UploadId, NodeId) {
        let input = file_input(widget, dir);
        let id = widget
            .file_selected(input, chosen(name))
            .expect("控件有效")
            .expect("已绑定");
        assert_eq!(widget.run_deferred(), 1);
        match widget.next_command() {
            Some(Command::SubmitUpload { frame, .. }) => (id, frame),
            other => panic!("期望上传提交，实际为 {other:?}"),
        }
    }

    fn success_response(id: &str, dir: &str, name: &str) -> String {
        let item = render_entry(&ListingEntry {
            name: name.into(),
            rel: EncodedPath::new(format!("{dir}{name}")),
            kind: EntryKind::File,
            size: None,
        });
        render_upload_response(UploadStatus::Success, "uploaded", id, Some(&item))
    }

    fn file_names(widget: &BucketList, dir: &str) -> Vec<String> {
        let doc = widget.document();
        let item = item_of(widget, dir);
        let branch = doc
            .children(item)
            .iter()
            .copied()
            .find(|c| doc.is_element(*c, "ul"))
            .expect("分支");
        doc.children(branch)
            .iter()
            .filter(|c| doc.has_class(**c, "file"))
            .map(|c| anchor_text(doc, *c))
            .collect()
    }

    fn respond(widget: &mut BucketList, frame: NodeId, markup: &str) {
        widget.frame_loaded(frame, Some(markup)).expect("框架有效");
        match widget.next_command() {
            Some(Command::NavigateFrame { frame: f, url }) => {
                assert_eq!(f, frame);
                assert_eq!(url, SENTINEL_URL);
            }
            other => panic!("期望清理跳转，实际为 {other:?}"),
        }
        widget.frame_loaded(frame, None).expect("框架有效");
    }

    #[test]
    fn upload_ids_are_unique() {
        let ids: HashSet<UploadId> = (0..10_000).map(|_| UploadId::generate()).collect();
        assert_eq!(ids.len(), 10_000);

        let id = UploadId::generate();
        assert_eq!(id.to_string().parse::<UploadId>().ok(), Some(id));
    }

    #[test]
    fn affordance_wraps_the_upload_link() {
        let widget = expanded("b%2F", &[], Callbacks::new());
        let doc = widget.document();
        let item = item_of(&widget, "b%2F");

        let wrapper = doc
            .find_descendant(item, |d, n| d.has_class(n, "bucketload"))
            .expect("包装层");
        let upload_li = doc.parent(wrapper).expect("li.upload");
        assert!(doc.has_class(upload_li, "upload"));

        let children = doc.children(wrapper).to_vec();
        assert!(doc.is_element(children[0], "a"));
        assert!(doc.is_listening(children[0], EventKind::Click));
        assert!(is_file_input(doc, children[1]));
        assert_eq!(doc.attr(children[2], "name"), Some("path"));
        assert_eq!(doc.attr(children[2], "value"), Some("b%2F"));
        assert!(doc.is_listening(wrapper, EventKind::MouseMove));
    }

    #[test]
    fn upload_link_click_is_suppressed() -> Result<()> {
        let mut widget = expanded("b%2F", &[], Callbacks::new());
        let link = widget
            .document()
            .find_descendant(widget.root(), |d, n| {
                d.is_element(n, "a") && d.parent(n).is_some_and(|p| d.has_class(p, "bucketload"))
            })
            .expect("上传链接");

        assert_eq!(widget.click(link)?, crate::tree::ClickOutcome::Suppressed);
        assert!(widget.next_command().is_none());
        Ok(())
    }

    #[test]
    fn mouse_move_keeps_the_button_under_the_pointer() -> Result<()> {
        let mut widget = expanded("b%2F", &[], Callbacks::new());
        let input = file_input(&widget, "b%2F");
        let wrapper = widget.document().parent(input).expect("包装层");

        // 没有布局信息时什么也不做
        widget.mouse_moved(wrapper, 10.0, 10.0)?;
        assert_eq!(widget.document().style(input, "left"), None);

        let doc = widget.document_mut();
        doc.set_layout(wrapper, Layout { left: 100.0, top: 50.0, width: 80.0, height: 20.0 });
        doc.set_layout(input, Layout { left: 0.0, top: 0.0, width: 220.0, height: 24.0 });
        widget.mouse_moved(wrapper, 150.0, 60.0)?;

        assert_eq!(widget.document().style(input, "left"), Some("-140px"));
        assert_eq!(widget.document().style(input, "top"), Some("-2px"));
        Ok(())
    }

    #[test]
    fn selecting_a_file_defers_the_submit() -> Result<()> {
        let (callbacks, log) = recording();
        let mut widget = expanded("b%2F", &[], callbacks);
        let input = file_input(&widget, "b%2F");

        let id = widget.file_selected(input, chosen("photo.jpg"))?.expect("已绑定");

        // 同步阶段：表单与框架已建立，但尚未提交
        assert!(widget.next_command().is_none());
        assert!(!widget.has_session(id));
        assert!(log.borrow().started.is_empty());
        assert!(!widget.document().is_listening(input, EventKind::Change));
        let frame = widget
            .document()
            .element_by_id(&format!("bucketload-iframe-{id}"))
            .expect("隐藏框架");
        assert!(widget.document().is_hidden(frame));

        // 下一轮
        assert_eq!(widget.run_deferred(), 1);
        match widget.next_command() {
            Some(Command::SubmitUpload { frame: f, submission }) => {
                assert_eq!(f, frame);
                assert_eq!(submission.action, "/upload");
                assert_eq!(
                    submission.fields,
                    vec![
                        ("path".to_string(), "b%2F".to_string()),
                        ("upload_id".to_string(), id.to_string()),
                    ]
                );
                assert_eq!(submission.file, Some(chosen("photo.jpg")));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(widget.has_session(id));
        assert!(widget.document().is_listening(frame, EventKind::Load));
        assert!(!widget.document().contains(input), "旧控件已移入框架");
        assert_eq!(log.borrow().started, vec![UploadStart { file_name: "photo.jpg".into(), id }]);

        // 换上了新的控件，可以立刻开始下一次上传
        let fresh = file_input(&widget, "b%2F");
        assert_ne!(fresh, input);
        Ok(())
    }

    #[test]
    fn unbound_inputs_are_ignored() -> Result<()> {
        let mut widget = expanded("b%2F", &[], Callbacks::new());
        let doc = widget.document_mut();
        let loose = doc.create_element("input");
        doc.set_attr(loose, "type", "file");

        assert_eq!(widget.file_selected(loose, chosen("x.txt"))?, None);
        Ok(())
    }

    #[test]
    fn successful_upload_inserts_alphabetically() {
        for (name, expected) in [
            ("banana", vec!["apple", "banana", "cherry"]),
            ("Aardvark", vec!["aardvark", "apple", "cherry"]),
            ("zebra", vec!["apple", "cherry", "zebra"]),
        ] {
            let (callbacks, log) = recording();
            let mut widget = expanded("b%2F", &["Apple", "cherry"], callbacks);
            let (id, frame) = start_upload(&mut widget, "b%2F", name);

            respond(&mut widget, frame, &success_response(&id.to_string(), "b%2F", name));

            assert_eq!(file_names(&widget, "b%2F"), expected);
            assert_eq!(log.borrow().succeeded.len(), 1);
            assert_eq!(log.borrow().succeeded[0].status, UploadStatus::Success);
            assert_eq!(log.borrow().succeeded[0].message, "uploaded");
            assert!(!widget.has_session(id));
            assert!(widget
                .document()
                .animations()
                .iter()
                .any(|(_, a)| *a == Animation::SlideDown(LIST_ITEM_SLIDE)));
        }
    }

    #[test]
    fn first_file_in_an_empty_branch_is_appended() {
        let mut widget = expanded("b%2F", &[], Callbacks::new());
        let (id, frame) = start_upload(&mut widget, "b%2F", "only.txt");

        respond(&mut widget, frame, &success_response(&id.to_string(), "b%2F", "only.txt"));

        assert_eq!(file_names(&widget, "b%2F"), vec!["only.txt"]);
        let inserted = anchor_by_rel(&widget, "b%2Fonly.txt");
        assert_eq!(widget.document().attr(inserted, "rel"), Some("b%2Fonly.txt"));
    }

    #[test]
    fn responses_only_touch_their_own_session() {
        let mut widget = expanded("b%2F", &["m.txt"], Callbacks::new());
        let (a, frame_a) = start_upload(&mut widget, "b%2F", "a.txt");
        let (b, frame_b) = start_upload(&mut widget, "b%2F", "z.txt");
        assert_ne!(a, b);

        // B 先完成
        respond(&mut widget, frame_b, &success_response(&b.to_string(), "b%2F", "z.txt"));
        assert!(widget.has_session(a));
        assert!(!widget.has_session(b));
        assert_eq!(file_names(&widget, "b%2F"), vec!["m.txt", "z.txt"]);

        respond(&mut widget, frame_a, &success_response(&a.to_string(), "b%2F", "a.txt"));
        assert_eq!(widget.pending_uploads(), 0);
        assert_eq!(file_names(&widget, "b%2F"), vec!["a.txt", "m.txt", "z.txt"]);
    }

    #[test]
    fn nested_branch_response_leaves_the_outer_branch_alone() -> Result<()> {
        let mut widget = widget(config(), Callbacks::new());
        let (ticket, _) = expect_fetch(&mut widget);
        widget.fetch_completed(ticket, Some(&listing(&[("b%2F", "b")], false)))?;
        widget.click(anchor_by_rel(&widget, "b%2F"))?;
        let (ticket, _) = expect_fetch(&mut widget);
        widget.fetch_completed(
            ticket,
            Some(&listing(&[("b%2Fsub%2F", "sub"), ("b%2Fm.txt", "m.txt")], true)),
        )?;
        widget.click(anchor_by_rel(&widget, "b%2Fsub%2F"))?;
        let (ticket, _) = expect_fetch(&mut widget);
        widget.fetch_completed(ticket, Some(&listing(&[("b%2Fsub%2Fs.txt", "s.txt")], true)))?;

        let outer_children = |widget: &BucketList| {
            let doc = widget.document();
            let item = item_of(widget, "b%2F");
            let branch = doc
                .children(item)
                .iter()
                .copied()
                .find(|c| doc.is_element(*c, "ul"))
                .expect("分支");
            doc.children(branch).to_vec()
        };
        let before = outer_children(&widget);

        let (a, frame_a) = start_upload(&mut widget, "b%2F", "a.txt");
        let (b, frame_b) = start_upload(&mut widget, "b%2Fsub%2F", "t.txt");

        // 内层 B 先完成
        respond(&mut widget, frame_b, &success_response(&b.to_string(), "b%2Fsub%2F", "t.txt"));
        assert!(widget.has_session(a));
        assert!(!widget.has_session(b));
        assert_eq!(outer_children(&widget), before, "外层分支不应被改动");
        assert_eq!(file_names(&widget, "b%2F"), vec!["m.txt"]);
        assert_eq!(file_names(&widget, "b%2Fsub%2F"), vec!["s.txt", "t.txt"]);

        respond(&mut widget, frame_a, &success_response(&a.to_string(), "b%2F", "a.txt"));
        assert_eq!(widget.pending_uploads(), 0);
        assert_eq!(file_names(&widget, "b%2F"), vec!["a.txt", "m.txt"]);
        assert_eq!(file_names(&widget, "b%2Fsub%2F"), vec!["s.txt", "t.txt"]);
        Ok(())
    }

    #[test]
    fn blank_message_is_still_a_valid_response() {
        let (callbacks, log) = recording();
        let mut widget = expanded("b%2F", &[], callbacks);
        let (id, frame) = start_upload(&mut widget, "b%2F", "x.txt");

        let markup = format!(
            r#"<p id="status">success</p><p id="message"> </p><p id="uploadId">{id}</p>"#
        );
        respond(&mut widget, frame, &markup);

        let log = log.borrow();
        assert!(log.failed.is_empty());
        assert_eq!(log.succeeded.len(), 1);
        assert_eq!(log.succeeded[0].message, " ");
        assert!(!widget.has_session(id));
    }

    #[test]
    fn messages_are_passed_through_untrimmed() {
        let (callbacks, log) = recording();
        let mut widget = expanded("b%2F", &[], callbacks);
        let (id, frame) = start_upload(&mut widget, "b%2F", "x.txt");

        let markup =
            render_upload_response(UploadStatus::Failure, "  quota exceeded ", &id.to_string(), None);
        respond(&mut widget, frame, &markup);

        let log = log.borrow();
        assert_eq!(log.failed.len(), 1);
        assert_eq!(log.failed[0].message, "  quota exceeded ");
        assert_eq!(log.failed[0].upload_id, id.to_string());
    }

    #[test]
    fn duplicate_response_does_not_insert_twice() {
        let (callbacks, log) = recording();
        let mut widget = expanded("b%2F", &[], callbacks);
        let (id, frame) = start_upload(&mut widget, "b%2F", "dup.txt");
        let markup = success_response(&id.to_string(), "b%2F", "dup.txt");

        widget.frame_loaded(frame, Some(&markup)).expect("框架有效");
        widget.next_command();
        // 同一个 id 的第二份响应（在清理之前又加载了一次）
        widget.document_mut().set_attr(frame, "src", "about:blank");
        widget.frame_loaded(frame, Some(&markup)).expect("框架有效");

        assert_eq!(file_names(&widget, "b%2F"), vec!["dup.txt"]);
        assert_eq!(log.borrow().succeeded.len(), 2);
    }

    #[test]
    fn missing_upload_id_is_a_failure_with_empty_fields() {
        let (callbacks, log) = recording();
        let mut widget = expanded("b%2F", &[], callbacks);
        let (id, frame) = start_upload(&mut widget, "b%2F", "x.txt");

        let markup = r#"<html><body><p id="status">success</p><p id="message">fine</p><ul id="listItem"><li class="file"><a rel="b%2Fx.txt">x.txt</a></li></ul></body></html>"#;
        respond(&mut widget, frame, markup);

        let log = log.borrow();
        assert!(log.succeeded.is_empty());
        assert_eq!(log.failed.len(), 1);
        assert_eq!(log.failed[0].status, UploadStatus::Failure);
        assert_eq!(log.failed[0].message, "");
        assert_eq!(log.failed[0].list_item, "");
        assert!(file_names(&widget, "b%2F").is_empty());
        // 无法关联的会话保持未决
        assert!(widget.has_session(id));
    }

    #[test]
    fn malformed_response_with_an_id_still_resolves_the_session() {
        let (callbacks, log) = recording();
        let mut widget = expanded("b%2F", &[], callbacks);
        let (id, frame) = start_upload(&mut widget, "b%2F", "x.txt");

        let markup = format!(r#"<p id="status">success</p><p id="uploadId">{id}</p>"#);
        respond(&mut widget, frame, &markup);

        assert!(!widget.has_session(id));
        assert_eq!(log.borrow().failed[0].upload_id, id.to_string());
        assert_eq!(log.borrow().failed[0].message, "");
    }

    #[test]
    fn failure_status_is_reported_and_nothing_inserted_without_item() {
        let (callbacks, log) = recording();
        let mut widget = expanded("b%2F", &[], callbacks);
        let (id, frame) = start_upload(&mut widget, "b%2F", "big.iso");

        let markup = render_upload_response(UploadStatus::Failure, "too slow", &id.to_string(), None);
        respond(&mut widget, frame, &markup);

        let log = log.borrow();
        assert_eq!(log.failed.len(), 1);
        assert_eq!(log.failed[0].message, "too slow");
        assert!(!widget.has_session(id));
        assert!(file_names(&widget, "b%2F").is_empty());
    }

    #[test]
    fn cleanup_pass_removes_the_frame() {
        let mut widget = expanded("b%2F", &[], Callbacks::new());
        let (id, frame) = start_upload(&mut widget, "b%2F", "x.txt");

        respond(&mut widget, frame, &success_response(&id.to_string(), "b%2F", "x.txt"));

        assert!(!widget.document().contains(frame));
        assert!(widget.frames.is_empty());
        assert!(matches!(
            widget.frame_loaded(frame, None),
            Err(BucketListError::UnknownFrame(_))
        ));
    }

    #[test]
    fn collapsed_branch_is_not_resurrected_by_a_late_response() {
        let mut widget = expanded("b%2F", &[], Callbacks::new());
        let (id, frame) = start_upload(&mut widget, "b%2F", "late.txt");

        widget.click(anchor_by_rel(&widget, "b%2F")).expect("收起");
        respond(&mut widget, frame, &success_response(&id.to_string(), "b%2F", "late.txt"));

        assert!(!widget.has_session(id));
        let doc = widget.document();
        assert!(doc
            .find_descendant(doc.body(), |d, n| d.attr(n, "rel") == Some("b%2Flate.txt"))
            .is_none());
    }

    #[test]
    fn response_parser_requires_all_three_fields() -> Result<()> {
        let valid = ResponseOutcome::from_markup(
            r#"<p id="status">failure</p><p id="message">denied</p><p id="uploadId">7</p>"#,
        )?;
        assert_eq!(
            valid,
            ResponseOutcome::Valid(UploadResponse {
                status: UploadStatus::Failure,
                message: "denied".into(),
                upload_id: "7".into(),
                list_item: String::new(),
            })
        );

        let empty_message = ResponseOutcome::from_markup(
            r#"<p id="status">success</p><p id="message"></p><p id="uploadId">7</p>"#,
        )?;
        assert_eq!(empty_message, ResponseOutcome::Malformed { upload_id: Some("7".into()) });

        assert_eq!(
            ResponseOutcome::from_markup("")?,
            ResponseOutcome::Malformed { upload_id: None }
        );
        Ok(())
    }
}
