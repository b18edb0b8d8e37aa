//! 目录树：展开/收起、目录请求、片段合并以及初始文件的自动展开。

use std::time::Duration;

use tracing::{debug, warn};

use crate::callbacks::{BranchLoad, FileClick};
use crate::dom::{Animation, Document, EventKind, NodeId};
use crate::error::{BucketListError, Result};
use crate::html;
use crate::path::EncodedPath;
use crate::widget::{BucketList, Command, FetchTicket, PendingFetch};

/// 分支展开/收起的动画时长
pub const BRANCH_SLIDE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    Collapsed,
    Loading,
    Expanded,
}

/// 一次点击的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// 收起的目录开始加载
    Expanded,
    Collapsed,
    FileClicked,
    /// 上传按钮的默认行为被屏蔽
    Suppressed,
    Ignored,
}

fn is_branch_list(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node, "ul")
}

impl BucketList {
    /// 委托点击入口：只处理根节点内 `li > a` 形式的树项
    pub fn click(&mut self, target: NodeId) -> Result<ClickOutcome> {
        self.ensure_alive(target)?;

        if self.doc.is_listening(target, EventKind::Click) {
            return Ok(ClickOutcome::Suppressed);
        }
        if !self.doc.is_listening(self.root, EventKind::Click) || !self.is_tree_anchor(target) {
            return Ok(ClickOutcome::Ignored);
        }

        Ok(self.tree_click(target))
    }

    fn is_tree_anchor(&self, target: NodeId) -> bool {
        let doc = &self.doc;
        doc.is_element(target, "a")
            && doc.parent(target).is_some_and(|p| doc.is_element(p, "li"))
            && doc.closest(target, |_, n| n == self.root).is_some()
    }

    pub fn directory_state(&self, item: NodeId) -> Option<DirectoryState> {
        let doc = &self.doc;
        if !doc.has_class(item, "directory") {
            return None;
        }
        Some(if doc.has_class(item, "collapsed") {
            DirectoryState::Collapsed
        } else if doc.has_class(item, "wait") {
            DirectoryState::Loading
        } else {
            DirectoryState::Expanded
        })
    }

    pub(crate) fn tree_click(&mut self, target: NodeId) -> ClickOutcome {
        let Some(item) = self.doc.parent(target) else {
            return ClickOutcome::Ignored;
        };
        let rel = EncodedPath::new(self.doc.attr(target, "rel").unwrap_or_default());

        if !self.doc.has_class(item, "directory") {
            self.callbacks.file_click(FileClick {
                node: target,
                file_name: rel,
            });
            return ClickOutcome::FileClicked;
        }

        if self.doc.has_class(item, "collapsed") {
            // 同一列表里只允许一个分支展开
            if let Some(list) = self.doc.parent(item) {
                let open = self.doc.find_descendants(list, |d, n| {
                    d.has_class(n, "directory") && !d.has_class(n, "collapsed")
                });
                for directory in open {
                    self.collapse(directory);
                }
            }
            self.discard_branches(item);
            self.show_tree(item, rel);
            self.doc.remove_class(item, "collapsed");
            self.doc.add_class(item, "expanded");
            ClickOutcome::Expanded
        } else {
            self.collapse(item);
            ClickOutcome::Collapsed
        }
    }

    fn collapse(&mut self, item: NodeId) {
        for list in self.branch_lists(item) {
            self.doc.animate(list, Animation::SlideUp(BRANCH_SLIDE));
        }
        self.discard_branches(item);
        self.loading.remove(&item);
        self.doc.remove_class(item, "wait");
        self.doc.remove_class(item, "expanded");
        self.doc.add_class(item, "collapsed");
    }

    fn branch_lists(&self, item: NodeId) -> Vec<NodeId> {
        self.doc
            .children(item)
            .iter()
            .copied()
            .filter(|c| is_branch_list(&self.doc, *c))
            .collect()
    }

    fn discard_branches(&mut self, item: NodeId) {
        for list in self.branch_lists(item) {
            self.doc.remove(list);
        }
    }

    /// 发出目录请求。路径只在这里解码，且只用于请求参数。
    pub(crate) fn show_tree(&mut self, node: NodeId, path: EncodedPath) {
        let dir = path.decode();
        self.doc.add_class(node, "wait");

        let ticket = self.issue_ticket();
        self.loading.insert(node, ticket);
        self.fetches.insert(ticket, PendingFetch { node, path });
        self.commands.push_back(Command::FetchListing {
            ticket,
            url: self.config.ajax_script_url.clone(),
            dir,
        });
    }

    /// 目录请求完成；`response` 为 `None` 表示请求失败
    pub fn fetch_completed(&mut self, ticket: FetchTicket, response: Option<&str>) -> Result<()> {
        let PendingFetch { node, path } = self
            .fetches
            .remove(&ticket)
            .ok_or(BucketListError::UnknownTicket(ticket))?;
        let current = self.loading.get(&node) == Some(&ticket);

        let Some(fragment) = response else {
            warn!(ticket = %ticket, path = %path, "directory listing failed");
            if current {
                self.loading.remove(&node);
                self.doc.remove_class(node, "wait");
            }
            return Ok(());
        };

        self.dismiss_initial_load();

        if !current || !self.doc.contains(node) || self.doc.has_class(node, "collapsed") {
            debug!(ticket = %ticket, path = %path, "dropping stale listing");
            return Ok(());
        }
        self.loading.remove(&node);
        self.doc.remove_class(node, "wait");

        let inserted = html::parse_fragment(&mut self.doc, fragment).unwrap_or_else(|e| {
            warn!(path = %path, error = %e, "unparseable listing fragment");
            Vec::new()
        });
        for child in inserted {
            self.doc.append_child(node, child);
        }

        let hidden = self
            .doc
            .find_descendants(node, |d, n| is_branch_list(d, n) && d.is_hidden(n));
        if path.is_root() {
            for list in hidden {
                self.doc.animate(list, Animation::Show);
            }
        } else {
            for list in hidden {
                self.doc.animate(list, Animation::SlideDown(BRANCH_SLIDE));
            }
            self.attach_upload_affordance(node, &path);
            self.callbacks.branch_load(BranchLoad {
                node,
                encoded_path: path,
            });
        }

        self.continue_auto_navigation();
        Ok(())
    }

    /// 首个完成的请求移除“加载中”提示，只发生一次
    fn dismiss_initial_load(&mut self) {
        if !self.initial_load {
            return;
        }
        self.initial_load = false;

        let placeholders = self
            .doc
            .find_descendants(self.root, |d, n| d.has_class(n, "initial-load"));
        for placeholder in placeholders {
            self.doc.animate(placeholder, Animation::FadeOut);
            self.doc.remove(placeholder);
        }
    }

    fn continue_auto_navigation(&mut self) {
        let Some(target) = self.auto_nav.as_ref().and_then(|nav| nav.current_target()) else {
            return;
        };

        let found = self
            .doc
            .find_descendant(self.root, |d, n| d.attr(n, "rel") == Some(target.as_str()));
        match found {
            Some(anchor) => {
                debug!(rel = %target, "auto-navigating");
                self.tree_click(anchor);
                if let Some(nav) = self.auto_nav.as_mut() {
                    nav.advance();
                }
            }
            None => {
                debug!(rel = %target, "initial file not in tree, giving up");
                if let Some(nav) = self.auto_nav.as_mut() {
                    nav.abandon();
                }
            }
        }
    }

    /// 当前可见树的文本轮廓，目录以 `/` 结尾，展开的目录带 `-`，收起的带 `+`
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_into(self.root, 0, &mut out);
        out
    }

    fn outline_into(&self, node: NodeId, depth: usize, out: &mut String) {
        let doc = &self.doc;
        for child in doc.children(node) {
            if is_branch_list(doc, *child) {
                self.outline_into(*child, depth, out);
                continue;
            }
            if !doc.is_element(*child, "li") || doc.has_class(*child, "upload") {
                continue;
            }
            let Some(anchor) = doc.find_descendant(*child, |d, n| d.is_element(n, "a")) else {
                continue;
            };
            let name = doc.text_content(anchor);
            let line = match self.directory_state(*child) {
                Some(DirectoryState::Collapsed) => format!("+ {name}/"),
                Some(_) => format!("- {name}/"),
                None => format!("  {name}"),
            };
            out.push_str(&"  ".repeat(depth));
            out.push_str(&line);
            out.push('\n');
            self.outline_into(*child, depth + 1, out);
        }
    }
}
