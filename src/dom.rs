//! 轻量文档模型：以 arena 存放元素，`NodeId` 作为弱句柄。
//!
//! 节点被移除后其槽位不会复用，旧句柄会稳定地失效，
//! 因此 `NodeId` 可以安全地保存在上传会话表里。

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// 控制器会监听的事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    Change,
    MouseMove,
    Load,
}

/// 记录下来的可视过渡，由宿主决定如何真正渲染
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    Show,
    SlideDown(Duration),
    SlideUp(Duration),
    FadeOut,
}

/// 宿主提供的布局信息（页面坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// 文件选择控件中用户选中的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    hidden: bool,
    style: BTreeMap<String, String>,
    layout: Option<Layout>,
    file: Option<SelectedFile>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            hidden: false,
            style: BTreeMap::new(),
            layout: None,
            file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Option<Node>>,
    body: NodeId,
    listeners: HashSet<(NodeId, EventKind)>,
    animations: Vec<(NodeId, Animation)>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            body: NodeId(0),
            listeners: HashSet::new(),
            animations: Vec::new(),
        };
        doc.body = doc.create_element("body");
        doc
    }

    /// 挂载组件用的页面：`body > div.bucketlist > p.initial-load`，
    /// 返回文档和组件根节点
    pub fn with_placeholder(loading_text: &str) -> (Self, NodeId) {
        let mut doc = Self::new();
        let root = doc.create_element("div");
        doc.set_attr(root, "class", "bucketlist");
        let placeholder = doc.create_element("p");
        doc.set_attr(placeholder, "class", "initial-load");
        let text = doc.create_text(loading_text);
        doc.append_child(placeholder, text);
        doc.append_child(root, placeholder);
        let body = doc.body();
        doc.append_child(body, root);
        (doc, root)
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.insert(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.insert(NodeData::Text(text.into()))
    }

    fn insert(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Some(Node::new(data)));
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// 句柄是否仍然有效（未被移除）
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// 节点是否挂在 body 之下
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.closest(id, |_, n| n == self.body).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match self.node(id).map(|n| &n.data) {
            Some(NodeData::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(NodeData::Element { attrs, .. }) = self.node_mut(id).map(|n| &mut n.data) {
            match attrs.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value,
                None => attrs.push((name.to_string(), value)),
            }
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.tag(id).is_none() || self.has_class(id, class) {
            return;
        }
        let classes = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", classes);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if !self.has_class(id, class) {
            return;
        }
        let classes = self
            .attr(id, "class")
            .unwrap_or_default()
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(id, "class", classes);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or_default()
    }

    /// 将 `child` 追加到 `parent` 末尾；若已有父节点则先移出
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
    }

    /// 将 `node` 作为兄弟节点插入到 `reference` 之前
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        if reference == node || !self.contains(node) {
            return;
        }
        let Some(parent) = self.parent(reference) else {
            return;
        };
        self.detach(node);
        let Some(position) = self.children(parent).iter().position(|c| *c == reference) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.insert(position, node);
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = Some(parent);
        }
    }

    /// 从父节点移出，但保留节点本身
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
    }

    /// 移除节点及其整棵子树，所有相关句柄随之失效
    pub fn remove(&mut self, id: NodeId) {
        if id == self.body || !self.contains(id) {
            return;
        }
        self.detach(id);
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));
        for node in doomed {
            self.nodes[node.0] = None;
            self.listeners.retain(|(n, _)| *n != node);
        }
    }

    /// 先序遍历的全部后代（不含自身）
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    pub fn find_descendants<F>(&self, id: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.descendants(id)
            .into_iter()
            .filter(|n| predicate(self, *n))
            .collect()
    }

    pub fn find_descendant<F>(&self, id: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.descendants(id).into_iter().find(|n| predicate(self, *n))
    }

    /// 从自身开始向上查找第一个满足条件的节点
    pub fn closest<F>(&self, id: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        let mut current = self.contains(id).then_some(id);
        while let Some(node) = current {
            if predicate(self, node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.find_descendant(self.body, |doc, n| doc.attr(n, "id") == Some(element_id))
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeData::Text(text)) = self.node(id).map(|n| &n.data) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let Some(NodeData::Text(text)) = self.node(node).map(|n| &n.data) {
                out.push_str(text);
            }
        }
        out
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.hidden)
    }

    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        if let Some(node) = self.node_mut(id) {
            node.hidden = hidden;
        }
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.node(id)?.style.get(property).map(String::as_str)
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: impl Into<String>) {
        if let Some(node) = self.node_mut(id) {
            node.style.insert(property.to_string(), value.into());
        }
    }

    pub fn layout(&self, id: NodeId) -> Option<Layout> {
        self.node(id)?.layout
    }

    pub fn set_layout(&mut self, id: NodeId, layout: Layout) {
        if let Some(node) = self.node_mut(id) {
            node.layout = Some(layout);
        }
    }

    pub fn selected_file(&self, id: NodeId) -> Option<&SelectedFile> {
        self.node(id)?.file.as_ref()
    }

    pub fn set_selected_file(&mut self, id: NodeId, file: SelectedFile) {
        if let Some(node) = self.node_mut(id) {
            node.file = Some(file);
        }
    }

    pub fn listen(&mut self, id: NodeId, kind: EventKind) {
        if self.contains(id) {
            self.listeners.insert((id, kind));
        }
    }

    pub fn unlisten(&mut self, id: NodeId, kind: EventKind) {
        self.listeners.remove(&(id, kind));
    }

    pub fn is_listening(&self, id: NodeId, kind: EventKind) -> bool {
        self.listeners.contains(&(id, kind))
    }

    /// 记录过渡效果并立即应用其最终可见性
    pub fn animate(&mut self, id: NodeId, animation: Animation) {
        if !self.contains(id) {
            return;
        }
        let hidden = matches!(animation, Animation::SlideUp(_) | Animation::FadeOut);
        self.set_hidden(id, hidden);
        self.animations.push((id, animation));
    }

    pub fn animations(&self) -> &[(NodeId, Animation)] {
        &self.animations
    }

    pub fn take_animations(&mut self) -> Vec<(NodeId, Animation)> {
        std::mem::take(&mut self.animations)
    }

    /// 把另一个文档中的子树复制进来，返回新的（游离的）根节点。
    /// 事件监听不随之复制。
    pub fn import(&mut self, source: &Document, id: NodeId) -> Option<NodeId> {
        let node = source.node(id)?;
        let copy = self.insert(node.data.clone());
        if let Some(target) = self.node_mut(copy) {
            target.hidden = node.hidden;
            target.style = node.style.clone();
            target.layout = node.layout;
            target.file = node.file.clone();
        }
        for child in &node.children {
            if let Some(child_copy) = self.import(source, *child) {
                self.append_child(copy, child_copy);
            }
        }
        Some(copy)
    }
}
