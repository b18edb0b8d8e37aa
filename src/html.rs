use std::borrow::Cow;

use humansize::{format_size, BINARY};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::path::EncodedPath;
use crate::upload::UploadStatus;

/// 没有结束标签的元素
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn is_void(tag: Option<&str>) -> bool {
    tag.is_some_and(|t| VOID_ELEMENTS.contains(&t))
}

/// 解析 HTML 片段，返回游离的顶层节点（尚未挂到任何父节点）。
///
/// 解析是宽松的：允许不闭合的空元素和错配的结束标签；
/// 无法识别的实体按原文保留。文本按原样保留，只丢弃元素之间
/// 纯空白的文本；元素唯一的内容是空白时保留。
///
/// 底层是 XML 分词器，只覆盖目录片段和上传响应用到的子集：
/// 可省略的结束标签不会自动闭合（`<li>a<li>b` 会嵌套），
/// `<script>`/`<style>` 内容也不会被当作原始文本。
pub fn parse_fragment(doc: &mut Document, markup: &str) -> Result<Vec<NodeId>> {
    let mut reader = Reader::from_str(markup);
    reader.check_end_names(false);

    let mut roots = Vec::new();
    let mut open: Vec<NodeId> = Vec::new();
    // 纯空白文本先挂起，等下一个事件再决定去留
    let mut blank: Option<String> = None;

    loop {
        let event = reader.read_event()?;
        if let Some(text) = blank.take() {
            let sole_content = matches!(event, Event::End(_))
                && open.last().is_some_and(|n| doc.children(*n).is_empty());
            if sole_content {
                let node = doc.create_text(text);
                attach(doc, &mut roots, &open, node);
            }
        }

        match event {
            Event::Start(start) => {
                let node = element_from(doc, &start)?;
                attach(doc, &mut roots, &open, node);
                if !is_void(doc.tag(node)) {
                    open.push(node);
                }
            }
            Event::Empty(start) => {
                let node = element_from(doc, &start)?;
                attach(doc, &mut roots, &open, node);
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                if let Some(pos) = open.iter().rposition(|n| doc.tag(*n) == Some(name.as_str())) {
                    open.truncate(pos);
                }
            }
            Event::Text(text) => {
                let content = text
                    .unescape_with(html_entity)
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                if content.trim_matches(|c: char| c.is_ascii_whitespace()).is_empty() {
                    blank = Some(content).filter(|c| !c.is_empty());
                } else {
                    let node = doc.create_text(content);
                    attach(doc, &mut roots, &open, node);
                }
            }
            Event::CData(data) => {
                let node = doc.create_text(String::from_utf8_lossy(&data).into_owned());
                attach(doc, &mut roots, &open, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(roots)
}

fn element_from(doc: &mut Document, start: &BytesStart<'_>) -> Result<NodeId> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    let node = doc.create_element(&tag);

    for attr in start.html_attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = attr
            .unescape_value_with(html_entity)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        if key == "style" && hides(&value) {
            doc.set_hidden(node, true);
        }
        doc.set_attr(node, &key, value);
    }

    Ok(node)
}

/// XML 之外常见的 HTML 命名实体
fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "copy" => Some("\u{a9}"),
        "hellip" => Some("\u{2026}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        _ => None,
    }
}

fn hides(style: &str) -> bool {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .any(|(prop, value)| prop.trim() == "display" && value.trim() == "none")
}

fn attach(doc: &mut Document, roots: &mut Vec<NodeId>, open: &[NodeId], node: NodeId) {
    match open.last() {
        Some(parent) => doc.append_child(*parent, node),
        None => roots.push(node),
    }
}

/// 序列化节点的全部子节点
pub fn inner_html(doc: &Document, node: NodeId) -> String {
    doc.children(node)
        .iter()
        .map(|child| outer_html(doc, *child))
        .collect()
}

pub fn outer_html(doc: &Document, node: NodeId) -> String {
    let Some(tag) = doc.tag(node) else {
        return doc
            .text(node)
            .map(|t| html_escape::encode_text(t).into_owned())
            .unwrap_or_default();
    };

    let mut out = format!("<{tag}");
    for (key, value) in doc.attrs(node) {
        out.push_str(&format!(
            " {}=\"{}\"",
            key,
            html_escape::encode_double_quoted_attribute(value)
        ));
    }
    out.push('>');
    if is_void(Some(tag)) {
        return out;
    }
    out.push_str(&inner_html(doc, node));
    out.push_str(&format!("</{tag}>"));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub rel: EncodedPath,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

/// 生成单个列表项，上传成功时也作为 `listItem` 返回
pub fn render_entry(entry: &ListingEntry) -> String {
    let name = html_escape::encode_text(&entry.name);
    let rel = html_escape::encode_double_quoted_attribute(entry.rel.as_str());

    match entry.kind {
        EntryKind::Directory => format!(
            r##"<li class="directory collapsed"><a href="#" rel="{rel}">{name}</a></li>"##
        ),
        EntryKind::File => {
            let ext = entry
                .name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            let ext = html_escape::encode_double_quoted_attribute(&ext);
            let size = entry
                .size
                .map(|s| format!(r#"<span class="size">{}</span>"#, format_size(s, BINARY)))
                .unwrap_or_default();
            format!(r##"<li class="file ext_{ext}"><a href="#" rel="{rel}">{name}</a>{size}</li>"##)
        }
    }
}

/// 生成一个分支：隐藏的 `ul`，由客户端负责展开
pub fn render_listing(entries: &[ListingEntry], upload_label: Option<&str>) -> String {
    let mut items: Vec<String> = entries.iter().map(render_entry).collect();

    if let Some(label) = upload_label {
        items.push(format!(
            r##"<li class="upload"><a href="#">{}</a></li>"##,
            html_escape::encode_text(label)
        ));
    }

    format!(
        r#"<ul class="bucketlist-tree" style="display: none;">{}</ul>"#,
        items.join("")
    )
}

/// 上传结果文档，在隐藏框架中加载
pub fn render_upload_response(
    status: UploadStatus,
    message: &str,
    upload_id: &str,
    list_item: Option<&str>,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>upload</title></head>
<body>
<p id="status">{}</p>
<p id="message">{}</p>
<p id="uploadId">{}</p>
<ul id="listItem">{}</ul>
</body>
</html>"#,
        status,
        html_escape::encode_text(message),
        html_escape::encode_text(upload_id),
        list_item.unwrap_or_default()
    )
}
