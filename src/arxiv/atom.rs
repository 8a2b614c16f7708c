//! arXiv Atom feed 解析

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate};
use quick_xml::Reader;
use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use super::{PaperRecord, normalize_paper_id};

/// 单个 entry 的累积状态
#[derive(Default)]
struct EntryAccum {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_url: Option<String>,
}

impl EntryAccum {
    fn into_paper(self) -> Option<PaperRecord> {
        // arXiv 对非法查询返回一个 id 指向 /api/errors 的伪 entry
        if self.id.is_empty() || self.title.is_empty() || self.id.contains("/api/errors") {
            return None;
        }
        let id = normalize_paper_id(&self.id);
        Some(PaperRecord {
            url: format!("https://arxiv.org/abs/{}", id),
            id,
            title: normalize_whitespace(&self.title),
            authors: self
                .authors
                .iter()
                .map(|a| normalize_whitespace(a))
                .filter(|a| !a.is_empty())
                .collect(),
            published: parse_published(&self.published),
            abstract_text: normalize_whitespace(&self.summary),
            categories: self.categories,
            pdf_url: self.pdf_url,
        })
    }

    fn push_text(&mut self, tag: &str, text: &str, in_author: bool) {
        match tag {
            "id" => self.id.push_str(text),
            "title" => self.title.push_str(text),
            "summary" => self.summary.push_str(text),
            "published" => self.published.push_str(text),
            "name" if in_author => {
                if let Some(last) = self.authors.last_mut() {
                    last.push_str(text);
                }
            }
            _ => {}
        }
    }

    fn handle_link_or_category(&mut self, tag: &str, attrs: Attributes) {
        match tag {
            "link" => {
                if let Some(href) = pdf_href(attrs) {
                    self.pdf_url = Some(href);
                }
            }
            "category" => {
                if let Some(term) = attribute(attrs, "term")
                    && !self.categories.contains(&term)
                {
                    self.categories.push(term);
                }
            }
            _ => {}
        }
    }
}

fn attribute(attrs: Attributes, wanted: &str) -> Option<String> {
    attrs.flatten().find_map(|attr| {
        (attr.key.as_ref() == wanted.as_bytes())
            .then(|| String::from_utf8_lossy(&attr.value).to_string())
    })
}

fn pdf_href(attrs: Attributes) -> Option<String> {
    let mut href = String::new();
    let mut is_pdf = false;
    for attr in attrs.flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref());
        let val = String::from_utf8_lossy(&attr.value);
        if key == "title" && val == "pdf" {
            is_pdf = true;
        }
        if key == "href" {
            href = val.to_string();
        }
    }
    (is_pdf && !href.is_empty()).then_some(href)
}

/// Atom 状态机
#[derive(Default)]
struct AtomParser {
    papers: Vec<PaperRecord>,
    accum: EntryAccum,
    current_tag: String,
    in_entry: bool,
    in_author: bool,
}

impl AtomParser {
    fn handle_start(&mut self, e: &BytesStart<'_>) {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        match tag.as_str() {
            "entry" => {
                self.in_entry = true;
                self.accum = EntryAccum::default();
            }
            "author" if self.in_entry => {
                self.in_author = true;
                self.accum.authors.push(String::new());
            }
            "link" | "category" if self.in_entry => {
                self.accum.handle_link_or_category(&tag, e.attributes())
            }
            _ if self.in_entry => self.current_tag = tag.clone(),
            _ => {}
        }
    }

    fn handle_empty(&mut self, e: &BytesStart<'_>) {
        if !self.in_entry {
            return;
        }
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        self.accum.handle_link_or_category(&tag, e.attributes());
    }

    fn handle_text(&mut self, e: &BytesText<'_>) -> Result<()> {
        if !self.in_entry || self.current_tag.is_empty() {
            return Ok(());
        }
        let text = e.unescape()?;
        self.accum
            .push_text(&self.current_tag, &text, self.in_author);
        Ok(())
    }

    fn handle_end(&mut self, e: &BytesEnd<'_>) {
        let name = e.name();
        let tag = String::from_utf8_lossy(name.as_ref());
        match tag.as_ref() {
            "entry" => {
                let finished = std::mem::take(&mut self.accum);
                if let Some(paper) = finished.into_paper() {
                    self.papers.push(paper);
                }
                self.in_entry = false;
                self.current_tag.clear();
            }
            "author" => self.in_author = false,
            _ => self.current_tag.clear(),
        }
    }
}

/// 将 arXiv Atom feed 解析为论文列表，保持 feed 中的顺序
pub fn parse_atom_feed(xml: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    let mut parser = AtomParser::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => parser.handle_start(e),
            Ok(Event::Empty(ref e)) => parser.handle_empty(e),
            Ok(Event::Text(ref e)) => parser.handle_text(e)?,
            Ok(Event::End(ref e)) => parser.handle_end(e),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "malformed Atom feed at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
    }

    Ok(parser.papers)
}

fn parse_published(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
