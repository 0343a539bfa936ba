//! Loading and searching the report

use super::NO_DOCUMENT_LOADED;
use crate::document::{DocumentLoader, DocumentState, LoadedDocument, SEARCH_RESULTS};
use agent_llm::tools::schema;
use agent_tools::{Tool, params};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Reads a report file into the conversation
pub struct LoadDocumentTool {
    loader: Arc<dyn DocumentLoader>,
}

impl LoadDocumentTool {
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl Tool<DocumentState> for LoadDocumentTool {
    async fn execute(&self, params: Value, state: &mut DocumentState) -> agent_tools::Result<String> {
        let path = params::required_str(&params, "path")?;

        let text = match self.loader.load_text(Path::new(path)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path, error = %e, "Document load failed");
                return Ok(format!("加载文件失败: {e}。请确认文件路径正确且文件未损坏。"));
            }
        };
        if text.trim().is_empty() {
            return Ok(format!("文件 {path} 中没有可读取的文本"));
        }

        let document = state.load(LoadedDocument::new(path, text));
        Ok(format!(
            "成功加载文件 {path}\n- 字符数: {}\n- 文本块数: {}\n已建立检索索引，可以开始查询分析财务数据。",
            document.text.chars().count(),
            document.chunks().len()
        ))
    }

    fn name(&self) -> &str {
        "load_document"
    }

    fn description(&self) -> &str {
        "Load a financial report file (PDF or text) so it can be searched and analysed"
    }

    fn input_schema(&self) -> Value {
        schema::object(&[("path", schema::string("Path of the report file"))], &["path"])
    }
}

/// Returns the passages most related to a query
pub struct SearchDocumentTool;

#[async_trait]
impl Tool<DocumentState> for SearchDocumentTool {
    async fn execute(&self, params: Value, state: &mut DocumentState) -> agent_tools::Result<String> {
        let query = params::required_str(&params, "query")?;
        let Some(document) = state.document() else {
            return Ok(NO_DOCUMENT_LOADED.to_string());
        };

        let hits = document.search(query, SEARCH_RESULTS);
        if hits.is_empty() {
            return Ok(format!("未找到关于'{query}'的相关信息"));
        }

        let mut out = format!("关于'{query}'的相关信息：\n\n");
        for (i, hit) in hits.iter().enumerate() {
            let _ = write!(out, "片段 {}:\n{hit}\n\n{}\n\n", i + 1, "=".repeat(50));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "search_document"
    }

    fn description(&self) -> &str {
        "Search the loaded report for passages about a topic, e.g. 营业收入 or 资产负债表"
    }

    fn input_schema(&self) -> Value {
        schema::object(&[("query", schema::string("What to look for"))], &["query"])
    }
}
