use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    dictionary::Dictionary,
    error,
    query_plan::SearchRequest,
    search::SearchPage,
};

#[derive(Clone)]
pub struct WordbankMcpServer {
    dictionary: Arc<Dictionary>,
    tool_router: ToolRouter<Self>,
}

impl WordbankMcpServer {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl WordbankMcpServer {
    /// Search headwords and definitions.
    #[tool(
        name = "dictionary_search",
        description = "Search the dictionary. Exact headword matches come first, then headwords starting with the query, then entries whose definitions match. An empty query lists entries alphabetically. Filter with letter and pos; paginate with page and perPage."
    )]
    pub async fn dictionary_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let req = SearchRequest {
            q: params.q.unwrap_or_default(),
            letter: params.letter.unwrap_or_default(),
            pos: params.pos.unwrap_or_default(),
            page: params.page,
            per_page: params.per_page,
        };

        let page = self
            .dictionary
            .search(&req)
            .map_err(|e| mcp_error("search failed", e))?;

        let summary = format_search_summary(&page, &req.q);
        structured(summary, &page)
    }

    /// Fetch one entry in full.
    #[tool(
        name = "dictionary_get_word",
        description = "Get a dictionary entry by slug, with its definitions, examples, cross-references and sub-entries."
    )]
    pub async fn dictionary_get_word(
        &self,
        params: Parameters<GetWordParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let detail = self
            .dictionary
            .get_word(&params.0.slug)
            .map_err(|e| mcp_error("lookup failed", e))?;

        let mut summary = format!("{} ({})", detail.entry.term.word, detail.url);
        for (i, def) in detail.entry.definitions.iter().enumerate() {
            summary.push_str(&format!("\n{}. {}", i + 1, def.definition_text));
        }
        structured(summary, &detail)
    }

    #[tool(
        name = "dictionary_letter_counts",
        description = "Number of top-level entries for each letter A to Z."
    )]
    pub async fn dictionary_letter_counts(
        &self,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let counts = self
            .dictionary
            .get_letter_counts()
            .map_err(|e| mcp_error("letter counts failed", e))?;

        let summary = counts
            .iter()
            .map(|(letter, n)| format!("{letter}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        structured(summary, &counts)
    }

    #[tool(
        name = "dictionary_word_of_the_day",
        description = "The featured word of the day with its first definition."
    )]
    pub async fn dictionary_word_of_the_day(
        &self,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let word = self
            .dictionary
            .word_of_the_day()
            .map_err(|e| mcp_error("word of the day failed", e))?
            .ok_or_else(|| {
                rmcp::ErrorData::resource_not_found(
                    "no word of the day is available",
                    None,
                )
            })?;

        let summary = format!("{}: {}", word.word, word.definition_preview);
        structured(summary, &word)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for WordbankMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("wordbank", env!("CARGO_PKG_VERSION"))
                    .with_title("wordbank MCP"),
            )
            .with_instructions(
                "Use dictionary_search to find words by headword or meaning, then dictionary_get_word with a result's slug for the full entry.",
            )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Query text; empty lists entries alphabetically.
    pub q: Option<String>,
    /// Restrict to headwords starting with this letter.
    pub letter: Option<String>,
    /// Restrict to a part of speech (e.g. "noun").
    pub pos: Option<String>,
    /// 1-based page number (default: 1).
    pub page: Option<u32>,
    /// Results per page, 1 to 100 (default: 20).
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetWordParams {
    /// Entry slug, e.g. "akoro" or "ba-2".
    pub slug: String,
}

fn structured(
    summary: String,
    value: &impl Serialize,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let structured = serde_json::to_value(value)
        .map_err(|e| {
            mcp_error("failed to serialize result", error::Error::from(e))
        })?;

    let mut result = CallToolResult::success(vec![Content::text(summary)]);
    result.structured_content = Some(structured);
    Ok(result)
}

fn format_search_summary(page: &SearchPage, query: &str) -> String {
    if page.results.is_empty() {
        return if query.trim().is_empty() {
            "No entries found".to_string()
        } else {
            format!("No results found for \"{query}\"")
        };
    }

    let mut lines = Vec::with_capacity(page.results.len() + 1);
    lines.push(format!(
        "Page {}/{} of {} result(s):",
        page.current_page, page.pages, page.total
    ));
    for row in &page.results {
        lines.push(format!("{} {}: {}", row.slug, row.word, row.definition_preview));
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: error::Error) -> rmcp::ErrorData {
    let data = Some(json!({ "error": error.to_string() }));
    match error.status() {
        400 => rmcp::ErrorData::invalid_params(error.to_string(), data),
        404 => rmcp::ErrorData::resource_not_found(error.to_string(), data),
        _ => rmcp::ErrorData::internal_error(message.to_string(), data),
    }
}

pub fn run_mcp(dictionary: Dictionary) -> error::Result<()> {
    let server = WordbankMcpServer::new(Arc::new(dictionary));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_dir::DataDir,
        model::{NewDefinition, NewEntry, NewTerm},
    };

    fn server() -> (tempfile::TempDir, WordbankMcpServer) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let dict = Dictionary::open(&data_dir).unwrap();
        dict.create_entry(&NewEntry {
            term: NewTerm::new("akoro").with_pos("verb"),
            definitions: vec![NewDefinition::new("to cultivate")],
            ..NewEntry::default()
        })
        .unwrap();
        (tmp, WordbankMcpServer::new(Arc::new(dict)))
    }

    #[tokio::test]
    async fn search_tool_returns_structured_results() {
        let (_tmp, server) = server();

        let params = SearchParams {
            q: Some("akoro".into()),
            ..SearchParams::default()
        };
        let result = server.dictionary_search(Parameters(params)).await.unwrap();

        let structured = result.structured_content.expect("structured");
        let results = structured
            .get("results")
            .and_then(|v| v.as_array())
            .expect("results array");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("slug").and_then(|v| v.as_str()), Some("akoro"));
        assert_eq!(results[0].get("rank").and_then(|v| v.as_u64()), Some(0));
        assert_eq!(structured.get("total").and_then(|v| v.as_u64()), Some(1));

        let summary = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        assert!(summary.contains("akoro"));
    }

    #[tokio::test]
    async fn search_tool_rejects_bad_page_size() {
        let (_tmp, server) = server();
        let params = SearchParams {
            per_page: Some(0),
            ..SearchParams::default()
        };
        let err = server
            .dictionary_search(Parameters(params))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn get_word_tool() {
        let (_tmp, server) = server();

        let result = server
            .dictionary_get_word(Parameters(GetWordParams {
                slug: "akoro".into(),
            }))
            .await
            .unwrap();
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["word"], "akoro");
        assert_eq!(structured["url"], "/dictionary/akoro/");
        assert_eq!(structured["definitions"][0]["definition_text"], "to cultivate");

        let err = server
            .dictionary_get_word(Parameters(GetWordParams {
                slug: "missing".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn letter_counts_and_word_of_the_day() {
        let (_tmp, server) = server();

        let counts = server.dictionary_letter_counts().await.unwrap();
        let structured = counts.structured_content.unwrap();
        assert_eq!(structured["A"], 1);
        assert_eq!(structured["Z"], 0);

        let wotd = server.dictionary_word_of_the_day().await.unwrap();
        assert_eq!(wotd.structured_content.unwrap()["word"], "akoro");
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(
            &self,
            _serializer: S,
        ) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot encode"))
        }
    }

    #[test]
    fn serialization_failure_is_an_internal_error() {
        let err = structured("summary".into(), &Unserializable).unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
        assert_eq!(err.message, "failed to serialize result");
        let data = err.data.unwrap();
        assert!(data["error"].as_str().unwrap().contains("cannot encode"));
    }
}
