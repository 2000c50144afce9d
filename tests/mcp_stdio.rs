use std::path::{Path, PathBuf};

use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;
use wordbank::{
    DataDir,
    Dictionary,
    model::{NewDefinition, NewEntry, NewExample, NewTerm},
};

fn setup_fixture(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = DataDir::resolve(Some(data_dir))?;
    let dict = Dictionary::open(&data_dir)?;

    dict.create_entry(&NewEntry {
        term: NewTerm::new("akoro").with_pos("verb"),
        definitions: vec![NewDefinition::new("to cultivate")],
        examples: vec![NewExample::new("Akoro ekile", "The man digs")],
        ..NewEntry::default()
    })?;
    dict.create_entry(&NewEntry {
        term: NewTerm::new("akoroit").with_pos("noun"),
        definitions: vec![NewDefinition::new("cultivation")],
        ..NewEntry::default()
    })?;

    // The server process opens the same database; release it first.
    drop(dict);
    Ok(())
}

#[tokio::test]
async fn mcp_stdio_search_roundtrip() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let bin = wordbank_bin()?;
    let transport = TokioChildProcess::new(
        tokio::process::Command::new(bin).configure(|cmd| {
            cmd.arg("mcp")
                .env("WORDBANK_DATA_DIR", tempdir.path())
                .env("WORDBANK_LOG", "warn");
        }),
    )?;

    let client = ().serve(transport).await?;

    let tools = client.peer().list_all_tools().await?;
    let names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
    assert!(names.iter().any(|n| n == "dictionary_search"));
    assert!(names.iter().any(|n| n == "dictionary_get_word"));

    let args = json!({
        "q": "akoro",
        "perPage": 10
    });

    let result = client
        .peer()
        .call_tool(CallToolRequestParams::new("dictionary_search").with_arguments(args.as_object().unwrap().clone()))
        .await?;

    let structured = result.structured_content.expect("structured content");
    let results = structured
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].get("word").and_then(|v| v.as_str()), Some("akoro"));
    assert_eq!(results[0].get("rank").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        results[1].get("word").and_then(|v| v.as_str()),
        Some("akoroit")
    );
    assert_eq!(results[1].get("rank").and_then(|v| v.as_u64()), Some(1));

    let get_args = json!({ "slug": "akoro" });
    let get_result = client
        .peer()
        .call_tool(CallToolRequestParams::new("dictionary_get_word").with_arguments(get_args.as_object().unwrap().clone()))
        .await?;
    let entry = get_result.structured_content.expect("structured content");
    assert_eq!(entry["word"], "akoro");
    assert_eq!(entry["definitions"][0]["definition_text"], "to cultivate");
    assert_eq!(entry["examples"][0]["target_text"], "The man digs");

    let summary = get_result
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.clone())
        .unwrap_or_default();
    assert!(summary.contains("1. to cultivate"));

    client.cancel().await?;
    Ok(())
}

fn wordbank_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_wordbank") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("wordbank");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
