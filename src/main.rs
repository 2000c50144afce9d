use std::path::Path;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use wordbank::{
    DataDir,
    Dictionary,
    SearchRequest,
    cli::{Cli, Command, ConfigAction, ImportArgs, RandomArgs, SearchArgs},
    error,
    import,
    mcp,
    model::{NewEntry, TermPatch},
    search,
    settings::{SettingKey, Settings},
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("WORDBANK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let dict = Dictionary::open(&data_dir)?;
    let json = cli.json;

    match cli.command {
        Command::Search(args) => cmd_search(&dict, args, json)?,
        Command::Get { slug } => cmd_get(&dict, &slug, json)?,
        Command::Letters => {
            let counts = dict.get_letter_counts()?;
            if json {
                print_json(&counts)?;
            } else {
                for (letter, count) in &counts {
                    println!("{letter} {count}");
                }
            }
        }
        Command::Wotd { refresh } => {
            let word = if refresh {
                dict.refresh_word_of_the_day()?
            } else {
                dict.word_of_the_day()?
            };
            match (word, json) {
                (Some(w), true) => print_json(&w)?,
                (Some(w), false) => {
                    println!("{}  {}", w.word, w.url);
                    if !w.definition_preview.is_empty() {
                        println!("     {}", w.definition_preview);
                    }
                }
                (None, true) => println!("null"),
                (None, false) => println!("No word of the day available."),
            }
        }
        Command::Add { file } => {
            let entry: NewEntry = read_json(&file)?;
            let created = dict.create_entry(&entry)?;
            if json {
                print_json(&created)?;
            } else {
                println!(
                    "Created '{}' ({} definition(s)) -> {}",
                    created.term.word,
                    created.definitions.len(),
                    created.term.slug
                );
            }
        }
        Command::Update { slug, patch } => {
            let patch: TermPatch = read_json(&patch)?;
            let term = dict.term_by_slug(&slug)?;
            let updated = dict.update_term(term.id, &patch)?;
            if json {
                print_json(&updated)?;
            } else {
                println!("Updated '{}' -> {}", updated.word, updated.slug);
            }
        }
        Command::Delete { slug } => {
            let term = dict.term_by_slug(&slug)?;
            let removed = dict.delete_term(term.id)?;
            if json {
                print_json(&removed)?;
            } else {
                println!(
                    "Deleted '{}' and {} sub-entr{}",
                    term.word,
                    removed.len().saturating_sub(1),
                    if removed.len() == 2 { "y" } else { "ies" }
                );
            }
        }
        Command::Import(args) => cmd_import(&dict, &args, json)?,
        Command::Resolve => {
            let updated = dict.resolve_relations()?;
            if json {
                print_json(&serde_json::json!({ "updated": updated }))?;
            } else {
                println!("Resolved {updated} cross-reference(s).");
            }
        }
        Command::Rebuild => {
            let indexed = dict.rebuild_index()?;
            if json {
                print_json(&serde_json::json!({ "indexed": indexed }))?;
            } else {
                println!("Indexed {indexed} definition(s).");
            }
        }
        Command::Random(args) => cmd_random(&dict, &args, json)?,
        Command::Status => {
            let status = dict.status()?;
            if json {
                print_json(&status)?;
            } else {
                if let Some(dir) = &status.data_dir {
                    println!("Data directory: {}", dir.display());
                }
                if let Some(version) = status.schema_version {
                    println!("Schema version: {version}");
                }
                println!("Terms: {}", status.terms);
                println!("Indexed definitions: {}", status.indexed_definitions);
            }
        }
        Command::Config { action } => cmd_config(&dict, action, json)?,
        Command::Mcp => {
            mcp::run_mcp(dict)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_search(dict: &Dictionary, args: SearchArgs, json: bool) -> error::Result<()> {
    let req = SearchRequest {
        q: args.query,
        letter: args.letter,
        pos: args.pos,
        page: args.page,
        per_page: args.per_page,
    };
    let page = dict.search(&req)?;

    if json {
        print_json(&page)?;
    } else {
        search::format_human(&page);
    }
    Ok(())
}

fn cmd_get(dict: &Dictionary, slug: &str, json: bool) -> error::Result<()> {
    let detail = dict.get_word(slug)?;
    if json {
        return print_json(&detail);
    }

    let entry = &detail.entry;
    let term = &entry.term;
    let homonym = term
        .homonym_number
        .map(|n| format!(" ({n})"))
        .unwrap_or_default();
    println!("{}{homonym}  {}", term.word, detail.url);

    let mut grammar = Vec::new();
    if let Some(pos_detail) = term.pos_detail.as_deref().filter(|d| !d.is_empty())
    {
        grammar.push(pos_detail.to_string());
    } else if !term.pos.is_empty() {
        grammar.push(term.pos.clone());
    }
    if let Some(gender) = term.gender {
        grammar.push(gender.to_string());
    }
    if let Some(plural) = &term.plural {
        grammar.push(format!("pl. {plural}"));
    }
    if let Some(stem) = &term.verb_stem {
        grammar.push(format!("stem {stem}"));
    }
    if !grammar.is_empty() {
        println!("  {}", grammar.join("; "));
    }
    if let Some(dialect) = &term.dialect {
        println!("  dialect: {dialect}");
    }
    if let Some(labels) = &term.usage_labels {
        println!("  usage: {labels}");
    }

    for (i, def) in entry.definitions.iter().enumerate() {
        println!("  {}. {}", i + 1, def.definition_text);
    }
    for ex in &entry.examples {
        println!("     \"{}\" - {}", ex.source_text, ex.target_text);
    }
    for rel in &entry.relations {
        match &rel.target {
            Some(target) => println!(
                "  {}: {} (/{})",
                rel.relation.relation_type, target.word, target.slug
            ),
            None => println!(
                "  {}: {}",
                rel.relation.relation_type, rel.relation.related_word
            ),
        }
    }
    if !entry.sub_entries.is_empty() {
        println!("  sub-entries:");
        for sub in &entry.sub_entries {
            println!("    {} ({})", sub.word, sub.slug);
        }
    }
    Ok(())
}

fn cmd_import(dict: &Dictionary, args: &ImportArgs, json: bool) -> error::Result<()> {
    let trees = import::read_entries(&args.file)?;
    eprintln!("Importing {} entries from {}...", trees.len(), args.file.display());

    let report = dict.import(&trees, args.truncate)?;
    if json {
        print_json(&report)?;
    } else {
        println!("Imported {} term(s).", report.inserted);
        if !report.skipped.is_empty() {
            println!("Skipped {} duplicate slug(s):", report.skipped.len());
            for slug in &report.skipped {
                println!("  {slug}");
            }
        }
        println!("Resolved {} cross-reference(s).", report.relations_resolved);
        println!("Indexed {} definition(s).", report.definitions_indexed);
    }
    Ok(())
}

fn cmd_random(dict: &Dictionary, args: &RandomArgs, json: bool) -> error::Result<()> {
    let exclude = match &args.exclude {
        Some(slug) => Some(dict.term_by_slug(slug)?.id),
        None => None,
    };
    let terms = dict.random_terms(args.count, exclude)?;

    if json {
        print_json(&terms)?;
    } else if terms.is_empty() {
        println!("No entries.");
    } else {
        for t in &terms {
            println!("{}  {}", t.word, t.url);
        }
    }
    Ok(())
}

fn cmd_config(dict: &Dictionary, action: ConfigAction, json: bool) -> error::Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = dict.settings();
            if json {
                print_json(&settings)?;
            } else {
                let stored = Settings::stored(dict.store())?;
                for key in SettingKey::ALL {
                    let value = stored
                        .iter()
                        .find(|(name, _)| name == key.name())
                        .map(|(_, v)| v.as_str());
                    match value {
                        Some(v) => println!("{} = {v}", key.name()),
                        None => println!(
                            "{} = {} (default)",
                            key.name(),
                            key.default_value()
                        ),
                    }
                }
            }
        }
        ConfigAction::Set { key, value } => {
            dict.set_setting(key, &value)?;
            println!("Set {} = {}", key.name(), value.trim());
        }
        ConfigAction::Clear { key } => {
            if dict.clear_setting(key)? {
                println!("Cleared {} (now {})", key.name(), key.default_value());
            } else {
                println!("{} was not set", key.name());
            }
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> error::Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn print_json(value: &impl Serialize) -> error::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
