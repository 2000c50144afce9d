use wordbank::{
    DataDir,
    Dictionary,
    Error,
    SearchRequest,
    import,
    model::{NewDefinition, NewEntry, NewExample, NewRelation, NewTerm, TermPatch},
    query_plan::{self, SearchMode},
};

fn open_dict() -> (tempfile::TempDir, Dictionary) {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
    let dict = Dictionary::open(&data_dir).unwrap();
    (tmp, dict)
}

fn entry(word: &str, defs: &[&str]) -> NewEntry {
    NewEntry {
        term: NewTerm::new(word),
        definitions: defs.iter().map(|d| NewDefinition::new(*d)).collect(),
        ..NewEntry::default()
    }
}

fn words(dict: &Dictionary, req: &SearchRequest) -> Vec<String> {
    dict.search(req)
        .unwrap()
        .results
        .into_iter()
        .map(|r| r.word)
        .collect()
}

#[test]
fn akoro_end_to_end() {
    let (_tmp, dict) = open_dict();
    let mut akoro = entry("akoro", &["to cultivate"]);
    akoro.term = akoro.term.with_pos("noun");
    let created = dict.create_entry(&akoro).unwrap();
    assert_eq!(created.term.letter, "A");

    let page = dict.search(&SearchRequest::query("akoro")).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.results.len(), 1);
    let row = &page.results[0];
    assert_eq!(row.word, "akoro");
    assert_eq!(row.definition_preview, "to cultivate");
    assert_eq!(row.rank, Some(0));
}

#[test]
fn pagination_covers_every_result_once() {
    let (_tmp, dict) = open_dict();
    for i in 0..23 {
        dict.create_entry(&entry(&format!("ekal{i:02}"), &["a basket"]))
            .unwrap();
    }

    for per_page in [1u32, 5, 7, 10, 23, 100] {
        let first = dict
            .search(&SearchRequest {
                per_page: Some(per_page),
                ..SearchRequest::default()
            })
            .unwrap();
        assert_eq!(first.total, 23);
        assert_eq!(first.pages, 23u64.div_ceil(per_page as u64));

        let mut seen = Vec::new();
        for page in 1..=first.pages as u32 {
            let result = dict
                .search(&SearchRequest {
                    page: Some(page),
                    per_page: Some(per_page),
                    ..SearchRequest::default()
                })
                .unwrap();
            assert_eq!(result.current_page, page);
            seen.extend(result.results.into_iter().map(|r| r.id));
        }
        assert_eq!(seen.len() as u64, first.total);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 23);
    }
}

#[test]
fn page_past_the_end_is_empty() {
    let (_tmp, dict) = open_dict();
    dict.create_entry(&entry("aro", &["hill"])).unwrap();

    let page = dict
        .search(&SearchRequest {
            page: Some(5),
            ..SearchRequest::default()
        })
        .unwrap();
    assert!(page.results.is_empty());
    assert_eq!(page.total, 1);
    assert_eq!(page.pages, 1);
}

#[test]
fn exact_word_ranks_before_longer_word() {
    let (_tmp, dict) = open_dict();
    dict.create_entry(&entry("arobo", &["a kind of tree"])).unwrap();
    dict.create_entry(&entry("aro", &["hill"])).unwrap();
    dict.create_entry(&entry("ekile", &["man, see aro"])).unwrap();

    let found = words(&dict, &SearchRequest::query("aro"));
    assert_eq!(found[0], "aro");
    assert_eq!(found[1], "arobo");
    assert!(found.contains(&"ekile".to_string()));
}

#[test]
fn short_and_relevance_modes_agree_on_exact_word() {
    let (_tmp, dict) = open_dict();
    dict.create_entry(&entry("akor", &["to dig"])).unwrap();
    dict.create_entry(&entry("ekume", &["a cooking pot"])).unwrap();

    let short = SearchRequest::query("ako");
    let long = SearchRequest::query("akor");
    assert_eq!(query_plan::plan(&short).unwrap().mode, SearchMode::ShortQuery);
    assert_eq!(query_plan::plan(&long).unwrap().mode, SearchMode::Relevance);

    let short_page = dict.search(&short).unwrap();
    let long_page = dict.search(&long).unwrap();
    assert_eq!(short_page.results[0].word, "akor");
    assert_eq!(long_page.results[0].word, "akor");
    assert_eq!(short_page.results[0].id, long_page.results[0].id);
    assert_eq!(long_page.results[0].rank, Some(0));
}

#[test]
fn relevance_finds_stemmed_definitions() {
    let (_tmp, dict) = open_dict();
    dict.create_entry(&entry("akoro", &["to cultivate a field"])).unwrap();
    dict.create_entry(&entry("aro", &["hill"])).unwrap();

    let page = dict.search(&SearchRequest::query("cultivating")).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.results[0].word, "akoro");
    assert_eq!(page.results[0].rank, Some(2));
}

#[test]
fn no_match_is_an_empty_page() {
    let (_tmp, dict) = open_dict();
    dict.create_entry(&entry("aro", &["hill"])).unwrap();

    let page = dict.search(&SearchRequest::query("zzzz")).unwrap();
    assert!(page.results.is_empty());
    assert_eq!(page.total, 0);
}

#[test]
fn operator_only_queries_match_nothing() {
    let (_tmp, dict) = open_dict();
    dict.create_entry(&entry("akoro", &["to cultivate"])).unwrap();
    dict.create_entry(&entry("aro", &["hill"])).unwrap();
    dict.create_entry(&entry("ekile", &["man"])).unwrap();

    for q in ["****", "-xyzzy", "zzzz OR *"] {
        let page = dict.search(&SearchRequest::query(q)).unwrap();
        assert_eq!(page.total, 0, "query {q:?} matched {:?}", page.results);
    }
}

#[test]
fn invalid_parameters_are_rejected() {
    let (_tmp, dict) = open_dict();
    let bad_size = SearchRequest {
        per_page: Some(101),
        ..SearchRequest::default()
    };
    assert!(matches!(
        dict.search(&bad_size),
        Err(Error::InvalidParameter { .. })
    ));

    let bad_letter = SearchRequest {
        letter: "ab".into(),
        ..SearchRequest::default()
    };
    assert!(matches!(
        dict.search(&bad_letter),
        Err(Error::InvalidParameter { .. })
    ));
}

#[test]
fn resolve_relations_is_idempotent() {
    let (_tmp, dict) = open_dict();
    let mut akoro = entry("akoro", &["to cultivate"]);
    akoro.relations = vec![
        NewRelation::compare("ekoro"),
        NewRelation::compare("nowhere"),
    ];
    let akoro = dict.create_entry(&akoro).unwrap();
    let ekoro = dict.create_entry(&entry("ekoro", &["cultivation"])).unwrap();
    // A later homonym must not steal the link.
    dict.create_term(&NewTerm::new("ekoro").with_homonym(2)).unwrap();

    assert_eq!(dict.resolve_relations().unwrap(), 1);
    let once = dict.get_word(&akoro.term.slug).unwrap().entry.relations;

    assert_eq!(dict.resolve_relations().unwrap(), 0);
    let twice = dict.get_word(&akoro.term.slug).unwrap().entry.relations;

    assert_eq!(once, twice);
    let targets: Vec<_> =
        twice.iter().map(|r| r.relation.related_term_id).collect();
    assert_eq!(targets, vec![Some(ekoro.term.id), None]);
}

#[test]
fn cascade_delete_removes_every_descendant() {
    let (_tmp, dict) = open_dict();
    let parent = dict
        .create_entry(&NewEntry {
            term: NewTerm::new("akoro"),
            definitions: vec![
                NewDefinition::new("to cultivate"),
                NewDefinition::new("to dig"),
            ],
            examples: vec![
                NewExample::new("Akoro ekile", "The man digs"),
                NewExample::new("Akoro aberu", "The woman digs"),
                NewExample::new("Akoro ituan", "People dig"),
            ],
            relations: vec![NewRelation::compare("ekoro")],
        })
        .unwrap();
    let sub = dict
        .create_entry(&NewEntry {
            term: NewTerm::new("akoroit").with_parent(parent.term.id),
            definitions: vec![NewDefinition::new("digging")],
            ..NewEntry::default()
        })
        .unwrap();
    let other = dict.create_entry(&entry("aro", &["hill"])).unwrap();

    let store = dict.store();
    assert_eq!(store.all_definitions().unwrap().len(), 4);

    let removed = dict.delete_term(parent.term.id).unwrap();
    assert_eq!(removed, vec![parent.term.id, sub.term.id]);

    for id in [parent.term.id, sub.term.id] {
        assert!(matches!(store.find_by_id(id), Err(Error::NotFound { .. })));
        assert!(matches!(
            store.get_full_entry(id),
            Err(Error::NotFound { .. })
        ));
    }
    let remaining = store.all_definitions().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].term_id, other.term.id);
    assert_eq!(store.term_count().unwrap(), 1);

    assert!(dict.search(&SearchRequest::query("cultivate")).unwrap().results.is_empty());
    assert!(dict.search(&SearchRequest::query("digging")).unwrap().results.is_empty());
}

#[test]
fn search_finds_renamed_word() {
    let (_tmp, dict) = open_dict();
    let created = dict.create_entry(&entry("akoro", &["to cultivate"])).unwrap();

    assert_eq!(dict.get_letter_counts().unwrap()["A"], 1);
    assert_eq!(words(&dict, &SearchRequest::query("akoro")), vec!["akoro"]);

    dict.update_term(
        created.term.id,
        &TermPatch {
            word: Some("ekoro".into()),
            ..TermPatch::default()
        },
    )
    .unwrap();

    let page = dict.search(&SearchRequest::query("ekoro")).unwrap();
    assert_eq!(page.results[0].word, "ekoro");
    assert_eq!(page.results[0].rank, Some(0));
    assert_eq!(page.results[0].slug, "ekoro");

    let counts = dict.get_letter_counts().unwrap();
    assert_eq!(counts["A"], 0);
    assert_eq!(counts["E"], 1);
    assert!(dict.search(&SearchRequest::query("akoro")).unwrap().results.is_empty());
}

#[test]
fn word_of_the_day_is_stable_and_fresh() {
    let (_tmp, dict) = open_dict();
    for word in ["akoro", "aro", "ekile", "ituan"] {
        let meaning = format!("meaning of {word}");
        dict.create_entry(&entry(word, &[meaning.as_str()])).unwrap();
    }

    let first = dict.word_of_the_day().unwrap().unwrap();
    let second = dict.word_of_the_day().unwrap().unwrap();
    assert_eq!(first.id, second.id);

    dict.replace_children(
        first.id,
        &[NewDefinition::new("a freshly edited meaning")],
        &[],
        &[],
    )
    .unwrap();

    let third = dict.word_of_the_day().unwrap().unwrap();
    assert_eq!(third.id, first.id);
    assert_eq!(third.definition_preview, "a freshly edited meaning");
}

#[test]
fn word_of_the_day_moves_on_when_deleted() {
    let (_tmp, dict) = open_dict();
    dict.create_entry(&entry("akoro", &["to cultivate"])).unwrap();
    dict.create_entry(&entry("aro", &["hill"])).unwrap();

    let first = dict.word_of_the_day().unwrap().unwrap();
    dict.delete_term(first.id).unwrap();

    let next = dict.word_of_the_day().unwrap().unwrap();
    assert_ne!(next.id, first.id);
}

#[test]
fn word_of_the_day_needs_definitions() {
    let (_tmp, dict) = open_dict();
    assert!(dict.word_of_the_day().unwrap().is_none());

    dict.create_term(&NewTerm::new("aro")).unwrap();
    assert!(dict.word_of_the_day().unwrap().is_none());
}

#[test]
fn import_then_search() {
    let (_tmp, dict) = open_dict();
    let trees = import::parse_entries(
        r#"{
            "metadata": {"total_entries": 3},
            "entries": [
                {
                    "word": "akoro",
                    "pos": "verb",
                    "definitions": [{"text": "to cultivate", "cp_refs": ["ekoro"]}],
                    "examples": [{"ateso": "Akoro ekile", "english": "The man digs"}],
                    "sub_entries": [
                        {"word": "akoroit", "definitions": [{"text": "digging"}]}
                    ]
                },
                {"word": "ekoro", "definitions": [{"text": "cultivation"}]},
                {"word": "ekoro", "slug": "ekoro", "definitions": [{"text": "again"}]}
            ]
        }"#,
    )
    .unwrap();

    let report = dict.import(&trees, false).unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(report.skipped, vec!["ekoro".to_string()]);
    assert_eq!(report.relations_resolved, 1);
    assert_eq!(report.definitions_indexed, 3);

    let akoro = dict.get_word("akoro").unwrap();
    assert_eq!(akoro.entry.sub_entries[0].word, "akoroit");
    assert_eq!(
        akoro.entry.relations[0].target.as_ref().map(|t| t.slug.as_str()),
        Some("ekoro")
    );

    let found = words(&dict, &SearchRequest::query("cultivation"));
    assert!(found.contains(&"ekoro".to_string()));

    let report = dict.import(&trees[1..2], true).unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(dict.status().unwrap().terms, 1);
    assert!(matches!(dict.get_word("akoro"), Err(Error::NotFound { .. })));
}

#[test]
fn data_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
    {
        let dict = Dictionary::open(&data_dir).unwrap();
        dict.create_entry(&entry("akoro", &["to cultivate"])).unwrap();
    }

    let dict = Dictionary::open(&data_dir).unwrap();
    let page = dict.search(&SearchRequest::query("cultivate")).unwrap();
    assert_eq!(page.results[0].word, "akoro");
}
