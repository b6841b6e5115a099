use crxview::filter::{FilterError, FilterQuery, filter_tree};
use crxview::models::FileCategory;
use crxview::tree::FileTree;
use crxview::unpack::ArchiveEntry;

fn sample_tree() -> FileTree {
    FileTree::build(&[
        ArchiveEntry::file("manifest.json", 400),
        ArchiveEntry::file("popup.html", 1200),
        ArchiveEntry::file("js/background.js", 3000),
        ArchiveEntry::file("js/content.js", 800),
        ArchiveEntry::file("js/vendor/lodash.min.js", 70_000),
        ArchiveEntry::file("css/popup.css", 500),
        ArchiveEntry::file("icons/icon48.png", 2000),
        ArchiveEntry::file("_locales/en/messages.json", 120),
    ])
}

fn file_paths(tree: &FileTree) -> Vec<String> {
    tree.files().map(|n| n.path.clone()).collect()
}

#[test]
fn test_filter_is_idempotent() {
    let tree = sample_tree();
    let queries = [
        FilterQuery::name("*.js"),
        FilterQuery::default().with_categories(vec![FileCategory::Config]),
        FilterQuery::default().with_size_range(Some(500), Some(5000)),
        FilterQuery::name("pop").with_regex(true),
    ];

    for query in &queries {
        let once = filter_tree(&tree, query).unwrap();
        let twice = filter_tree(&once, query).unwrap();
        assert_eq!(file_paths(&once), file_paths(&twice), "{query:?}");
    }
}

#[test]
fn test_empty_query_keeps_everything() {
    let tree = sample_tree();
    let filtered = filter_tree(&tree, &FilterQuery::default()).unwrap();
    assert_eq!(file_paths(&filtered), file_paths(&tree));
}

#[test]
fn test_glob_matches_file_names_at_any_depth() {
    let filtered = filter_tree(&sample_tree(), &FilterQuery::name("*.js")).unwrap();
    assert_eq!(
        file_paths(&filtered),
        vec!["js/vendor/lodash.min.js", "js/background.js", "js/content.js"]
    );
}

#[test]
fn test_glob_with_slash_matches_full_path() {
    let filtered = filter_tree(&sample_tree(), &FilterQuery::name("js/*.js")).unwrap();
    assert_eq!(file_paths(&filtered), vec!["js/background.js", "js/content.js"]);

    let filtered = filter_tree(&sample_tree(), &FilterQuery::name("js/**/*.js")).unwrap();
    assert_eq!(filtered.file_count(), 3);
}

#[test]
fn test_emptied_directories_are_removed() {
    let filtered = filter_tree(&sample_tree(), &FilterQuery::name("*.css")).unwrap();
    assert!(filtered.find("css").is_some());
    assert!(filtered.find("js").is_none());
    assert!(filtered.find("icons").is_none());
}

#[test]
fn test_directory_aggregates_follow_the_filter() {
    let filtered = filter_tree(&sample_tree(), &FilterQuery::name("content.js")).unwrap();
    let js = filtered.node(filtered.find("js").unwrap());
    assert_eq!(js.file_count, 1);
    assert_eq!(js.size, 800);
}

#[test]
fn test_criteria_combine_with_and() {
    let query = FilterQuery::name("*.js")
        .with_categories(vec![FileCategory::Code])
        .with_size_range(None, Some(1000));
    let filtered = filter_tree(&sample_tree(), &query).unwrap();
    assert_eq!(file_paths(&filtered), vec!["js/content.js"]);
}

#[test]
fn test_case_sensitivity() {
    let insensitive = filter_tree(&sample_tree(), &FilterQuery::name("MANIFEST.JSON")).unwrap();
    assert_eq!(insensitive.file_count(), 1);

    let sensitive = filter_tree(
        &sample_tree(),
        &FilterQuery::name("MANIFEST.JSON").with_case_sensitive(true),
    )
    .unwrap();
    assert_eq!(sensitive.file_count(), 0);
}

#[test]
fn test_invalid_regex_is_an_error() {
    let result = filter_tree(&sample_tree(), &FilterQuery::name("(unclosed").with_regex(true));
    assert!(matches!(result, Err(FilterError::Pattern(_))));
}

#[test]
fn test_inverted_size_range_is_an_error() {
    let result = filter_tree(
        &sample_tree(),
        &FilterQuery::default().with_size_range(Some(10), Some(5)),
    );
    assert!(matches!(
        result,
        Err(FilterError::InvalidSizeRange { min: 10, max: 5 })
    ));
}

#[test]
fn test_collisions_follow_kept_files() {
    let tree = FileTree::build(&[
        ArchiveEntry::file("popup.html", 10),
        ArchiveEntry::file("popup.html", 20),
        ArchiveEntry::file("js/app.js", 30),
    ]);
    assert_eq!(tree.collisions(), ["popup.html".to_string()]);

    let html = filter_tree(&tree, &FilterQuery::name("*.html")).unwrap();
    assert_eq!(html.collisions(), ["popup.html".to_string()]);

    let js = filter_tree(&tree, &FilterQuery::name("*.js")).unwrap();
    assert!(js.collisions().is_empty());
}
