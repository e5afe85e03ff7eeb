//! Input resolution: files, directories, list files and URLs.

use std::{fs, path::Path};

use framesift::{
    MediaSource, SiftError, UrlResolver, YtDlpResolver, resolve_input,
    source::{parse_csv_list, parse_text_list, safe_name},
};

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, b"not really a video").expect("write file");
}

fn locals(sources: &[MediaSource]) -> Vec<String> {
    sources
        .iter()
        .map(|source| match source {
            MediaSource::Local(path) => {
                path.file_name().expect("name").to_string_lossy().into_owned()
            }
            MediaSource::Remote(url) => url.clone(),
        })
        .collect()
}

// ── Directories ──────────────────────────────────────────────────

#[test]
fn directory_is_walked_recursively_and_sorted() {
    let root = tempfile::tempdir().expect("tempdir");
    touch(&root.path().join("b.mp4"));
    touch(&root.path().join("a.MKV"));
    touch(&root.path().join("nested/deeper/c.webm"));
    touch(&root.path().join("notes.md"));

    let sources = resolve_input(&root.path().display().to_string()).expect("resolve");
    assert_eq!(locals(&sources), vec!["a.MKV", "b.mp4", "c.webm"]);
}

#[test]
fn empty_directory_has_no_sources() {
    let root = tempfile::tempdir().expect("tempdir");
    touch(&root.path().join("readme.txt.bak"));
    let error = resolve_input(&root.path().display().to_string()).unwrap_err();
    assert!(matches!(error, SiftError::NoSources(_)));
    assert!(error.is_fatal());
}

// ── Single inputs ────────────────────────────────────────────────

#[test]
fn single_file_and_url() {
    let root = tempfile::tempdir().expect("tempdir");
    let video = root.path().join("talk.mov");
    touch(&video);
    assert_eq!(
        resolve_input(&video.display().to_string()).expect("resolve"),
        vec![MediaSource::Local(video)]
    );

    assert_eq!(
        resolve_input("www.example.com/watch?v=1").expect("resolve"),
        vec![MediaSource::Remote("https://www.example.com/watch?v=1".to_string())]
    );
}

#[test]
fn unknown_inputs_are_rejected() {
    let root = tempfile::tempdir().expect("tempdir");
    let document = root.path().join("paper.pdf");
    touch(&document);

    let error = resolve_input(&document.display().to_string()).unwrap_err();
    assert!(matches!(error, SiftError::InvalidInput { .. }));

    let error = resolve_input("definitely/not/here.mp4").unwrap_err();
    assert!(matches!(error, SiftError::InvalidInput { .. }));
}

// ── List files ───────────────────────────────────────────────────

#[test]
fn text_list_skips_comments_and_missing_files() {
    let root = tempfile::tempdir().expect("tempdir");
    touch(&root.path().join("one.mp4"));
    let list = "# lectures\none.mp4\n\nmissing.mp4\nhttps://example.com/v/2\n";

    let sources = parse_text_list(list, root.path());
    assert_eq!(
        sources,
        vec![
            MediaSource::Local(root.path().join("one.mp4")),
            MediaSource::Remote("https://example.com/v/2".to_string()),
        ]
    );
}

#[test]
fn csv_list_prefers_url_column() {
    let root = tempfile::tempdir().expect("tempdir");
    let csv = "title,URL\nfirst,https://example.com/a\nsecond, https://example.com/b \n";
    let sources = parse_csv_list(csv, root.path()).expect("parse");
    assert_eq!(
        locals(&sources),
        vec!["https://example.com/a", "https://example.com/b"]
    );
}

#[test]
fn csv_list_file_resolves_relative_paths() {
    let root = tempfile::tempdir().expect("tempdir");
    touch(&root.path().join("clips/x.avi"));
    let list = root.path().join("inputs.csv");
    fs::write(&list, "path\nclips/x.avi\n").expect("write list");

    let sources = resolve_input(&list.display().to_string()).expect("resolve");
    assert_eq!(sources, vec![MediaSource::Local(root.path().join("clips/x.avi"))]);
}

// ── Naming and resolving ─────────────────────────────────────────

#[test]
fn names_are_safe_for_the_file_system() {
    assert_eq!(safe_name("a<b>c:d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
    assert_eq!(safe_name("  ..  "), "video");
    assert_eq!(safe_name("tab\there"), "tab_here");

    let source = MediaSource::Remote("https://example.com/watch?v=abc/".to_string());
    assert_eq!(source.name(), "example.com_watch_v=abc");
    assert_eq!(MediaSource::Local("/videos/My Talk.mp4".into()).name(), "My Talk");
}

#[test]
fn direct_media_links_bypass_the_resolver() {
    let resolver = YtDlpResolver::default().with_program("framesift-missing-yt-dlp");
    let url = "https://cdn.example.com/files/clip.mp4?token=1";
    assert_eq!(resolver.resolve(url).expect("passthrough"), url);
}

#[test]
fn missing_resolver_is_reported() {
    let resolver = YtDlpResolver::default().with_program("framesift-missing-yt-dlp");
    let error = resolver.resolve("https://example.com/watch?v=1").unwrap_err();
    assert!(matches!(error, SiftError::ExternalToolMissing { .. }), "{error}");
}
