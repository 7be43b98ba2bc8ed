#![cfg(unix)]

use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use clap::Parser;
use discmeta_cli::{Outcome, PipelineError, ScanConfig, run};
use discmeta_core::{ContentType, ItemType};
use discmeta_metadata::{CompletionClient, LlmError, read_metadata};
use discmeta_scanner::ScanError;

const FAKE_MKVMERGE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "mkvmerge v80.0 ('Roundabout') 64-bit"
  exit 0
fi
case "$(basename "$2")" in
  *untitled*)
    echo '{"container":{"recognized":true,"properties":{"duration":6000000000000}},"tracks":[{"type":"audio","properties":{"language":"fre"}}]}'
    ;;
  *film*)
    echo '{"container":{"recognized":true,"properties":{"duration":6000000000000,"title":"Le Grand Voyage"}},"tracks":[{"type":"audio","properties":{"language":"fre"}},{"type":"subtitles","properties":{"language":"eng"}}]}'
    ;;
  *ep*)
    echo '{"container":{"recognized":true,"properties":{"duration":1500000000000,"title":"Kaamelott"}},"tracks":[{"type":"audio","properties":{"language":"fre"}}]}'
    ;;
  *)
    echo '{"container":{"recognized":true,"properties":{"duration":300000000000}},"tracks":[{"type":"audio","properties":{"language":"fre"}}]}'
    ;;
esac
"#;

// Created once, before any test spawns a process, so no forked child can
// hold the script open for writing while it is executed.
static FAKE_BIN: LazyLock<(tempfile::TempDir, PathBuf)> = LazyLock::new(|| {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mkvmerge");
    std::fs::write(&path, FAKE_MKVMERGE).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    (dir, path)
});

fn config(disc: &Path) -> ScanConfig {
    let (bin_dir, mkvmerge) = &*FAKE_BIN;
    let missing = bin_dir.path().join("missing");
    let args: Vec<OsString> = vec![
        "discmeta".into(),
        disc.into(),
        "--mkvmerge-bin".into(),
        mkvmerge.into(),
        "--ffprobe-bin".into(),
        missing.into(),
        "--mediainfo-bin".into(),
        "".into(),
        "--llm-enable".into(),
        "false".into(),
    ];
    ScanConfig::try_parse_from(args).unwrap()
}

fn disc_with_videos(names: &[&str]) -> (tempfile::TempDir, PathBuf) {
    let root = tempfile::tempdir().unwrap();
    let disc = root.path().join("DISC_0042");
    std::fs::create_dir_all(disc.join("mkv")).unwrap();
    for name in names {
        std::fs::write(disc.join("mkv").join(name), b"video").unwrap();
    }
    (root, disc)
}

/// Replays canned replies and records every prompt it receives.
struct Scripted {
    replies: Mutex<Vec<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CompletionClient for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }
    fn model(&self) -> &str {
        "test-model"
    }
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(LlmError::Network("no more replies".into()));
        }
        replies.remove(0)
    }
}

#[tokio::test]
async fn film_without_llm_is_written_from_heuristics() {
    let (_root, disc) = disc_with_videos(&["title_t00_film.mkv", "title_t01_bonus.mkv"]);
    let cfg = config(&disc);

    let outcome = run(&cfg, None).await.unwrap();
    let path = disc.join("meta").join("metadata_ia.json");
    assert_eq!(outcome, Outcome::Written(path.clone()));

    let doc = read_metadata(&path).unwrap();
    let record = doc.record;
    assert_eq!(record.disc_uid, "DISC_0042");
    assert_eq!(record.content_type, ContentType::Film);
    assert_eq!(record.movie_title.as_deref(), Some("Le Grand Voyage"));
    assert_eq!(record.series_title, None);
    assert_eq!(record.confidence, 0.2);
    assert_eq!(record.items.len(), 2);
    assert_eq!(record.items[0].kind, ItemType::Main);
    assert_eq!(record.items[0].title_index, 1);
    assert_eq!(record.items[1].kind, ItemType::Bonus);
    assert_eq!(record.mapping["title_1"], "Main Feature");

    assert_eq!(record.sources.tech.tool, "mkvmerge");
    assert_eq!(record.sources.ocr.path, None);
    assert!(!record.sources.llm.used);
    assert_eq!(record.sources.llm.attempts, 0);
    assert_eq!(record.sources.llm.error.as_deref(), Some("llm_disabled"));
    assert_eq!(record.sources.layout_version, "2.0");
}

#[tokio::test]
async fn series_disc_gets_numbered_episodes() {
    let (_root, disc) = disc_with_videos(&[
        "title_t00_ep.mkv",
        "title_t01_ep.mkv",
        "title_t02_ep.mkv",
        "title_t03_ep.mkv",
    ]);

    run(&config(&disc), None).await.unwrap();
    let record = read_metadata(&disc.join("meta").join("metadata_ia.json"))
        .unwrap()
        .record;

    assert_eq!(record.content_type, ContentType::Serie);
    assert_eq!(record.series_title.as_deref(), Some("Kaamelott"));
    assert_eq!(record.movie_title, None);
    let episodes: Vec<_> = record
        .items
        .iter()
        .map(|i| (i.kind, i.title_index, i.season, i.episode))
        .collect();
    assert_eq!(
        episodes,
        vec![
            (ItemType::Episode, 1, Some(1), Some(1)),
            (ItemType::Episode, 2, Some(1), Some(2)),
            (ItemType::Episode, 3, Some(1), Some(3)),
            (ItemType::Episode, 4, Some(1), Some(4)),
        ]
    );
    assert_eq!(record.mapping.len(), 4);
}

#[tokio::test]
async fn llm_answer_is_merged_over_heuristics() {
    let (_root, disc) = disc_with_videos(&["title_t00_film.mkv", "title_t01_bonus.mkv"]);
    let client = Scripted::new(vec![
        r#"```json
{"content_type": "film", "movie_title": "Le Grand Voyage", "year": 2004,
 "language": "FR", "confidence": 0.9,
 "items": [{"title_index": 1, "type": "main"}, {"title_index": 2, "type": "trailer", "label": "Bande-annonce"}]}
```"#,
    ]);

    run(&config(&disc), Some(&client)).await.unwrap();
    let record = read_metadata(&disc.join("meta").join("metadata_ia.json"))
        .unwrap()
        .record;

    assert_eq!(client.calls(), 1);
    assert_eq!(record.year, Some(2004));
    assert_eq!(record.language, "fr");
    assert_eq!(record.confidence, 0.9);
    assert_eq!(record.items[1].kind, ItemType::Trailer);
    assert_eq!(record.mapping["title_2"], "Bande-annonce");
    assert_eq!(record.items[0].runtime_seconds, 6000.0);
    assert!(record.sources.llm.used);
    assert_eq!(record.sources.llm.provider, "scripted");
    assert_eq!(record.sources.llm.model, "test-model");
    assert_eq!(record.sources.llm.attempts, 1);
    assert_eq!(record.sources.llm.error, None);
}

#[tokio::test]
async fn two_malformed_answers_fall_back_to_heuristics() {
    let (_root, disc) = disc_with_videos(&["title_t00_film.mkv"]);
    let client = Scripted::new(vec!["I think this is a movie.", "{not json"]);

    run(&config(&disc), Some(&client)).await.unwrap();
    let record = read_metadata(&disc.join("meta").join("metadata_ia.json"))
        .unwrap()
        .record;

    assert_eq!(client.calls(), 2);
    assert_eq!(record.content_type, ContentType::Film);
    assert_eq!(record.movie_title.as_deref(), Some("Le Grand Voyage"));
    assert_eq!(record.confidence, 0.2);
    assert!(!record.sources.llm.used);
    assert_eq!(record.sources.llm.attempts, 2);
    assert_eq!(
        record.sources.llm.error.as_deref(),
        Some("invalid_json_attempt_2")
    );
}

#[tokio::test]
async fn untitled_low_confidence_film_is_rejected() {
    let (_root, disc) = disc_with_videos(&["title_t00_untitled.mkv"]);
    let client = Scripted::new(vec![
        r#"{"content_type": "film", "movie_title": null, "confidence": 0.6}"#,
    ]);

    let err = run(&config(&disc), Some(&client)).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    let PipelineError::Validation(rejection) = err else {
        panic!("expected a validation rejection");
    };
    assert!(rejection.violates("confidence"));
    assert!(!disc.join("meta").join("metadata_ia.json").exists());
}

#[tokio::test]
async fn dump_only_disc_without_titles_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let disc = root.path().join("DISC_0007");
    std::fs::create_dir_all(disc.join("tech")).unwrap();
    std::fs::write(
        disc.join("tech").join("structure.lsdvd.yml"),
        "track:\n  - ix: 1\n    length: 6000\n",
    )
    .unwrap();

    let err = run(&config(&disc), None).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(!disc.join("meta").join("metadata_ia.json").exists());
}

#[tokio::test]
async fn existing_artifact_is_left_alone() {
    let (_root, disc) = disc_with_videos(&["title_t00_film.mkv"]);
    std::fs::create_dir_all(disc.join("meta")).unwrap();
    let path = disc.join("meta").join("metadata_ia.json");
    std::fs::write(&path, "{\"keep\": true}").unwrap();
    let client = Scripted::new(vec![]);

    let outcome = run(&config(&disc), Some(&client)).await.unwrap();
    assert_eq!(outcome, Outcome::NoOp(path.clone()));
    assert_eq!(client.calls(), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"keep\": true}");
}

#[tokio::test]
async fn disc_without_media_fails() {
    let root = tempfile::tempdir().unwrap();
    let disc = root.path().join("EMPTY");
    std::fs::create_dir_all(&disc).unwrap();

    let err = run(&config(&disc), None).await.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(matches!(err, PipelineError::Scan(ScanError::NoMedia(_))));
}

#[tokio::test]
async fn fingerprint_and_ocr_are_recorded_in_provenance() {
    let (_root, disc) = disc_with_videos(&["title_t00_film.mkv"]);
    std::fs::create_dir_all(disc.join("tech")).unwrap();
    std::fs::write(
        disc.join("tech").join("fingerprint.json"),
        r#"{"volume_id": "GRAND_VOYAGE", "size": 7}"#,
    )
    .unwrap();
    std::fs::create_dir_all(disc.join("meta")).unwrap();
    std::fs::write(
        disc.join("meta").join("menu_ocr.json"),
        r#"[{"text": "Lecture", "conf": 0.93}, {"text": "Bonus", "conf": 0.88}]"#,
    )
    .unwrap();

    run(&config(&disc), None).await.unwrap();
    let sources = read_metadata(&disc.join("meta").join("metadata_ia.json"))
        .unwrap()
        .record
        .sources;

    let digest = sources.fingerprint_sha256.unwrap();
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(sources.ocr.observations, 2);
    assert!(sources.ocr.path.unwrap().ends_with("menu_ocr.json"));
}
