#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use discmeta_scanner::{DiscLayout, ProbeConfig, scan_titles};

const FAKE_MKVMERGE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "mkvmerge v80.0 ('Roundabout') 64-bit"
  exit 0
fi
case "$(basename "$2")" in
  *broken*)
    echo "boom" >&2
    exit 2
    ;;
  *t00*)
    echo '{"container":{"recognized":true,"properties":{"duration":6000000000000,"title":"Le Film"}},"tracks":[{"type":"audio","properties":{"language":"fre"}},{"type":"subtitles","properties":{"language":"eng"}}]}'
    ;;
  *)
    echo '{"container":{"recognized":true,"properties":{"duration":180000000000}},"tracks":[{"type":"audio","properties":{"language":"fre"}}]}'
    ;;
esac
"#;

const SLOW_MKVMERGE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "mkvmerge v80.0 ('Roundabout') 64-bit"
  exit 0
fi
exec sleep 30
"#;

const FAKE_FFPROBE: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffprobe version 6.1.1"
  exit 0
fi
echo '{"format":{"duration":"1502.040000","tags":{"title":"Episode 1"}},"streams":[{"codec_type":"audio","tags":{"language":"fre"}}]}'
"#;

// Every script is written before any test spawns a process, so no forked
// child can still hold one open for writing when it is executed.
static BIN_DIR: LazyLock<tempfile::TempDir> = LazyLock::new(|| {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in [
        ("mkvmerge", FAKE_MKVMERGE),
        ("slow-mkvmerge", SLOW_MKVMERGE),
        ("ffprobe", FAKE_FFPROBE),
    ] {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    dir
});

fn bin(name: &str) -> PathBuf {
    BIN_DIR.path().join(name)
}

#[tokio::test]
async fn probes_files_skips_failures_and_merges_dump() {
    let mkvmerge = bin("mkvmerge");

    let disc = tempfile::tempdir().unwrap();
    let layout = DiscLayout::new(disc.path());
    std::fs::create_dir_all(layout.video_dir()).unwrap();
    for name in ["title_t00.mkv", "title_t01.mkv", "title_t02_broken.mkv"] {
        std::fs::write(layout.video_dir().join(name), b"video").unwrap();
    }

    let cfg = ProbeConfig {
        mkvmerge_bin: mkvmerge,
        ffprobe_bin: bin("missing-ffprobe"),
        mediainfo_bin: None,
        timeout: Duration::from_secs(30),
    };

    // Files only: indexes follow file name order, the broken file is skipped.
    let report = scan_titles(&layout, &cfg).await.unwrap();
    assert_eq!(report.source, "mkvmerge");
    assert_eq!(
        report.tool_version.as_deref(),
        Some("mkvmerge v80.0 ('Roundabout') 64-bit")
    );
    assert_eq!(report.titles.len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("title_t02_broken.mkv"));

    let main = &report.titles[0];
    assert_eq!(main.index, 1);
    assert_eq!(main.runtime_seconds, 6000.0);
    assert_eq!(main.filename.as_deref(), Some("title_t00.mkv"));
    assert_eq!(main.container_title.as_deref(), Some("Le Film"));
    assert!(main.audio_langs.contains("fr"));
    assert!(main.sub_langs.contains("en"));
    assert_eq!(main.size_bytes, Some(5));
    assert_eq!(report.titles[1].index, 2);
    assert_eq!(report.titles[1].runtime_seconds, 180.0);

    // With a dump the dump is primary and the probe fills its gaps.
    std::fs::create_dir_all(disc.path().join("tech")).unwrap();
    std::fs::write(
        layout.dump_path(),
        "track:\n  - ix: 1\n    length: 0\n  - ix: 2\n    length: 185.5\n    audio:\n      - langcode: en\n",
    )
    .unwrap();

    let report = scan_titles(&layout, &cfg).await.unwrap();
    assert_eq!(report.source, "lsdvd");
    assert_eq!(report.titles[0].runtime_seconds, 6000.0);
    assert_eq!(report.titles[0].filename.as_deref(), Some("title_t00.mkv"));
    assert_eq!(report.titles[1].runtime_seconds, 185.5);
    assert_eq!(
        report.titles[1].audio_langs.iter().collect::<Vec<_>>(),
        vec!["en"]
    );
}

#[tokio::test]
async fn timed_out_tool_is_skipped_for_the_next_one() {
    let disc = tempfile::tempdir().unwrap();
    let layout = DiscLayout::new(disc.path());
    std::fs::create_dir_all(layout.video_dir()).unwrap();
    std::fs::write(layout.video_dir().join("title_t00.mkv"), b"video").unwrap();

    let cfg = ProbeConfig {
        mkvmerge_bin: bin("slow-mkvmerge"),
        ffprobe_bin: bin("ffprobe"),
        mediainfo_bin: None,
        timeout: Duration::from_secs(2),
    };

    let started = std::time::Instant::now();
    let report = scan_titles(&layout, &cfg).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(20));

    assert_eq!(report.source, "ffprobe");
    assert_eq!(report.tool_version.as_deref(), Some("ffprobe version 6.1.1"));
    assert_eq!(report.titles.len(), 1);
    assert_eq!(report.titles[0].runtime_seconds, 1502.04);
    assert!(report.titles[0].audio_langs.contains("fr"));

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("mkvmerge failed (title_t00.mkv)"));
    assert!(report.errors[0].contains("timed out"));
}
